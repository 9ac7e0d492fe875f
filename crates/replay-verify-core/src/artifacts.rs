//! On-disk layout: the shared metadata cache and per-partition directories.
//!
//! ```text
//! <work_dir>/metadata-cache/            shared, filled by the latest-version query
//! <work_dir>/run_<n>_<start>_<end>/
//!     metadata-cache/                   private copy, made once
//!     db/                               target db written by the verifier
//! ```

use crate::errors::{Result, VerifyError};
use std::path::{Path, PathBuf};

pub const METADATA_CACHE_DIR: &str = "metadata-cache";
pub const TARGET_DB_DIR: &str = "db";
const PARTITION_DIR_PREFIX: &str = "run_";

/// Suffix of a partition directory that is still being seeded.
const STAGING_SUFFIX: &str = ".partial";

/// Create the partition directory on first use and seed it with a private
/// copy of the shared metadata cache. An existing directory is a resume and
/// is left untouched.
///
/// Seeding happens in `<name>.partial` which is renamed into place only once
/// the copy is complete, so a failed copy never looks like a resume.
pub fn prepare_partition_dir(work_dir: &Path, name: &str) -> Result<PathBuf> {
    let dir = work_dir.join(name);
    if dir.exists() {
        tracing::debug!(dir = %dir.display(), "reusing partition directory");
        return Ok(dir);
    }

    let staging = work_dir.join(format!("{name}{STAGING_SUFFIX}"));
    if staging.exists() {
        tracing::debug!(dir = %staging.display(), "discarding incomplete partition directory");
        std::fs::remove_dir_all(&staging).map_err(|e| VerifyError::io(&staging, e))?;
    }

    if let Err(e) = seed_partition_dir(work_dir, &staging) {
        if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
            tracing::warn!(dir = %staging.display(), error = %cleanup, "failed to remove incomplete partition directory");
        }
        return Err(e);
    }
    std::fs::rename(&staging, &dir).map_err(|e| VerifyError::io(&dir, e))?;
    Ok(dir)
}

fn seed_partition_dir(work_dir: &Path, staging: &Path) -> Result<()> {
    std::fs::create_dir_all(staging).map_err(|e| VerifyError::io(staging, e))?;

    let shared = work_dir.join(METADATA_CACHE_DIR);
    let private = staging.join(METADATA_CACHE_DIR);
    if shared.is_dir() {
        copy_dir_recursive(&shared, &private)
    } else {
        tracing::warn!(
            shared = %shared.display(),
            "shared metadata cache missing; partition starts with an empty cache"
        );
        std::fs::create_dir_all(&private).map_err(|e| VerifyError::io(&private, e))
    }
}

pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst).map_err(|e| VerifyError::io(dst, e))?;

    let entries = std::fs::read_dir(src).map_err(|e| VerifyError::io(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| VerifyError::io(src, e))?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| VerifyError::io(&path, e))?;

        if file_type.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            std::fs::copy(&path, &dest_path).map_err(|e| VerifyError::io(&path, e))?;
        }
    }
    Ok(())
}

/// Remove the shared metadata cache and every partition directory.
/// Returns what was removed.
pub fn clear_artifacts(work_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if !work_dir.exists() {
        return Ok(removed);
    }

    let entries = std::fs::read_dir(work_dir).map_err(|e| VerifyError::io(work_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| VerifyError::io(work_dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let path = entry.path();
        let is_artifact = name == METADATA_CACHE_DIR || name.starts_with(PARTITION_DIR_PREFIX);
        if is_artifact && path.is_dir() {
            std::fs::remove_dir_all(&path).map_err(|e| VerifyError::io(&path, e))?;
            removed.push(path);
        }
    }
    removed.sort();
    Ok(removed)
}
