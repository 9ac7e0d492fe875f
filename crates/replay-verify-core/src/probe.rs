//! Latest backed-up version lookup.
//!
//! The backup query goes through the verifier binary itself. As a side
//! effect it fills the shared metadata cache that every partition copies.

use crate::errors::{Result, VerifyError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

static LATEST_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"latest_transaction_version:\s*Some\((\d+)\)").unwrap());

#[async_trait]
pub trait LatestVersionProbe: Send + Sync {
    /// `Ok(None)` means the backup has no transactions yet.
    async fn latest_version(&self) -> Result<Option<u64>>;
}

/// A probe answering with a known value.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticProbe(pub Option<u64>);

#[async_trait]
impl LatestVersionProbe for StaticProbe {
    async fn latest_version(&self) -> Result<Option<u64>> {
        Ok(self.0)
    }
}

/// Queries `backup-storage-state` through the verifier binary.
#[derive(Debug, Clone)]
pub struct BackupStateProbe {
    pub verifier_bin: PathBuf,
    pub metadata_cache_dir: PathBuf,
    pub backup_config: PathBuf,
    pub env: Vec<(String, String)>,
}

#[async_trait]
impl LatestVersionProbe for BackupStateProbe {
    async fn latest_version(&self) -> Result<Option<u64>> {
        tracing::info!(
            cache = %self.metadata_cache_dir.display(),
            "querying backup storage state"
        );
        let output = Command::new(&self.verifier_bin)
            .args(["aptos-db", "backup", "query", "backup-storage-state"])
            .arg("--metadata-cache-dir")
            .arg(&self.metadata_cache_dir)
            .arg("--command-adapter-config")
            .arg(&self.backup_config)
            .envs(self.env.iter().cloned())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                VerifyError::upstream(format!(
                    "failed to run {}: {e}",
                    self.verifier_bin.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VerifyError::upstream(format!(
                "backup storage state query exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_latest_version(&String::from_utf8_lossy(&output.stdout))
    }
}

pub fn parse_latest_version(output: &str) -> Result<Option<u64>> {
    let Some(caps) = LATEST_VERSION_RE.captures(output) else {
        return Ok(None);
    };
    caps[1]
        .parse::<u64>()
        .map(Some)
        .map_err(|e| VerifyError::upstream(format!("invalid latest version {}: {e}", &caps[1])))
}
