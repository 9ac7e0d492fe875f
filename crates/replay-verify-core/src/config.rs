//! Run configuration, validated once at startup.

use crate::errors::{Result, VerifyError};
use crate::range::{Network, RunnerAssignment, VersionRange};
use std::path::PathBuf;

pub const DEFAULT_VERIFIER_BIN: &str = "target/release/aptos-debugger";

pub const ENV_BUCKET: &str = "BUCKET";
pub const ENV_SUB_DIR: &str = "SUB_DIR";
pub const ENV_HISTORY_START: &str = "HISTORY_START";
pub const ENV_TXNS_TO_SKIP: &str = "TXNS_TO_SKIP";
pub const ENV_BACKUP_CONFIG_TEMPLATE_PATH: &str = "BACKUP_CONFIG_TEMPLATE_PATH";
pub const ENV_REUSE_BACKUP_ARTIFACTS: &str = "REUSE_BACKUP_ARTIFACTS";

/// Raw, unvalidated inputs as collected from flags and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigInputs {
    pub bucket: Option<String>,
    pub sub_dir: Option<String>,
    pub history_start: Option<String>,
    pub txns_to_skip: Option<String>,
    pub backup_config_template_path: Option<PathBuf>,
    pub reuse_backup_artifacts: Option<String>,
    pub verifier_bin: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub runner_index: Option<u32>,
    pub runner_count: Option<u32>,
    pub start_version: Option<u64>,
    pub end_version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayConfig {
    pub bucket: String,
    pub sub_dir: String,
    pub history_start: u64,
    pub txns_to_skip: Vec<u64>,
    pub backup_config_template_path: PathBuf,
    pub reuse_backup_artifacts: bool,
    pub verifier_bin: PathBuf,
    pub work_dir: PathBuf,
    pub assignment: Option<RunnerAssignment>,
    pub version_override: Option<VersionRange>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ConfigInputs {
    /// Validate everything at once. All missing required keys are reported
    /// together.
    pub fn resolve(self) -> Result<ReplayConfig> {
        let bucket = present(self.bucket);
        let sub_dir = present(self.sub_dir);
        let history_start = present(self.history_start);
        let txns_to_skip = present(self.txns_to_skip);
        let backup_config_template_path = self
            .backup_config_template_path
            .filter(|p| !p.as_os_str().is_empty());

        let missing: Vec<&str> = [
            (ENV_BUCKET, bucket.is_none()),
            (ENV_SUB_DIR, sub_dir.is_none()),
            (ENV_HISTORY_START, history_start.is_none()),
            (ENV_TXNS_TO_SKIP, txns_to_skip.is_none()),
            (
                ENV_BACKUP_CONFIG_TEMPLATE_PATH,
                backup_config_template_path.is_none(),
            ),
        ]
        .into_iter()
        .filter_map(|(key, absent)| absent.then_some(key))
        .collect();

        let (
            Some(bucket),
            Some(sub_dir),
            Some(history_start),
            Some(txns_to_skip),
            Some(backup_config_template_path),
        ) = (
            bucket,
            sub_dir,
            history_start,
            txns_to_skip,
            backup_config_template_path,
        )
        else {
            return Err(VerifyError::config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        };

        let history_start = history_start.trim().parse::<u64>().map_err(|e| {
            VerifyError::config(format!(
                "{ENV_HISTORY_START} must be a version number, got {history_start:?}: {e}"
            ))
        })?;
        let txns_to_skip = parse_skip_list(&txns_to_skip)?;

        let assignment = match (self.runner_index, self.runner_count) {
            (Some(index), Some(count)) => Some(RunnerAssignment::new(index, count)?),
            (None, None) => None,
            _ => {
                return Err(VerifyError::config(
                    "runner index and runner count must be given together",
                ))
            }
        };

        let version_override = match (self.start_version, self.end_version) {
            (Some(start), Some(end)) => Some(VersionRange::new(start, end)?),
            (None, None) => None,
            _ => {
                return Err(VerifyError::config(
                    "start and end version must be given together",
                ))
            }
        };

        Ok(ReplayConfig {
            bucket,
            sub_dir,
            history_start,
            txns_to_skip,
            backup_config_template_path,
            reuse_backup_artifacts: self
                .reuse_backup_artifacts
                .is_none_or(|v| v.trim() == "true"),
            verifier_bin: self
                .verifier_bin
                .unwrap_or_else(|| PathBuf::from(DEFAULT_VERIFIER_BIN)),
            work_dir: self.work_dir.unwrap_or_else(|| PathBuf::from(".")),
            assignment,
            version_override,
        })
    }
}

/// Space separated transaction versions.
pub fn parse_skip_list(raw: &str) -> Result<Vec<u64>> {
    raw.split_whitespace()
        .map(|txn| {
            txn.parse::<u64>().map_err(|e| {
                VerifyError::config(format!(
                    "{ENV_TXNS_TO_SKIP} entry {txn:?} is not a transaction version: {e}"
                ))
            })
        })
        .collect()
}

impl ReplayConfig {
    pub fn network(&self) -> Network {
        Network::from_bucket(&self.bucket)
    }

    pub fn metadata_cache_dir(&self) -> PathBuf {
        self.work_dir.join(crate::artifacts::METADATA_CACHE_DIR)
    }

    /// Environment the backup config template expects.
    pub fn subprocess_env(&self) -> Vec<(String, String)> {
        vec![
            (ENV_BUCKET.to_string(), self.bucket.clone()),
            (ENV_SUB_DIR.to_string(), self.sub_dir.clone()),
        ]
    }
}
