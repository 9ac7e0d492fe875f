//! Partitioned replay verification of a transaction backup.
//!
//! A runner in a job grid picks its version range from a per-network table,
//! splits it into [`partition::PARTITION_COUNT`] partitions and runs the
//! external verifier once per partition, all in parallel. Transient verifier
//! failures are retried; a verified mismatch (exit code 2) is final.
//!
//! ```no_run
//! use replay_verify_core::{ConfigInputs, Orchestrator};
//!
//! # async fn example() -> replay_verify_core::Result<()> {
//! let config = ConfigInputs {
//!     bucket: Some("aptos-testnet-backup".into()),
//!     sub_dir: Some("e1".into()),
//!     history_start: Some("250000000".into()),
//!     txns_to_skip: Some("46552012".into()),
//!     backup_config_template_path: Some("s3.yaml".into()),
//!     ..Default::default()
//! }
//! .resolve()?;
//!
//! let report = Orchestrator::new(config).run().await?;
//! if !report.success() {
//!     print!("{}", report.failure_summary());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `BUCKET` | Backup bucket; a name containing `testnet` selects the testnet table |
//! | `SUB_DIR` | Backup sub-directory, exported to the backup config template |
//! | `HISTORY_START` | First version of retained history |
//! | `TXNS_TO_SKIP` | Space separated transaction versions excluded from verification |
//! | `BACKUP_CONFIG_TEMPLATE_PATH` | Command adapter config used to read the backup |
//! | `REUSE_BACKUP_ARTIFACTS` | `true` (default) keeps downloaded artifacts between runs |

pub mod artifacts;
pub mod config;
pub mod deps;
pub mod errors;
pub mod orchestrator;
pub mod partition;
pub mod probe;
pub mod range;
pub mod report;
pub mod retry;
pub mod worker;

pub use config::{ConfigInputs, ReplayConfig};
pub use errors::{Result, VerifyError};
pub use orchestrator::Orchestrator;
pub use partition::{plan, PartitionSpec, PARTITION_COUNT};
pub use probe::{BackupStateProbe, LatestVersionProbe, StaticProbe};
pub use range::{Network, RangeSelector, RunnerAssignment, VersionRange};
pub use report::{PartitionReport, RunReport};
pub use retry::{ExitClass, PartitionOutcome, RetryPolicy};
pub use worker::{PartitionResult, PartitionRunner, VerificationWorker, WorkerSettings};
