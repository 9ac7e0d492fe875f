use clap::{Args, Parser, Subcommand, ValueEnum};
use replay_verify_core::config::{
    ConfigInputs, DEFAULT_VERIFIER_BIN, ENV_BACKUP_CONFIG_TEMPLATE_PATH, ENV_BUCKET,
    ENV_HISTORY_START, ENV_REUSE_BACKUP_ARTIFACTS, ENV_SUB_DIR, ENV_TXNS_TO_SKIP,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "replay-verify",
    version,
    about = "Partitioned replay verification of transaction backups"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Verify this runner's range, one verifier process per partition
    Run(RunArgs),
    /// Print the resolved range and partition plan without running anything
    Plan(PlanArgs),
    Version,
}

#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Where the backup lives and how to read it.
///
/// The required values are optional here so that every missing one is
/// reported at once.
#[derive(Args, Debug, Clone)]
pub struct BackupArgs {
    /// Backup bucket; a name containing "testnet" selects the testnet ranges
    #[arg(long, env = ENV_BUCKET)]
    pub bucket: Option<String>,

    #[arg(long, env = ENV_SUB_DIR)]
    pub sub_dir: Option<String>,

    #[arg(long, env = ENV_HISTORY_START)]
    pub history_start: Option<String>,

    /// Space separated transaction versions to skip
    #[arg(long, env = ENV_TXNS_TO_SKIP)]
    pub txns_to_skip: Option<String>,

    /// Command adapter config used to read the backup
    #[arg(long, env = ENV_BACKUP_CONFIG_TEMPLATE_PATH)]
    pub backup_config_template_path: Option<PathBuf>,

    /// Verifier binary
    #[arg(long, env = "REPLAY_VERIFY_BIN", default_value = DEFAULT_VERIFIER_BIN)]
    pub verifier_bin: PathBuf,

    /// Directory holding the metadata cache and partition directories
    #[arg(long, env = "REPLAY_VERIFY_WORK_DIR", default_value = ".")]
    pub work_dir: PathBuf,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RangeArgs {
    /// 0-based position of this runner in the job grid
    pub runner_index: Option<u32>,

    /// Number of runners in the job grid; must match the network's range table
    pub runner_count: Option<u32>,

    /// Verify this start version instead of the runner's range (with --end-version)
    #[arg(long)]
    pub start_version: Option<u64>,

    #[arg(long)]
    pub end_version: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub backup: BackupArgs,

    #[command(flatten)]
    pub range: RangeArgs,

    /// "true" keeps downloaded backup artifacts; anything else clears them first
    #[arg(long, env = ENV_REUSE_BACKUP_ARTIFACTS)]
    pub reuse_backup_artifacts: Option<String>,

    /// Also write the run report as JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub backup: BackupArgs,

    #[command(flatten)]
    pub range: RangeArgs,

    /// Use this latest version instead of querying the backup
    #[arg(long)]
    pub latest_version: Option<u64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

pub fn config_inputs(
    backup: &BackupArgs,
    range: &RangeArgs,
    reuse_backup_artifacts: Option<String>,
) -> ConfigInputs {
    ConfigInputs {
        bucket: backup.bucket.clone(),
        sub_dir: backup.sub_dir.clone(),
        history_start: backup.history_start.clone(),
        txns_to_skip: backup.txns_to_skip.clone(),
        backup_config_template_path: backup.backup_config_template_path.clone(),
        reuse_backup_artifacts,
        verifier_bin: Some(backup.verifier_bin.clone()),
        work_dir: Some(backup.work_dir.clone()),
        runner_index: range.runner_index,
        runner_count: range.runner_count,
        start_version: range.start_version,
        end_version: range.end_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn run_takes_positional_runner_grid() {
        let cli = parse(&[
            "replay-verify",
            "run",
            "--bucket",
            "aptos-mainnet-backup",
            "3",
            "19",
        ]);
        let Command::Run(args) = cli.cmd else {
            panic!("expected run");
        };
        assert_eq!(args.range.runner_index, Some(3));
        assert_eq!(args.range.runner_count, Some(19));
        assert_eq!(args.backup.bucket.as_deref(), Some("aptos-mainnet-backup"));
    }

    #[test]
    fn plan_accepts_override_and_format() {
        let cli = parse(&[
            "replay-verify",
            "plan",
            "--start-version",
            "0",
            "--end-version",
            "1605",
            "--format",
            "json",
        ]);
        let Command::Plan(args) = cli.cmd else {
            panic!("expected plan");
        };
        assert_eq!(args.format, OutputFormat::Json);
        let inputs = config_inputs(&args.backup, &args.range, None);
        assert_eq!(inputs.start_version, Some(0));
        assert_eq!(inputs.end_version, Some(1605));
        assert_eq!(inputs.verifier_bin, Some(PathBuf::from(DEFAULT_VERIFIER_BIN)));
    }

    #[test]
    #[serial]
    fn settings_fall_back_to_environment() {
        std::env::set_var(ENV_TXNS_TO_SKIP, "46552012 4170234");
        std::env::set_var(ENV_REUSE_BACKUP_ARTIFACTS, "false");
        let cli = parse(&["replay-verify", "run"]);
        std::env::remove_var(ENV_TXNS_TO_SKIP);
        std::env::remove_var(ENV_REUSE_BACKUP_ARTIFACTS);

        let Command::Run(args) = cli.cmd else {
            panic!("expected run");
        };
        assert_eq!(args.backup.txns_to_skip.as_deref(), Some("46552012 4170234"));
        assert_eq!(args.reuse_backup_artifacts.as_deref(), Some("false"));
    }
}
