use crate::cli::args::{config_inputs, RunArgs};
use crate::exit_codes::{PARTITION_FAILED, SUCCESS};
use anyhow::Context;
use replay_verify_core::{Orchestrator, RunReport};
use std::path::Path;

pub(crate) async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let config = config_inputs(&args.backup, &args.range, args.reuse_backup_artifacts.clone())
        .resolve()?;
    tracing::info!(
        network = %config.network(),
        bucket = %config.bucket,
        sub_dir = %config.sub_dir,
        history_start = config.history_start,
        skipped = config.txns_to_skip.len(),
        reuse = config.reuse_backup_artifacts,
        "starting replay verification"
    );

    let report = Orchestrator::new(config).run().await?;
    println!("[main process] finished");

    let code = if report.success() {
        tracing::info!(
            start = report.range.start,
            end = report.range.end,
            "all partitions verified"
        );
        SUCCESS
    } else {
        print!("{}", report.failure_summary());
        PARTITION_FAILED
    };

    // The verdict stands even when the report cannot be written.
    if let Some(path) = &args.report_json {
        match write_report(path, &report) {
            Ok(()) => tracing::info!(path = %path.display(), "report written"),
            Err(e) => tracing::error!(error = %format!("{e:#}"), "failed to write report"),
        }
    }

    Ok(code)
}

fn write_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    Ok(())
}
