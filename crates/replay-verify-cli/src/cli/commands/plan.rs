use crate::cli::args::{config_inputs, OutputFormat, PlanArgs};
use crate::exit_codes::SUCCESS;
use replay_verify_core::{Orchestrator, StaticProbe};
use std::sync::Arc;

/// Resolve the range and partitions exactly as `run` would, then print them.
/// Nothing is cleared and no verifier replay is started.
pub(crate) async fn run(args: PlanArgs) -> anyhow::Result<i32> {
    let config = config_inputs(&args.backup, &args.range, Some("true".into())).resolve()?;
    let network = config.network();

    let mut orchestrator = Orchestrator::new(config);
    if let Some(latest) = args.latest_version {
        orchestrator = orchestrator.with_probe(Arc::new(StaticProbe(Some(latest))));
    }
    let (range, specs) = orchestrator.plan().await?;

    match args.format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "network": network,
                "range": range,
                "partitions": specs,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!("network: {network}");
            println!("range:   {range}");
            for spec in &specs {
                println!(
                    "{:>3}/{}  {:<40} {:>12} .. {}",
                    spec.index, spec.total, spec.name, spec.start, spec.end
                );
            }
        }
    }
    Ok(SUCCESS)
}
