use crate::artifacts::clear_artifacts;
use crate::config::ReplayConfig;
use crate::deps::check_backup_config;
use crate::errors::{Result, VerifyError};
use crate::partition::{plan, PartitionSpec, PARTITION_COUNT};
use crate::probe::{BackupStateProbe, LatestVersionProbe};
use crate::range::{resolve_row, RangeSelector, VersionRange};
use crate::report::{PartitionReport, RunReport};
use crate::retry::{PartitionOutcome, RetryPolicy};
use crate::worker::{PartitionRunner, VerificationWorker, WorkerSettings, UNKNOWN_EXIT_CODE};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct Orchestrator {
    config: ReplayConfig,
    runner: Arc<dyn PartitionRunner>,
    probe: Arc<dyn LatestVersionProbe>,
    policy: RetryPolicy,
    partition_count: u32,
}

impl Orchestrator {
    /// Orchestrator wired to the real verifier binary.
    pub fn new(config: ReplayConfig) -> Self {
        let env = config.subprocess_env();
        let runner = VerificationWorker::new(WorkerSettings {
            verifier_bin: config.verifier_bin.clone(),
            work_dir: config.work_dir.clone(),
            backup_config: config.backup_config_template_path.clone(),
            txns_to_skip: config.txns_to_skip.clone(),
            env: env.clone(),
        });
        let probe = BackupStateProbe {
            verifier_bin: config.verifier_bin.clone(),
            metadata_cache_dir: config.metadata_cache_dir(),
            backup_config: config.backup_config_template_path.clone(),
            env,
        };
        Self {
            config,
            runner: Arc::new(runner),
            probe: Arc::new(probe),
            policy: RetryPolicy::default(),
            partition_count: PARTITION_COUNT,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn PartitionRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn LatestVersionProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_partition_count(mut self, partition_count: u32) -> Self {
        self.partition_count = partition_count;
        self
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn check_prerequisites(&self) -> Result<()> {
        let path_var = std::env::var_os("PATH").unwrap_or_default();
        check_backup_config(&self.config.backup_config_template_path, &path_var)
    }

    /// Create the work directory; clear old artifacts unless they are reused.
    pub fn prepare_work_dir(&self) -> Result<()> {
        let work_dir = &self.config.work_dir;
        std::fs::create_dir_all(work_dir).map_err(|e| VerifyError::io(work_dir, e))?;

        if self.config.reuse_backup_artifacts {
            tracing::info!("reusing existing backup artifacts");
            return Ok(());
        }
        let removed = clear_artifacts(work_dir)?;
        tracing::info!(removed = removed.len(), "cleared backup artifacts");
        Ok(())
    }

    /// The range this runner verifies.
    ///
    /// Topology is validated before the backup is queried. The query always
    /// runs since it also fills the shared metadata cache.
    pub async fn resolve_range(&self) -> Result<VersionRange> {
        let network = self.config.network();
        let row = RangeSelector::for_network(network).row(self.config.assignment)?;
        let latest = self.probe.latest_version().await;

        if let Some(range) = self.config.version_override {
            if let Err(e) = &latest {
                tracing::warn!(error = %e, "latest version query failed; using explicit range");
            }
            tracing::info!(start = range.start, end = range.end, "using explicit version range");
            return Ok(range);
        }

        let range = resolve_row(row, latest?)?;
        tracing::info!(%network, start = range.start, end = range.end, "runner range resolved");
        Ok(range)
    }

    pub async fn plan(&self) -> Result<(VersionRange, Vec<PartitionSpec>)> {
        let range = self.resolve_range().await?;
        let specs = plan(range, self.partition_count)?;
        Ok((range, specs))
    }

    pub async fn run(&self) -> Result<RunReport> {
        self.check_prerequisites()?;
        self.prepare_work_dir()?;
        let (range, specs) = self.plan().await?;
        Ok(self.execute(range, specs).await)
    }

    /// Run every partition to completion, one worker per partition.
    /// Nothing is cancelled when a sibling fails.
    pub async fn execute(&self, range: VersionRange, specs: Vec<PartitionSpec>) -> RunReport {
        let sem = Arc::new(Semaphore::new(self.partition_count.max(1) as usize));
        let mut join_set = JoinSet::new();

        for spec in specs.iter().cloned() {
            let sem = sem.clone();
            let runner = self.runner.clone();
            let policy = self.policy;
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let retried = policy.run(runner.as_ref(), &spec).await;
                PartitionReport::new(&spec, &retried)
            });
        }

        let mut reports: Vec<PartitionReport> = Vec::with_capacity(specs.len());
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok(report) => {
                    tracing::info!(
                        partition = report.index,
                        exit_code = report.exit_code,
                        attempts = report.attempts,
                        "partition finished"
                    );
                    reports.push(report);
                }
                Err(e) => tracing::error!(error = %e, "partition task failed"),
            }
        }

        for spec in &specs {
            if !reports.iter().any(|r| r.index == spec.index) {
                reports.push(PartitionReport {
                    index: spec.index,
                    name: spec.name.clone(),
                    start: spec.start,
                    end: spec.end,
                    exit_code: UNKNOWN_EXIT_CODE,
                    attempts: 0,
                    outcome: PartitionOutcome::RetryExhausted {
                        code: UNKNOWN_EXIT_CODE,
                    },
                    tail: "partition task did not complete".into(),
                });
            }
        }

        let report = RunReport::new(range, reports);
        tracing::info!(
            success = report.success(),
            failed = report.failures().count(),
            "all partitions finished"
        );
        report
    }
}
