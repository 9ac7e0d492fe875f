//! Aggregation of partition outcomes into one pass/fail signal.

use crate::partition::PartitionSpec;
use crate::range::VersionRange;
use crate::retry::{PartitionOutcome, RetriedResult};
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionReport {
    pub index: u32,
    pub name: String,
    pub start: u64,
    pub end: u64,
    pub exit_code: i32,
    pub attempts: u32,
    pub outcome: PartitionOutcome,
    pub tail: String,
}

impl PartitionReport {
    pub fn new(spec: &PartitionSpec, retried: &RetriedResult) -> Self {
        Self {
            index: spec.index,
            name: spec.name.clone(),
            start: spec.start,
            end: spec.end,
            exit_code: retried.result.exit_code,
            attempts: retried.attempts,
            outcome: retried.outcome(),
            tail: retried.result.tail_text().into_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub range: VersionRange,
    /// Sorted by partition index.
    pub partitions: Vec<PartitionReport>,
}

impl RunReport {
    pub fn new(range: VersionRange, mut partitions: Vec<PartitionReport>) -> Self {
        partitions.sort_by_key(|p| p.index);
        Self { range, partitions }
    }

    /// Every partition must end with exit code 0.
    pub fn success(&self) -> bool {
        self.partitions.iter().all(|p| p.exit_code == 0)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PartitionReport> {
        self.partitions.iter().filter(|p| p.exit_code != 0)
    }

    pub fn failure_summary(&self) -> String {
        let mut out = String::new();
        for p in self.failures() {
            let kind = match p.outcome {
                PartitionOutcome::Verified => "unexpected",
                PartitionOutcome::VerifiedMismatch => "verified mismatch",
                PartitionOutcome::RetryExhausted { .. } => "retries exhausted",
            };
            let _ = writeln!(out, "======== ERROR ========");
            let _ = writeln!(
                out,
                "ERROR: partition {} ({}) failed with exit status {} after {} attempt(s) [{}]",
                p.index, p.name, p.exit_code, p.attempts, kind
            );
            for line in p.tail.lines() {
                let _ = writeln!(out, "    {line}");
            }
        }
        out
    }
}
