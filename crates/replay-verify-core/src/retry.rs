//! Bounded retries keyed on the verifier's exit code.

use crate::partition::PartitionSpec;
use crate::worker::{PartitionResult, PartitionRunner};
use serde::Serialize;

pub const MAX_ATTEMPTS: u32 = 6;
/// The verifier found a transaction whose replayed output diverges from the backup.
pub const MISMATCH_EXIT_CODE: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Success,
    /// Definitive finding; rerunning cannot change it.
    Mismatch,
    /// Download hiccup, crash, resource exhaustion, ...
    Transient(i32),
}

impl ExitClass {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            MISMATCH_EXIT_CODE => Self::Mismatch,
            other => Self::Transient(other),
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Transient(_))
    }
}

/// Final classification of a partition after retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionOutcome {
    Verified,
    VerifiedMismatch,
    RetryExhausted { code: i32 },
}

impl PartitionOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Verified)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetriedResult {
    pub result: PartitionResult,
    pub attempts: u32,
}

impl RetriedResult {
    pub fn outcome(&self) -> PartitionOutcome {
        match ExitClass::from_code(self.result.exit_code) {
            ExitClass::Success => PartitionOutcome::Verified,
            ExitClass::Mismatch => PartitionOutcome::VerifiedMismatch,
            ExitClass::Transient(code) => PartitionOutcome::RetryExhausted { code },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `spec` until a terminal exit code or the attempt ceiling.
    /// Attempts are immediate; on exhaustion the last result is returned as is.
    pub async fn run(&self, runner: &dyn PartitionRunner, spec: &PartitionSpec) -> RetriedResult {
        let mut attempt = 1;
        loop {
            tracing::info!(partition = spec.index, attempt, "starting attempt");
            let result = runner.run(spec).await;
            let class = ExitClass::from_code(result.exit_code);

            if class.is_terminal() || attempt >= self.max_attempts {
                if !class.is_terminal() {
                    tracing::warn!(
                        partition = spec.index,
                        attempts = attempt,
                        exit_code = result.exit_code,
                        "retries exhausted"
                    );
                }
                return RetriedResult {
                    result,
                    attempts: attempt,
                };
            }

            tracing::warn!(
                partition = spec.index,
                attempt,
                exit_code = result.exit_code,
                "transient verifier failure, retrying"
            );
            attempt += 1;
        }
    }
}
