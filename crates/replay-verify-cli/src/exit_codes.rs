//! Process exit codes. Part of the contract with the job scheduler.

pub const SUCCESS: i32 = 0;
pub const PARTITION_FAILED: i32 = 1; // At least one partition ended non-zero after retries
pub const CONFIG_ERROR: i32 = 2; // Configuration, missing client or backup unreachable; nothing ran
