//! Splits a runner's range into contiguous partitions.

use crate::errors::{Result, VerifyError};
use crate::range::VersionRange;
use serde::Serialize;

/// Number of partitions per runner, independent of range size.
pub const PARTITION_COUNT: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSpec {
    /// 1-based.
    pub index: u32,
    pub total: u32,
    pub start: u64,
    pub end: u64,
    /// Log tag and on-disk working directory name.
    pub name: String,
}

pub fn partition_name(index: u32, start: u64, end: u64) -> String {
    format!("run_{index}_{start}_{end}")
}

/// Plan `count` partitions over `range`.
///
/// Every partition is `per_partition = width / count` wide and adjacent
/// partitions share their boundary version. The last partition is stretched
/// to `range.end` so the floor division never drops versions.
pub fn plan(range: VersionRange, count: u32) -> Result<Vec<PartitionSpec>> {
    if count == 0 {
        return Err(VerifyError::config("partition count must be at least 1"));
    }

    let per_partition = range.width() / u64::from(count);
    let specs = (1..=count)
        .map(|n| {
            let mut end = range.start + u64::from(n) * per_partition;
            let start = end - per_partition;
            if n == count && end < range.end {
                end = range.end;
            }
            PartitionSpec {
                index: n,
                total: count,
                start,
                end,
                name: partition_name(n, start, end),
            }
        })
        .collect();
    Ok(specs)
}
