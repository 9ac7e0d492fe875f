//! Per-network runner range tables and runner range selection.
//!
//! Each network has a fixed table with one row per runner in the job grid.
//! Rows are inclusive on both ends. The last row is open-ended: its upper
//! bound is resolved at runtime from the backup's latest version.

use crate::errors::{Result, VerifyError};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VersionRange {
    pub start: u64,
    pub end: u64,
}

impl VersionRange {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(VerifyError::config(format!(
                "start version {start} is greater than end version {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn width(&self) -> u64 {
        self.end - self.start
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Upper bound of a table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Fixed(u64),
    /// Verify through the newest version available in the backup.
    Latest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRow {
    pub start: u64,
    pub end: RangeBound,
}

const fn row(start: u64, end: u64) -> TableRow {
    TableRow {
        start,
        end: RangeBound::Fixed(end),
    }
}

const fn open(start: u64) -> TableRow {
    TableRow {
        start,
        end: RangeBound::Latest,
    }
}

pub static TESTNET_RANGES: [TableRow; 19] = [
    row(250_000_000, 255_584_106),
    row(255_584_107, 271_874_718),
    row(271_874_719, 300_009_463),
    row(300_009_464, 324_904_819),
    row(324_904_820, 347_234_877),
    row(347_234_878, 366_973_577),
    row(366_973_578, 399_489_396),
    row(399_489_397, 430_909_965),
    row(430_909_966, 449_999_999),
    row(450_000_000, 462_114_510),
    row(462_114_511, 478_825_432),
    row(478_825_433, 483_500_000),
    row(483_500_001, 516_281_795),
    row(516_281_796, 551_052_675),
    row(551_052_676, 582_481_398),
    row(582_481_399, 640_000_000),
    row(640_000_001, 980_000_000),
    row(980_000_000, 1_000_000_000),
    open(1_000_000_001),
];

pub static MAINNET_RANGES: [TableRow; 19] = [
    row(155_000_001, 180_000_000),
    row(180_000_001, 190_000_000),
    row(190_000_001, 200_000_000),
    row(200_000_001, 215_000_000),
    row(215_000_001, 225_000_000),
    row(225_000_001, 235_000_000),
    row(235_000_001, 246_000_000),
    row(246_000_001, 270_000_000),
    row(270_000_001, 295_000_000),
    row(295_000_001, 321_000_000),
    row(321_000_001, 331_000_000),
    row(331_000_001, 354_000_000),
    row(354_000_001, 400_000_000),
    row(400_000_001, 490_000_000),
    row(490_000_000, 550_000_000),
    row(550_000_001, 600_000_000),
    row(600_000_001, 640_000_000),
    row(948_918_390, 950_000_000),
    open(950_000_001),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Testnet,
    Mainnet,
}

impl Network {
    /// Anything that is not a testnet bucket is treated as mainnet.
    pub fn from_bucket(bucket: &str) -> Self {
        if bucket.contains("testnet") {
            Self::Testnet
        } else {
            Self::Mainnet
        }
    }

    pub fn ranges(self) -> &'static [TableRow] {
        match self {
            Self::Testnet => &TESTNET_RANGES,
            Self::Mainnet => &MAINNET_RANGES,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Testnet => f.write_str("testnet"),
            Self::Mainnet => f.write_str("mainnet"),
        }
    }
}

/// Position of this runner in the job grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerAssignment {
    pub runner_index: u32,
    pub runner_count: u32,
}

impl RunnerAssignment {
    pub fn new(runner_index: u32, runner_count: u32) -> Result<Self> {
        if runner_index >= runner_count {
            return Err(VerifyError::config(format!(
                "runner index {runner_index} must be in 0..{runner_count}"
            )));
        }
        Ok(Self {
            runner_index,
            runner_count,
        })
    }

    pub fn is_last(&self) -> bool {
        self.runner_index + 1 == self.runner_count
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RangeSelector {
    network: Network,
    table: &'static [TableRow],
}

impl RangeSelector {
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            table: network.ranges(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// The unresolved row this runner is responsible for.
    ///
    /// Without an assignment the whole table collapses into a single row.
    /// The last runner always verifies through the latest version.
    pub fn row(&self, assignment: Option<RunnerAssignment>) -> Result<TableRow> {
        let (first, last) = match (self.table.first(), self.table.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(VerifyError::config(format!(
                    "no range table for {}",
                    self.network
                )))
            }
        };

        let Some(assignment) = assignment else {
            return Ok(TableRow {
                start: first.start,
                end: last.end,
            });
        };

        if assignment.runner_count as usize != self.table.len() {
            return Err(VerifyError::config(format!(
                "runner count {} does not match the {} {} ranges",
                assignment.runner_count,
                self.table.len(),
                self.network
            )));
        }

        let mut selected = *self
            .table
            .get(assignment.runner_index as usize)
            .ok_or_else(|| {
                VerifyError::config(format!(
                    "runner index {} is out of range for {} runners",
                    assignment.runner_index, assignment.runner_count
                ))
            })?;
        if assignment.is_last() {
            selected.end = RangeBound::Latest;
        }
        Ok(selected)
    }

    /// Resolve this runner's inclusive range, closing an open upper bound
    /// with `latest`.
    pub fn select(
        &self,
        assignment: Option<RunnerAssignment>,
        latest: Option<u64>,
    ) -> Result<VersionRange> {
        let row = self.row(assignment)?;
        resolve_row(row, latest)
    }
}

pub fn resolve_row(row: TableRow, latest: Option<u64>) -> Result<VersionRange> {
    let end = match row.end {
        RangeBound::Fixed(end) => end,
        RangeBound::Latest => latest.ok_or_else(|| {
            VerifyError::upstream("failed to query the latest version from the backup")
        })?,
    };
    VersionRange::new(row.start, end)
}
