//! Calendar granularity of partition keys.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar bucket size of a partitioned table.
///
/// The granularity fixes both the width of the canonical key text and the
/// calendar step between two adjacent partitions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One partition per calendar year, keys `yyyy`.
    Yearly,
    /// One partition per calendar month, keys `yyyymm`.
    Monthly,
    /// One partition per day, keys `yyyymmdd`.
    Daily,
}

impl Granularity {
    /// All granularities, coarsest first.
    pub const ALL: [Granularity; 3] = [
        Granularity::Yearly,
        Granularity::Monthly,
        Granularity::Daily,
    ];

    /// Number of digits in a canonical key of this granularity.
    pub const fn key_width(self) -> usize {
        match self {
            Granularity::Yearly => 4,
            Granularity::Monthly => 6,
            Granularity::Daily => 8,
        }
    }

    /// Divisor that truncates a `yyyymmdd` integer column to this granularity.
    pub const fn column_divisor(self) -> u32 {
        match self {
            Granularity::Yearly => 10_000,
            Granularity::Monthly => 100,
            Granularity::Daily => 1,
        }
    }

    /// Unit name of one calendar step, used in log lines.
    pub const fn step_unit(self) -> &'static str {
        match self {
            Granularity::Yearly => "year",
            Granularity::Monthly => "month",
            Granularity::Daily => "day",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Yearly => write!(f, "yearly"),
            Granularity::Monthly => write!(f, "monthly"),
            Granularity::Daily => write!(f, "daily"),
        }
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yearly" | "year" | "y" => Ok(Granularity::Yearly),
            "monthly" | "month" | "m" => Ok(Granularity::Monthly),
            "daily" | "day" | "d" => Ok(Granularity::Daily),
            _ => Err(format!("unknown granularity: {}", s)),
        }
    }
}
