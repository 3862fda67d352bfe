pub mod latest_batch;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use latest_batch::{resolve, resolve_with, summarize_batches, BatchSummary};

/// How the entries that make up "the latest batch" are selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupingStrategy {
    /// Group by the latest entry's batch id, or by its exact instant when it has none.
    #[default]
    #[serde(rename = "batch-id")]
    BatchIdOrTimestamp,
    /// Group by exact instant only, ignoring batch ids.
    #[serde(rename = "timestamp")]
    TimestampOnly,
    /// No batch aggregation: each unit takes the price of its own latest entry.
    #[serde(rename = "latest-per-unit")]
    LatestPerUnit,
}

impl GroupingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatchIdOrTimestamp => "batch-id",
            Self::TimestampOnly => "timestamp",
            Self::LatestPerUnit => "latest-per-unit",
        }
    }
}

impl fmt::Display for GroupingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupingStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch-id" | "batch_id" | "batch" => Ok(Self::BatchIdOrTimestamp),
            "timestamp" => Ok(Self::TimestampOnly),
            "latest-per-unit" | "latest_per_unit" | "per-unit" => Ok(Self::LatestPerUnit),
            other => anyhow::bail!(
                "unknown grouping strategy {other:?} (expected batch-id, timestamp or latest-per-unit)"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cli_spellings() {
        assert_eq!(
            "batch-id".parse::<GroupingStrategy>().unwrap(),
            GroupingStrategy::BatchIdOrTimestamp
        );
        assert_eq!(
            " Timestamp ".parse::<GroupingStrategy>().unwrap(),
            GroupingStrategy::TimestampOnly
        );
        assert_eq!(
            "latest_per_unit".parse::<GroupingStrategy>().unwrap(),
            GroupingStrategy::LatestPerUnit
        );
        assert!("fifo".parse::<GroupingStrategy>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for s in [
            GroupingStrategy::BatchIdOrTimestamp,
            GroupingStrategy::TimestampOnly,
            GroupingStrategy::LatestPerUnit,
        ] {
            assert_eq!(s.to_string().parse::<GroupingStrategy>().unwrap(), s);
        }
    }
}
