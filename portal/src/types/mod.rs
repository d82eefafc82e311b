use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub mod query;

pub use query::{ChainType, QueryCategory, StreamQuery, StreamResult};

/// One queryable chain dataset as listed by `GET /datasets`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Canonical dataset name, e.g. `ethereum-mainnet`
    #[serde(rename = "dataset")]
    pub name: String,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    #[serde(rename = "real_time", default)]
    pub supports_realtime: bool,
}

impl Dataset {
    /// Whether `name` is this dataset's canonical name or one of its aliases
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name))
    }

    /// Leading chain segment of the canonical name (`ethereum` for `ethereum-mainnet`)
    pub fn chain_prefix(&self) -> &str {
        self.name.split('-').next().unwrap_or(self.name.as_str())
    }
}

/// Dataset description returned by `GET /datasets/{name}/metadata`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    #[serde(flatten)]
    pub dataset: Dataset,
    /// Earliest block the dataset will serve
    #[serde(default)]
    pub start_block: u64,
}

/// A block reference; whether it is the latest or the finalized head depends on the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHead {
    pub number: u64,
    pub hash: String,
}

/// A cached value and the instant it was fetched
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, fetched_at: Instant) -> Self {
        Self { value, fetched_at }
    }

    /// Stale once `now - fetched_at >= ttl`
    pub fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) >= ttl
    }
}

/// Expected response latency for a range wider than the recommended width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyBand {
    Fast,
    Moderate,
    Slow,
}

impl LatencyBand {
    /// Band for a range `ratio` times wider than the recommendation
    pub fn for_ratio(ratio: f64) -> Self {
        if ratio <= 2.0 {
            LatencyBand::Fast
        } else if ratio <= 5.0 {
            LatencyBand::Moderate
        } else {
            LatencyBand::Slow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LatencyBand::Fast => "<1-3s",
            LatencyBand::Moderate => "3-10s",
            LatencyBand::Slow => ">10s",
        }
    }
}

impl std::fmt::Display for LatencyBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal note attached to a validated range that exceeds its recommended width
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeWarning {
    pub width: u64,
    pub recommended: u64,
    pub latency: LatencyBand,
    pub message: String,
}

/// A block range checked against the dataset start block and the governing head
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedRange {
    pub from_block: u64,
    pub to_block: u64,
    /// Finalized head when the query asked for finalized data and one exists, latest head otherwise
    pub head: BlockHead,
    /// Whether `head` is the finalized head
    pub finalized: bool,
    pub warning: Option<RangeWarning>,
}

impl ValidatedRange {
    /// Number of blocks covered, both ends included
    pub fn width(&self) -> u64 {
        (self.to_block - self.from_block).saturating_add(1)
    }
}
