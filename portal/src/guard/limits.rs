use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PortalError, PortalResult};
use crate::types::QueryCategory;

/// Result limits above this are likely to produce an oversized response
pub const DEFAULT_MAX_RESULT_LIMIT: u64 = 10_000;

/// Block-width thresholds for one filter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterLimits {
    /// Above this the query is allowed with a latency warning
    pub recommended: u64,
    /// Above this the query is rejected
    pub maximum: u64,
}

impl FilterLimits {
    pub const fn new(recommended: u64, maximum: u64) -> Self {
        Self { recommended, maximum }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLimits {
    pub filtered: FilterLimits,
    pub unfiltered: FilterLimits,
}

impl CategoryLimits {
    pub fn for_filters(&self, has_filters: bool) -> FilterLimits {
        if has_filters {
            self.filtered
        } else {
            self.unfiltered
        }
    }
}

/// Size thresholds per query category.
///
/// Any subset can be overridden from a YAML or JSON file; omitted categories
/// keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    pub logs: CategoryLimits,
    pub transactions: CategoryLimits,
    pub traces: CategoryLimits,
    pub state_diffs: CategoryLimits,
    pub max_result_limit: u64,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            logs: CategoryLimits { filtered: FilterLimits::new(10_000, 100_000), unfiltered: FilterLimits::new(500, 1_000) },
            transactions: CategoryLimits {
                filtered: FilterLimits::new(5_000, 50_000),
                unfiltered: FilterLimits::new(100, 500),
            },
            traces: CategoryLimits { filtered: FilterLimits::new(1_000, 10_000), unfiltered: FilterLimits::new(50, 100) },
            state_diffs: CategoryLimits {
                filtered: FilterLimits::new(1_000, 10_000),
                unfiltered: FilterLimits::new(50, 100),
            },
            max_result_limit: DEFAULT_MAX_RESULT_LIMIT,
        }
    }
}

impl QueryLimits {
    pub fn category(&self, category: QueryCategory) -> &CategoryLimits {
        match category {
            QueryCategory::Logs => &self.logs,
            QueryCategory::Transactions => &self.transactions,
            QueryCategory::Traces => &self.traces,
            QueryCategory::StateDiffs => &self.state_diffs,
        }
    }

    pub fn limits(&self, category: QueryCategory, has_filters: bool) -> FilterLimits {
        self.category(category).for_filters(has_filters)
    }

    /// Load thresholds from a YAML (or JSON, a YAML subset) file
    pub fn from_file(path: &Path) -> PortalResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PortalError::Config(format!("Failed to read query limits from {}: {}", path.display(), e)))?;
        let limits: QueryLimits = serde_yaml::from_str(&contents)
            .map_err(|e| PortalError::Config(format!("Invalid query limits in {}: {}", path.display(), e)))?;
        limits.validate()?;
        Ok(limits)
    }

    fn validate(&self) -> PortalResult<()> {
        for category in [QueryCategory::Logs, QueryCategory::Transactions, QueryCategory::Traces, QueryCategory::StateDiffs]
        {
            for has_filters in [true, false] {
                let limits = self.limits(category, has_filters);
                if limits.recommended == 0 || limits.recommended > limits.maximum {
                    return Err(PortalError::Config(format!(
                        "{} limits must satisfy 0 < recommended <= maximum (got {} / {})",
                        category, limits.recommended, limits.maximum
                    )));
                }
            }
        }
        Ok(())
    }
}
