//! Pre-flight admission check on query size.
//!
//! Pure and synchronous: no network, no clock. Widths are inclusive block
//! counts. Unfiltered queries get far smaller budgets because they can return
//! enough data to exhaust memory.

pub mod limits;

use serde::Serialize;
use strum_macros::Display;

pub use self::limits::{CategoryLimits, FilterLimits, QueryLimits};
use crate::error::ValidationError;
use crate::types::{LatencyBand, QueryCategory};

/// Ranges listed in a reject message before eliding the rest
const MAX_LISTED_CHUNKS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuerySizeDecision {
    pub allowed: bool,
    pub severity: Severity,
    pub message: Option<String>,
    /// Recommended width for this category and filter mode
    pub recommended_range: u64,
    pub expected_latency: Option<LatencyBand>,
}

#[derive(Debug, Clone, Default)]
pub struct QuerySizeGuard {
    limits: QueryLimits,
}

impl QuerySizeGuard {
    pub fn new(limits: QueryLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    /// Decide on the inclusive range `from_block..=to_block`
    pub fn check_query_size(
        &self,
        category: QueryCategory,
        from_block: u64,
        to_block: u64,
        has_filters: bool,
    ) -> QuerySizeDecision {
        let width = inclusive_width(from_block, to_block);
        let limits = self.limits.limits(category, has_filters);

        if width > limits.maximum {
            let message = if has_filters {
                let step = limits.recommended.max(1);
                format!(
                    "{} query spans {} blocks, above the maximum of {} for filtered queries. Split it into {} queries of at most {} blocks: {}",
                    category,
                    width,
                    limits.maximum,
                    width.div_ceil(step),
                    limits.recommended,
                    describe_chunks(chunk_ranges(from_block, to_block, step), width.div_ceil(step))
                )
            } else {
                format!(
                    "Unfiltered {} query spans {} blocks, above the maximum of {}. Add filters such as {}, or reduce the range to at most {} blocks",
                    category,
                    width,
                    limits.maximum,
                    category.suggested_filters().join(" or "),
                    limits.recommended
                )
            };
            return QuerySizeDecision {
                allowed: false,
                severity: Severity::Error,
                message: Some(message),
                recommended_range: limits.recommended,
                expected_latency: None,
            };
        }

        if width > limits.recommended {
            let latency = LatencyBand::for_ratio(width as f64 / limits.recommended as f64);
            return QuerySizeDecision {
                allowed: true,
                severity: Severity::Warning,
                message: Some(format!(
                    "{} query spans {} blocks, above the recommended {}; expect {} responses",
                    category, width, limits.recommended, latency
                )),
                recommended_range: limits.recommended,
                expected_latency: Some(latency),
            };
        }

        QuerySizeDecision {
            allowed: true,
            severity: Severity::Ok,
            message: None,
            recommended_range: limits.recommended,
            expected_latency: None,
        }
    }

    /// Like [`Self::check_query_size`], turning a rejection into an error
    pub fn admit(
        &self,
        category: QueryCategory,
        from_block: u64,
        to_block: u64,
        has_filters: bool,
    ) -> Result<QuerySizeDecision, ValidationError> {
        let decision = self.check_query_size(category, from_block, to_block, has_filters);
        if decision.allowed {
            return Ok(decision);
        }
        Err(ValidationError::QueryTooLarge {
            category,
            width: inclusive_width(from_block, to_block),
            maximum: self.limits.limits(category, has_filters).maximum,
            has_filters,
            message: decision.message.unwrap_or_default(),
        })
    }

    /// Warning for a result-count limit likely to produce an oversized response
    pub fn check_result_limit(&self, limit: u64) -> Option<String> {
        (limit > self.limits.max_result_limit).then(|| {
            format!(
                "Result limit {} is above {}; the response may be very large",
                limit, self.limits.max_result_limit
            )
        })
    }

    /// Split `from_block..=to_block` into consecutive ranges no wider than the recommendation
    pub fn suggest_chunks(
        &self,
        from_block: u64,
        to_block: u64,
        category: QueryCategory,
        has_filters: bool,
    ) -> Vec<(u64, u64)> {
        let step = self.limits.limits(category, has_filters).recommended.max(1);
        chunk_ranges(from_block, to_block, step).collect()
    }
}

/// Block count of `from_block..=to_block`, saturating at `u64::MAX`
fn inclusive_width(from_block: u64, to_block: u64) -> u64 {
    if to_block < from_block {
        0
    } else {
        (to_block - from_block).saturating_add(1)
    }
}

fn chunk_ranges(from_block: u64, to_block: u64, step: u64) -> impl Iterator<Item = (u64, u64)> {
    let mut next = (from_block <= to_block).then_some(from_block);
    std::iter::from_fn(move || {
        let start = next?;
        let end = start.saturating_add(step - 1).min(to_block);
        next = end.checked_add(1).filter(|n| *n <= to_block);
        Some((start, end))
    })
}

fn describe_chunks(chunks: impl Iterator<Item = (u64, u64)>, total: u64) -> String {
    let mut listed: Vec<String> = chunks.take(MAX_LISTED_CHUNKS).map(|(from, to)| format!("{}-{}", from, to)).collect();
    if total > MAX_LISTED_CHUNKS as u64 {
        listed.push("...".to_string());
    }
    listed.join(", ")
}
