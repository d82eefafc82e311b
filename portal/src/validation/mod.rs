use std::sync::Arc;

use tracing::{instrument, warn};

use crate::error::{PortalResult, ValidationError};
use crate::guard::QueryLimits;
use crate::registry::DatasetRegistry;
use crate::types::{LatencyBand, QueryCategory, RangeWarning, ValidatedRange};

/// Category and filter mode used to pick the recommended width for the latency warning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeHint {
    pub category: QueryCategory,
    pub has_filters: bool,
}

/// Checks requested ranges against the dataset start block and the governing head
#[derive(Debug)]
pub struct BlockRangeValidator {
    registry: Arc<DatasetRegistry>,
    limits: QueryLimits,
}

impl BlockRangeValidator {
    pub fn new(registry: Arc<DatasetRegistry>, limits: QueryLimits) -> Self {
        Self { registry, limits }
    }

    /// Validate and clamp `from_block..=to_block`.
    ///
    /// Metadata and heads are fetched fresh. `to_block = None` means "up to
    /// the governing head", which is the finalized head when `finalized_only`
    /// is set and the chain reports one, the latest head otherwise.
    #[instrument(skip(self, hint))]
    pub async fn validate(
        &self,
        dataset: &str,
        from_block: u64,
        to_block: Option<u64>,
        finalized_only: bool,
        hint: Option<RangeHint>,
    ) -> PortalResult<ValidatedRange> {
        if let Some(to_block) = to_block {
            if to_block < from_block {
                return Err(ValidationError::InvertedRange { from_block, to_block }.into());
            }
        }

        let (metadata, head, finalized_head) = tokio::try_join!(
            self.registry.get_metadata(dataset),
            self.registry.get_head(dataset),
            async {
                if finalized_only {
                    self.registry.get_finalized_head(dataset).await
                } else {
                    Ok(None)
                }
            }
        )?;

        if from_block < metadata.start_block {
            return Err(ValidationError::BeforeStartBlock {
                dataset: dataset.to_string(),
                from_block,
                start_block: metadata.start_block,
            }
            .into());
        }

        let (governing, finalized) = match finalized_head {
            Some(finalized_head) => (finalized_head, true),
            None => (head, false),
        };
        let max_block = governing.number;

        if from_block > max_block {
            return Err(ValidationError::AfterHead {
                dataset: dataset.to_string(),
                from_block,
                max_block,
                finalized,
            }
            .into());
        }

        let to_block = to_block.map_or(max_block, |to| to.min(max_block));
        let width = (to_block - from_block).saturating_add(1);
        let warning = hint.and_then(|hint| self.range_warning(hint, width));
        if let Some(warning) = &warning {
            warn!(dataset, from_block, to_block, width, latency = %warning.latency, "{}", warning.message);
        }

        Ok(ValidatedRange { from_block, to_block, head: governing, finalized, warning })
    }

    fn range_warning(&self, hint: RangeHint, width: u64) -> Option<RangeWarning> {
        let recommended = self.limits.limits(hint.category, hint.has_filters).recommended;
        if width <= recommended {
            return None;
        }
        let latency = LatencyBand::for_ratio(width as f64 / recommended as f64);
        Some(RangeWarning {
            width,
            recommended,
            latency,
            message: format!(
                "Range of {} blocks exceeds the recommended {} for {} queries; expect {} responses",
                width, recommended, hint.category, latency
            ),
        })
    }
}
