use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::client::PortalHttpClient;
use crate::config::PortalParams;
use crate::error::{PortalResult, RuleTable, ValidationError};
use crate::guard::{QuerySizeDecision, QuerySizeGuard, Severity};
use crate::metrics::PORTAL_METRICS;
use crate::registry::clock::Clock;
use crate::registry::DatasetRegistry;
use crate::types::{BlockHead, Dataset, DatasetMetadata, QueryCategory, StreamQuery, StreamResult, ValidatedRange};
use crate::validation::{BlockRangeValidator, RangeHint};

/// Entry point for callers: dataset discovery, range validation, admission and streaming queries
#[derive(Debug, Clone)]
pub struct PortalClient {
    http: PortalHttpClient,
    registry: Arc<DatasetRegistry>,
    validator: Arc<BlockRangeValidator>,
    guard: QuerySizeGuard,
}

impl PortalClient {
    pub fn new(params: &PortalParams) -> PortalResult<Self> {
        Ok(Self::from_http(params, PortalHttpClient::new(params)?, None))
    }

    /// Build on an existing HTTP client, optionally with a custom clock for the dataset cache
    pub fn from_http(params: &PortalParams, http: PortalHttpClient, clock: Option<Arc<dyn Clock>>) -> Self {
        let registry = Arc::new(match clock {
            Some(clock) => DatasetRegistry::with_clock(http.clone(), params.dataset_cache_ttl, clock),
            None => DatasetRegistry::new(http.clone(), params.dataset_cache_ttl),
        });
        let validator = Arc::new(BlockRangeValidator::new(Arc::clone(&registry), params.query_limits.clone()));
        Self { http, registry, validator, guard: QuerySizeGuard::new(params.query_limits.clone()) }
    }

    /// Replace the 400 remediation rules used for streaming queries
    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.http = self.http.with_rules(rules);
        self
    }

    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    pub async fn list_datasets(&self) -> PortalResult<Arc<Vec<Dataset>>> {
        self.registry.list_datasets().await
    }

    pub async fn validate_dataset_name(&self, name: &str) -> PortalResult<Dataset> {
        self.registry.validate_dataset_name(name).await
    }

    pub async fn get_metadata(&self, dataset: &str) -> PortalResult<DatasetMetadata> {
        let dataset = self.registry.validate_dataset_name(dataset).await?;
        self.registry.get_metadata(&dataset.name).await
    }

    pub async fn get_head(&self, dataset: &str) -> PortalResult<BlockHead> {
        let dataset = self.registry.validate_dataset_name(dataset).await?;
        self.registry.get_head(&dataset.name).await
    }

    pub async fn get_finalized_head(&self, dataset: &str) -> PortalResult<Option<BlockHead>> {
        let dataset = self.registry.validate_dataset_name(dataset).await?;
        self.registry.get_finalized_head(&dataset.name).await
    }

    pub async fn validate_block_range(
        &self,
        dataset: &str,
        from_block: u64,
        to_block: Option<u64>,
        finalized_only: bool,
    ) -> PortalResult<ValidatedRange> {
        let dataset = self.registry.validate_dataset_name(dataset).await?;
        self.validator.validate(&dataset.name, from_block, to_block, finalized_only, None).await
    }

    pub fn check_query_size(
        &self,
        category: QueryCategory,
        from_block: u64,
        to_block: u64,
        has_filters: bool,
    ) -> QuerySizeDecision {
        self.guard.check_query_size(category, from_block, to_block, has_filters)
    }

    /// Run a data query end to end.
    ///
    /// Bounded queries are sized before any network call. Open-ended ones are
    /// sized once the governing head has clamped them.
    #[instrument(skip(self, query), fields(dataset = %query.dataset, category = %query.category))]
    pub async fn stream_query(&self, query: &StreamQuery) -> PortalResult<StreamResult> {
        let has_filters = query.has_narrowing_filters();

        if let Some(limit) = query.result_limit {
            if let Some(message) = self.guard.check_result_limit(limit) {
                warn!(limit, "{}", message);
            }
        }

        let early_decision = match query.to_block {
            Some(to_block) if to_block < query.from_block => {
                return Err(ValidationError::InvertedRange { from_block: query.from_block, to_block }.into());
            }
            Some(to_block) => Some(self.admit(query.category, query.from_block, to_block, has_filters)?),
            None => None,
        };

        let dataset = self.registry.validate_dataset_name(&query.dataset).await?;
        let hint = RangeHint { category: query.category, has_filters };
        let range = self
            .validator
            .validate(&dataset.name, query.from_block, query.to_block, query.finalized_only, Some(hint))
            .await?;

        let decision = match early_decision {
            Some(decision) => decision,
            None => self.admit(query.category, range.from_block, range.to_block, has_filters)?,
        };

        let body = query.to_body(range.from_block, range.to_block);
        let records: Vec<Value> =
            self.http.stream_ndjson("stream_query", &["datasets", dataset.name.as_str(), "stream"], body).await?;

        info!(
            dataset = %dataset.name,
            from_block = range.from_block,
            to_block = range.to_block,
            finalized = range.finalized,
            records = records.len(),
            "Stream query completed"
        );

        Ok(StreamResult { dataset: dataset.name, records, range, decision })
    }

    fn admit(
        &self,
        category: QueryCategory,
        from_block: u64,
        to_block: u64,
        has_filters: bool,
    ) -> PortalResult<QuerySizeDecision> {
        let result = self.guard.admit(category, from_block, to_block, has_filters);
        let severity = match &result {
            Ok(decision) => decision.severity,
            Err(_) => Severity::Error,
        };
        PORTAL_METRICS.record_guard_decision(&category.to_string(), &severity.to_string());

        let decision = result?;
        if let Some(message) = &decision.message {
            warn!(%category, from_block, to_block, "{}", message);
        }
        Ok(decision)
    }
}
