//! Dataset discovery and per-dataset chain state.
//!
//! The dataset list changes rarely and is cached in a single TTL-bounded slot.
//! Metadata and heads move with the chain and are always fetched fresh.

pub mod clock;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, instrument};

use self::clock::{Clock, SystemClock};
use crate::client::PortalHttpClient;
use crate::error::{PortalError, PortalResult};
use crate::types::{BlockHead, CacheEntry, Dataset, DatasetMetadata};

/// Most fuzzy suggestions offered for an unknown dataset name
const MAX_SUGGESTIONS: usize = 5;

pub struct DatasetRegistry {
    client: PortalHttpClient,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    datasets: RwLock<Option<CacheEntry<Arc<Vec<Dataset>>>>>,
}

impl std::fmt::Debug for DatasetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetRegistry").field("client", &self.client).field("ttl", &self.ttl).finish()
    }
}

impl DatasetRegistry {
    pub fn new(client: PortalHttpClient, ttl: Duration) -> Self {
        Self::with_clock(client, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(client: PortalHttpClient, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { client, ttl, clock, datasets: RwLock::new(None) }
    }

    /// All queryable datasets, served from cache while fresh.
    ///
    /// A stale or empty slot triggers one fetch by the caller that noticed it.
    /// Concurrent callers may each refresh; the last completed fetch wins.
    #[instrument(skip(self))]
    pub async fn list_datasets(&self) -> PortalResult<Arc<Vec<Dataset>>> {
        let now = self.clock.now();
        if let Some(entry) = self.datasets.read().await.as_ref() {
            if !entry.is_stale(now, self.ttl) {
                return Ok(Arc::clone(&entry.value));
            }
        }

        let datasets: Vec<Dataset> = self.client.get_json("list_datasets", &["datasets"]).await?;
        let datasets = Arc::new(datasets);
        debug!(count = datasets.len(), "Dataset list refreshed");

        *self.datasets.write().await = Some(CacheEntry::new(Arc::clone(&datasets), self.clock.now()));
        Ok(datasets)
    }

    /// Drop the cached list; the next lookup refetches it
    pub async fn invalidate(&self) {
        *self.datasets.write().await = None;
    }

    /// Canonical dataset for a canonical name or alias, if any (case-insensitive)
    pub async fn resolve_dataset(&self, name: &str) -> PortalResult<Option<Dataset>> {
        let datasets = self.list_datasets().await?;
        let name = name.trim();
        Ok(datasets
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .or_else(|| datasets.iter().find(|d| d.matches(name)))
            .cloned())
    }

    /// Resolve `name` or fail with up to five close matches
    #[instrument(skip(self))]
    pub async fn validate_dataset_name(&self, name: &str) -> PortalResult<Dataset> {
        if let Some(dataset) = self.resolve_dataset(name).await? {
            return Ok(dataset);
        }

        let datasets = self.list_datasets().await?;
        Err(PortalError::UnknownDataset { name: name.to_string(), suggestions: fuzzy_suggestions(name, &datasets) })
    }

    #[instrument(skip(self))]
    pub async fn get_metadata(&self, dataset: &str) -> PortalResult<DatasetMetadata> {
        self.client.get_json("get_metadata", &["datasets", dataset, "metadata"]).await
    }

    #[instrument(skip(self))]
    pub async fn get_head(&self, dataset: &str) -> PortalResult<BlockHead> {
        self.client.get_json("get_head", &["datasets", dataset, "head"]).await
    }

    /// `None` for chains that do not report finality
    #[instrument(skip(self))]
    pub async fn get_finalized_head(&self, dataset: &str) -> PortalResult<Option<BlockHead>> {
        self.client.get_json_optional("get_finalized_head", &["datasets", dataset, "finalized-head"]).await
    }
}

/// Datasets whose chain prefix contains, or is contained in, the requested name
fn fuzzy_suggestions(name: &str, datasets: &[Dataset]) -> Vec<String> {
    let needle = name.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    datasets
        .iter()
        .filter(|d| {
            let prefix = d.chain_prefix().to_ascii_lowercase();
            !prefix.is_empty() && (needle.contains(&prefix) || prefix.contains(&needle))
        })
        .map(|d| d.name.clone())
        .take(MAX_SUGGESTIONS)
        .collect()
}
