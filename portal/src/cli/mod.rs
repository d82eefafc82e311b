use std::path::PathBuf;

use clap::Args;
use url::Url;

use crate::config::{
    DEFAULT_DATASET_CACHE_TTL_SECS, DEFAULT_MAX_RETRIES, DEFAULT_PORTAL_URL, DEFAULT_STREAM_TIMEOUT_MS,
    DEFAULT_TIMEOUT_MS,
};

/// Parameters used to configure the Portal client.
#[derive(Debug, Clone, Args)]
pub struct PortalCliArgs {
    /// Base URL of the Portal API.
    #[arg(env = "PORTAL_URL", long, default_value = DEFAULT_PORTAL_URL)]
    pub portal_url: Url,

    /// Per-attempt deadline for metadata and head requests, in milliseconds.
    #[arg(env = "PORTAL_TIMEOUT_MS", long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub portal_timeout_ms: u64,

    /// Per-attempt deadline for streaming queries, in milliseconds.
    #[arg(env = "PORTAL_STREAM_TIMEOUT_MS", long, default_value_t = DEFAULT_STREAM_TIMEOUT_MS)]
    pub portal_stream_timeout_ms: u64,

    /// Retries allowed after the first attempt of a request.
    #[arg(env = "PORTAL_MAX_RETRIES", long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub portal_max_retries: u32,

    /// How long the dataset list stays cached, in seconds.
    #[arg(env = "PORTAL_DATASET_CACHE_TTL_SECS", long, default_value_t = DEFAULT_DATASET_CACHE_TTL_SECS)]
    pub portal_dataset_cache_ttl_secs: u64,

    /// YAML or JSON file overriding the query-size thresholds.
    #[arg(env = "PORTAL_QUERY_LIMITS_FILE", long)]
    pub portal_query_limits_file: Option<PathBuf>,
}
