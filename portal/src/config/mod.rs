use std::time::Duration;

use portal_resilience::RetryConfig;
use url::Url;

use crate::cli::PortalCliArgs;
use crate::error::PortalError;
use crate::guard::QueryLimits;

pub const DEFAULT_PORTAL_URL: &str = "https://portal.sqd.dev";
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_STREAM_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_DATASET_CACHE_TTL_SECS: u64 = 300;

/// Validated Portal client configuration
#[derive(Debug, Clone)]
pub struct PortalParams {
    pub base_url: Url,
    /// Per-attempt deadline for JSON requests
    pub request_timeout: Duration,
    /// Per-attempt deadline for streaming queries
    pub stream_timeout: Duration,
    pub retry: RetryConfig,
    pub dataset_cache_ttl: Duration,
    pub query_limits: QueryLimits,
}

impl PortalParams {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            stream_timeout: Duration::from_millis(DEFAULT_STREAM_TIMEOUT_MS),
            retry: RetryConfig { max_retries: DEFAULT_MAX_RETRIES, ..Default::default() },
            dataset_cache_ttl: Duration::from_secs(DEFAULT_DATASET_CACHE_TTL_SECS),
            query_limits: QueryLimits::default(),
        }
    }
}

impl Default for PortalParams {
    fn default() -> Self {
        #[allow(clippy::expect_used)]
        let base_url = Url::parse(DEFAULT_PORTAL_URL).expect("default Portal URL must parse");
        Self::new(base_url)
    }
}

impl TryFrom<PortalCliArgs> for PortalParams {
    type Error = PortalError;

    fn try_from(args: PortalCliArgs) -> Result<Self, Self::Error> {
        if !matches!(args.portal_url.scheme(), "http" | "https") {
            return Err(PortalError::Config(format!(
                "portal_url must use http or https, got '{}'",
                args.portal_url.scheme()
            )));
        }
        if args.portal_timeout_ms == 0 || args.portal_stream_timeout_ms == 0 {
            return Err(PortalError::Config("Portal timeouts must be greater than zero".to_string()));
        }

        let query_limits = match &args.portal_query_limits_file {
            Some(path) => QueryLimits::from_file(path)?,
            None => QueryLimits::default(),
        };

        Ok(Self {
            base_url: args.portal_url,
            request_timeout: Duration::from_millis(args.portal_timeout_ms),
            stream_timeout: Duration::from_millis(args.portal_stream_timeout_ms),
            retry: RetryConfig { max_retries: args.portal_max_retries, ..Default::default() },
            dataset_cache_ttl: Duration::from_secs(args.portal_dataset_cache_ttl_secs),
            query_limits,
        })
    }
}
