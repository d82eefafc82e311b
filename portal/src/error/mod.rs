pub mod classify;
pub mod rules;

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::types::QueryCategory;
pub use classify::{ErrorClassifier, RequestContext};
pub use rules::{RemediationRule, RuleTable};

/// Result type for Portal client operations
pub type PortalResult<T> = Result<T, PortalError>;

/// Every failure a Portal client operation can surface
#[derive(Error, Debug)]
pub enum PortalError {
    /// The Portal (or the network in front of it) failed the request
    #[error(transparent)]
    Api(#[from] ClassifiedError),

    /// A successful response body could not be decoded
    #[error("Failed to decode Portal response: {0}")]
    Decode(#[from] DecodeError),

    /// The request was rejected before it reached the network
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Unknown dataset '{name}'")]
    UnknownDataset { name: String, suggestions: Vec<String> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl PortalError {
    /// Human-actionable next steps, most relevant first
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            PortalError::Api(e) => e.suggestions.clone(),
            PortalError::Validation(e) => e.suggestions(),
            PortalError::UnknownDataset { suggestions, .. } if suggestions.is_empty() => {
                vec!["List the available datasets to find the right name".to_string()]
            }
            PortalError::UnknownDataset { suggestions, .. } => {
                vec![format!("Did you mean one of: {}?", suggestions.join(", "))]
            }
            PortalError::Decode(_) => vec![
                "The response was discarded as a whole; retry the request".to_string(),
                "If this persists, narrow the block range to isolate the malformed record".to_string(),
            ],
            PortalError::Config(_) | PortalError::HttpClient(_) => Vec::new(),
        }
    }

    /// Classification of an API failure, if this is one
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            PortalError::Api(e) => Some(&e.kind),
            _ => None,
        }
    }

    /// Get error type as a string for metrics
    pub fn error_type(&self) -> &'static str {
        match self {
            PortalError::Api(e) => e.kind.error_type(),
            PortalError::Decode(_) => "decode_error",
            PortalError::Validation(_) => "validation_error",
            PortalError::UnknownDataset { .. } => "unknown_dataset",
            PortalError::Config(_) => "config_error",
            PortalError::HttpClient(_) => "http_client_error",
        }
    }
}

/// Closed taxonomy of API failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Attempt exceeded its deadline or the connection was aborted
    Timeout,
    /// HTTP 429, optionally with the server-requested delay
    RateLimited { retry_after_secs: Option<u64> },
    /// HTTP 409: the requested range was reorganized while being served
    ReorgConflict,
    /// HTTP 400
    ClientRequest { kind: ClientErrorKind, field: Option<String> },
    /// HTTP 404
    NotFound { resource_hint: Option<String> },
    /// HTTP 5xx
    ServerError { status: u16 },
    /// Anything else, e.g. an unexpected 4xx
    Unclassified { status: Option<u16> },
}

impl ErrorKind {
    /// Transient failures that a later attempt may fix
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::RateLimited { .. } | ErrorKind::ReorgConflict | ErrorKind::ServerError { .. }
        )
    }

    /// Delay the server asked for before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ErrorKind::RateLimited { retry_after_secs: Some(secs) } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited { .. } => "rate_limited",
            ErrorKind::ReorgConflict => "reorg_conflict",
            ErrorKind::ClientRequest { .. } => "client_request_error",
            ErrorKind::NotFound { .. } => "not_found",
            ErrorKind::ServerError { .. } => "server_error",
            ErrorKind::Unclassified { .. } => "unclassified",
        }
    }
}

/// What a 400 response complained about, as far as its text reveals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    UnknownField,
    MissingField,
    InvalidBlockRange,
    InvalidAddress,
    InvalidTopic,
    Generic,
}

/// A fully explained API failure
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    /// Ordered, human-readable remediation steps
    pub suggestions: Vec<String>,
    /// Request details for diagnosis (url, method, query, status, attempt, ...)
    pub context: BTreeMap<String, String>,
}

/// Malformed response bodies; never retried, never partially returned
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed record on line {line}: {source}")]
    InvalidRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed JSON document: {0}")]
    InvalidDocument(#[source] serde_json::Error),

    #[error("empty body where a JSON document was expected")]
    EmptyBody,
}

/// Requests rejected synchronously by the range validator or the query-size guard
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("fromBlock {from_block} is before the first block of '{dataset}' ({start_block})")]
    BeforeStartBlock { dataset: String, from_block: u64, start_block: u64 },

    #[error("fromBlock {from_block} is after the {} head of '{dataset}' ({max_block})", head_label(.finalized))]
    AfterHead { dataset: String, from_block: u64, max_block: u64, finalized: bool },

    #[error("toBlock {to_block} is before fromBlock {from_block}")]
    InvertedRange { from_block: u64, to_block: u64 },

    #[error("{message}")]
    QueryTooLarge { category: QueryCategory, width: u64, maximum: u64, has_filters: bool, message: String },
}

fn head_label(finalized: &bool) -> &'static str {
    if *finalized {
        "finalized"
    } else {
        "latest"
    }
}

impl ValidationError {
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            ValidationError::BeforeStartBlock { start_block, .. } => {
                vec![format!("Start the query at block {} or later", start_block)]
            }
            ValidationError::AfterHead { max_block, finalized, .. } => {
                let mut suggestions = vec![format!("Use a fromBlock at or below {}", max_block)];
                if *finalized {
                    suggestions.push("Drop the finalized-only requirement to query up to the latest head".to_string());
                }
                suggestions
            }
            ValidationError::InvertedRange { .. } => vec!["Swap fromBlock and toBlock".to_string()],
            ValidationError::QueryTooLarge { category, has_filters: false, .. } => vec![
                format!("Add filters such as {}", category.suggested_filters().join(" or ")),
                "Reduce the block range".to_string(),
            ],
            ValidationError::QueryTooLarge { .. } => {
                vec!["Split the range into several smaller queries".to_string()]
            }
        }
    }
}
