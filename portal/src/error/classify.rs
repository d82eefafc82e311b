use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::rules::RuleTable;
use super::{ClassifiedError, ErrorKind};
use crate::client::transport::RawFailure;

/// Longest query body echoed into an error context
const MAX_QUERY_CONTEXT_LEN: usize = 500;

/// Longest upstream body quoted in an error message
const MAX_BODY_MESSAGE_LEN: usize = 300;

#[allow(clippy::expect_used)]
static DATASET_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/datasets/([^/?#]+)").expect("dataset path pattern must be a valid regex"));

/// Request details attached to every classified error
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub operation: String,
    pub method: String,
    pub url: String,
    /// Serialized request body, if any
    pub query: Option<String>,
    pub attempt: u32,
}

impl RequestContext {
    pub fn new(operation: impl Into<String>, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self { operation: operation.into(), method: method.into(), url: url.into(), query: None, attempt: 0 }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    fn to_map(&self, failure: &RawFailure) -> BTreeMap<String, String> {
        let mut context = BTreeMap::new();
        context.insert("operation".to_string(), self.operation.clone());
        context.insert("method".to_string(), self.method.clone());
        context.insert("url".to_string(), self.url.clone());
        context.insert("attempt".to_string(), self.attempt.to_string());
        context.insert("elapsed_ms".to_string(), failure.elapsed().as_millis().to_string());
        if let Some(status) = failure.status() {
            context.insert("status".to_string(), status.to_string());
        }
        if let Some(query) = &self.query {
            context.insert("query".to_string(), truncate(query, MAX_QUERY_CONTEXT_LEN));
        }
        context
    }
}

/// Maps raw transport failures onto the closed [`ErrorKind`] taxonomy
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    rules: RuleTable,
}

impl ErrorClassifier {
    pub fn new(rules: RuleTable) -> Self {
        Self { rules }
    }

    pub fn classify(&self, failure: &RawFailure, request: &RequestContext) -> ClassifiedError {
        let context = request.to_map(failure);

        let (kind, message, suggestions) = match failure {
            RawFailure::TimedOut { timeout, .. } => (
                ErrorKind::Timeout,
                format!("{} timed out after {}ms", request.operation, timeout.as_millis()),
                vec![
                    "Reduce the block range to shorten the response".to_string(),
                    "Add filters so the Portal has less data to scan".to_string(),
                    "Raise the timeout with PORTAL_TIMEOUT_MS (lookups) or PORTAL_STREAM_TIMEOUT_MS (streams)".to_string(),
                ],
            ),
            RawFailure::Network { message, .. } => (
                ErrorKind::Timeout,
                format!("{} failed before a response arrived: {}", request.operation, message),
                vec!["Check network connectivity to the Portal".to_string()],
            ),
            RawFailure::Http { status, body, retry_after_secs, .. } => {
                self.classify_status(*status, body, *retry_after_secs, request)
            }
        };

        ClassifiedError { kind, message, suggestions, context }
    }

    fn classify_status(
        &self,
        status: u16,
        body: &str,
        retry_after_secs: Option<u64>,
        request: &RequestContext,
    ) -> (ErrorKind, String, Vec<String>) {
        let quoted = truncate(body.trim(), MAX_BODY_MESSAGE_LEN);
        match status {
            400 => {
                let remediation = self.rules.remediate(body);
                (
                    ErrorKind::ClientRequest { kind: remediation.kind, field: remediation.field },
                    format!("Portal rejected the request: {}", quoted),
                    remediation.suggestions,
                )
            }
            404 => {
                let resource_hint = DATASET_PATH.captures(&request.url).map(|c| c[1].to_string());
                let suggestions = match &resource_hint {
                    Some(dataset) => vec![
                        format!("Dataset '{}' may not exist; list the available datasets", dataset),
                        "Check the dataset name for typos or use its canonical name".to_string(),
                    ],
                    None => vec!["Check the endpoint path".to_string()],
                };
                (ErrorKind::NotFound { resource_hint }, format!("Not found: {}", request.url), suggestions)
            }
            409 => (
                ErrorKind::ReorgConflict,
                "Chain reorganization detected while serving the requested range".to_string(),
                vec![
                    "Retry the query; the range will be served from the new canonical chain".to_string(),
                    "Query finalized blocks only to avoid reorgs".to_string(),
                ],
            ),
            429 => {
                let mut suggestions = Vec::new();
                if let Some(secs) = retry_after_secs {
                    suggestions.push(format!("Wait {} seconds before retrying", secs));
                }
                suggestions.push("Reduce the request rate".to_string());
                suggestions.push("Use smaller block ranges".to_string());
                suggestions.push("Cache results that do not change between calls".to_string());
                (
                    ErrorKind::RateLimited { retry_after_secs },
                    "Rate limited by the Portal".to_string(),
                    suggestions,
                )
            }
            500..=599 => (
                ErrorKind::ServerError { status },
                format!("Portal server error (HTTP {}): {}", status, quoted),
                vec![
                    "The Portal is having trouble; check its status page".to_string(),
                    "Retry later".to_string(),
                ],
            ),
            _ => (
                ErrorKind::Unclassified { status: Some(status) },
                format!("Unexpected Portal response (HTTP {}): {}", status, quoted),
                Vec::new(),
            ),
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
