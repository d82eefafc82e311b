//! Transport layer: one HTTP exchange, no retries, no interpretation.
//!
//! A [`Transport`] sends a single [`PortalRequest`] and reports either the raw
//! success body or a [`RawFailure`]. Turning failures into classified errors
//! and deciding whether to try again is the job of the layers above.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::error::{PortalError, PortalResult};

/// Response encoding the caller expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptKind {
    /// A single JSON document
    Json,
    /// Newline-delimited JSON records
    Ndjson,
}

impl AcceptKind {
    pub fn header_value(&self) -> &'static str {
        match self {
            AcceptKind::Json => "application/json",
            AcceptKind::Ndjson => "application/x-ndjson",
        }
    }
}

/// A fully-described outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct PortalRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Value>,
    pub accept: AcceptKind,
    /// Deadline for this attempt, covering both the send and the body read
    pub timeout: Duration,
}

impl PortalRequest {
    pub fn get(url: Url, timeout: Duration) -> Self {
        Self { method: Method::GET, url, body: None, accept: AcceptKind::Json, timeout }
    }

    pub fn post_ndjson(url: Url, body: Value, timeout: Duration) -> Self {
        Self { method: Method::POST, url, body: Some(body), accept: AcceptKind::Ndjson, timeout }
    }
}

/// A 2xx response, body fully read
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
    pub elapsed: Duration,
}

/// Everything that can go wrong during one exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFailure {
    /// The server answered with a non-2xx status
    Http { status: u16, body: String, retry_after_secs: Option<u64>, elapsed: Duration },
    /// The attempt hit its deadline
    TimedOut { timeout: Duration, elapsed: Duration },
    /// Connection refused, reset, DNS failure, truncated body, ...
    Network { message: String, elapsed: Duration },
}

impl RawFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            RawFailure::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            RawFailure::Http { elapsed, .. }
            | RawFailure::TimedOut { elapsed, .. }
            | RawFailure::Network { elapsed, .. } => *elapsed,
        }
    }
}

impl std::fmt::Display for RawFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawFailure::Http { status, body, .. } => write!(f, "HTTP {}: {}", status, body),
            RawFailure::TimedOut { timeout, .. } => write!(f, "request timed out after {}ms", timeout.as_millis()),
            RawFailure::Network { message, .. } => write!(f, "network error: {}", message),
        }
    }
}

/// Sends one request and reports the raw outcome
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &PortalRequest) -> Result<RawResponse, RawFailure>;
}

/// [`Transport`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> PortalResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        let client = Client::builder()
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(PortalError::HttpClient)?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: &PortalRequest) -> Result<(StatusCode, HeaderMap, Bytes), reqwest::Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .header(ACCEPT, HeaderValue::from_static(request.accept.header_value()));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok((status, headers, body))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &PortalRequest) -> Result<RawResponse, RawFailure> {
        let started = Instant::now();
        debug!(method = %request.method, url = %request.url, "Sending Portal request");

        let outcome = tokio::time::timeout(request.timeout, self.send(request)).await;
        let elapsed = started.elapsed();

        let (status, headers, body) = match outcome {
            Err(_) => return Err(RawFailure::TimedOut { timeout: request.timeout, elapsed }),
            Ok(Err(e)) if e.is_timeout() => return Err(RawFailure::TimedOut { timeout: request.timeout, elapsed }),
            Ok(Err(e)) => return Err(RawFailure::Network { message: e.to_string(), elapsed }),
            Ok(Ok(parts)) => parts,
        };

        debug!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Portal response received"
        );

        if status.is_success() {
            Ok(RawResponse { status: status.as_u16(), body, elapsed })
        } else {
            Err(RawFailure::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
                retry_after_secs: parse_retry_after(&headers),
                elapsed,
            })
        }
    }
}

/// Delay in seconds from a `Retry-After` header; only the delta-seconds form is honored
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse::<u64>().ok()
}
