//! Resilient HTTP client for the Portal API.
//!
//! ```text
//! ┌─────────────────────────────┐
//! │   PortalHttpClient (here)   │  ← retry loop, classification, metrics
//! ├─────────────────────────────┤
//! │   decoder                   │  ← JSON / NDJSON bodies
//! ├─────────────────────────────┤
//! │   transport::Transport      │  ← one exchange, per-attempt deadline
//! └─────────────────────────────┘
//! ```
//!
//! Every call is one logical request driven by
//! [`portal_resilience::retry_with_backoff`]: transient failures (timeouts,
//! 429, 409, 5xx) are retried with exponential backoff, everything else
//! surfaces after a single attempt.

pub mod decoder;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use portal_resilience::{retry_with_backoff, AttemptOutcome, RetryConfig};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use self::decoder::{decode_document, decode_ndjson};
use self::transport::{PortalRequest, RawResponse, ReqwestTransport, Transport};
use crate::config::PortalParams;
use crate::error::{DecodeError, ErrorClassifier, PortalError, PortalResult, RequestContext, RuleTable};
use crate::metrics::PORTAL_METRICS;

/// HTTP client with bounded retries and classified errors
#[derive(Clone)]
pub struct PortalHttpClient {
    base_url: Url,
    transport: Arc<dyn Transport>,
    classifier: ErrorClassifier,
    retry: RetryConfig,
    request_timeout: Duration,
    stream_timeout: Duration,
}

impl std::fmt::Debug for PortalHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalHttpClient")
            .field("base_url", &self.base_url.as_str())
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .field("stream_timeout", &self.stream_timeout)
            .finish()
    }
}

impl PortalHttpClient {
    pub fn new(params: &PortalParams) -> PortalResult<Self> {
        Ok(Self::with_transport(params, Arc::new(ReqwestTransport::new()?)))
    }

    pub fn with_transport(params: &PortalParams, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: params.base_url.clone(),
            transport,
            classifier: ErrorClassifier::default(),
            retry: params.retry.clone(),
            request_timeout: params.request_timeout,
            stream_timeout: params.stream_timeout,
        }
    }

    /// Replace the 400 remediation rules
    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.classifier = ErrorClassifier::new(rules);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `{base_url}/{segments...}`, percent-encoding each segment
    pub fn endpoint(&self, segments: &[&str]) -> PortalResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PortalError::Config(format!("'{}' cannot be used as a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `GET` a single JSON document
    pub async fn get_json<T: DeserializeOwned>(&self, operation: &str, segments: &[&str]) -> PortalResult<T> {
        let request = PortalRequest::get(self.endpoint(segments)?, self.request_timeout);
        self.execute_with_retry(operation, request, |response| decode_document(&response.body)).await
    }

    /// `GET` a JSON document that may legitimately be absent (`204`, empty body or `null`)
    pub async fn get_json_optional<T: DeserializeOwned>(
        &self,
        operation: &str,
        segments: &[&str],
    ) -> PortalResult<Option<T>> {
        let request = PortalRequest::get(self.endpoint(segments)?, self.request_timeout);
        self.execute_with_retry(operation, request, |response| {
            if response.status == 204 || response.body.iter().all(u8::is_ascii_whitespace) {
                return Ok(None);
            }
            decode_document::<Option<T>>(&response.body)
        })
        .await
    }

    /// `POST` a query and decode the newline-delimited records of the response
    pub async fn stream_ndjson<T: DeserializeOwned>(
        &self,
        operation: &str,
        segments: &[&str],
        body: Value,
    ) -> PortalResult<Vec<T>> {
        let request = PortalRequest::post_ndjson(self.endpoint(segments)?, body, self.stream_timeout);
        self.execute_with_retry(operation, request, |response| decode_ndjson(&response.body)).await
    }

    async fn execute_with_retry<T, D>(&self, operation: &str, request: PortalRequest, decode: D) -> PortalResult<T>
    where
        D: Fn(&RawResponse) -> Result<T, DecodeError>,
    {
        let base_context = RequestContext::new(operation, request.method.as_str(), request.url.as_str());
        let base_context = match &request.body {
            Some(body) => base_context.with_query(body.to_string()),
            None => base_context,
        };

        let request = &request;
        let decode = &decode;
        let base_context = &base_context;
        let transport = &self.transport;
        let classifier = &self.classifier;

        let output = retry_with_backoff(&self.retry, operation, move |attempt| async move {
            match transport.execute(request).await {
                Ok(response) => match decode(&response) {
                    Ok(value) => AttemptOutcome::Success((value, response.body.len() as u64)),
                    Err(e) => AttemptOutcome::Fatal(PortalError::Decode(e)),
                },
                Err(failure) => {
                    let classified = classifier.classify(&failure, &base_context.clone().with_attempt(attempt));
                    if classified.kind.is_retryable() {
                        let retry_after = classified.kind.retry_after();
                        AttemptOutcome::Retryable { error: PortalError::Api(classified), retry_after }
                    } else {
                        AttemptOutcome::Fatal(PortalError::Api(classified))
                    }
                }
            }
        })
        .await;

        let duration_s = output.elapsed.as_secs_f64();
        match output.result {
            Ok((value, bytes)) => {
                debug!(operation, retries = output.retries, bytes, duration_s, "Portal call succeeded");
                PORTAL_METRICS.record_success(operation, duration_s, bytes, output.retries);
                Ok(value)
            }
            Err(e) => {
                error!(
                    operation,
                    url = %request.url,
                    retries = output.retries,
                    error_type = e.error_type(),
                    error = %e,
                    "Portal call failed"
                );
                PORTAL_METRICS.record_failure(operation, duration_s, e.error_type(), output.retries);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;
    use bytes::Bytes;
    use serde_json::json;
    use tokio::time::Instant;

    use super::transport::{AcceptKind, MockTransport, RawFailure};
    use super::*;
    use crate::error::ErrorKind;

    fn params() -> PortalParams {
        PortalParams::new(Url::parse("https://portal.test").unwrap())
    }

    fn client(mock: MockTransport) -> PortalHttpClient {
        PortalHttpClient::with_transport(&params(), Arc::new(mock))
    }

    fn ok(body: &'static str) -> Result<RawResponse, RawFailure> {
        Ok(RawResponse { status: 200, body: Bytes::from_static(body.as_bytes()), elapsed: Duration::ZERO })
    }

    fn http_failure(status: u16, retry_after_secs: Option<u64>) -> Result<RawResponse, RawFailure> {
        Err(RawFailure::Http { status, body: "failure".to_string(), retry_after_secs, elapsed: Duration::ZERO })
    }

    #[test]
    fn endpoint_joins_and_encodes_segments() {
        let mock = MockTransport::new();
        let client = client(mock);
        let url = client.endpoint(&["datasets", "ethereum mainnet", "metadata"]).unwrap();
        assert_eq!(url.as_str(), "https://portal.test/datasets/ethereum%20mainnet/metadata");

        let nested = PortalParams::new(Url::parse("https://portal.test/api/").unwrap());
        let client = PortalHttpClient::with_transport(&nested, Arc::new(MockTransport::new()));
        assert_eq!(client.endpoint(&["datasets"]).unwrap().as_str(), "https://portal.test/api/datasets");
    }

    #[tokio::test(start_paused = true)]
    async fn bad_request_is_attempted_once() {
        let mut mock = MockTransport::new();
        mock.expect_execute().times(1).returning(|_| http_failure(400, None));

        let started = Instant::now();
        let err = client(mock).get_json::<Value>("metadata", &["datasets", "x", "metadata"]).await.unwrap_err();

        assert_matches!(err.kind(), Some(ErrorKind::ClientRequest { .. }));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_attempted_once() {
        let mut mock = MockTransport::new();
        mock.expect_execute().times(1).returning(|_| http_failure(404, None));

        let err = client(mock).get_json::<Value>("metadata", &["datasets", "nope", "metadata"]).await.unwrap_err();
        assert_matches!(err.kind(), Some(ErrorKind::NotFound { resource_hint: Some(_) }));
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_exhaust_budget_with_exponential_backoff() {
        let mut mock = MockTransport::new();
        mock.expect_execute().times(4).returning(|_| http_failure(503, None));

        let started = Instant::now();
        let err = client(mock).get_json::<Value>("datasets", &["datasets"]).await.unwrap_err();

        assert_matches!(err.kind(), Some(ErrorKind::ServerError { status: 503 }));
        assert_eq!(started.elapsed(), Duration::from_secs(1 + 2 + 4));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_overrides_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let mut mock = MockTransport::new();
        mock.expect_execute().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                http_failure(429, Some(7))
            } else {
                ok("{\"number\": 1}")
            }
        });

        let started = Instant::now();
        let value: Value = client(mock).get_json("head", &["datasets", "x", "head"]).await.unwrap();

        assert_eq!(value["number"], 1);
        assert_eq!(started.elapsed(), Duration::from_secs(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_and_reorgs_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let mut mock = MockTransport::new();
        mock.expect_execute().times(3).returning(move |request| match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Err(RawFailure::TimedOut { timeout: request.timeout, elapsed: request.timeout }),
            1 => http_failure(409, None),
            _ => ok("{\"number\": 2}\n{\"number\": 3}\n"),
        });

        let started = Instant::now();
        let records: Vec<Value> =
            client(mock).stream_ndjson("stream", &["datasets", "x", "stream"], json!({})).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(1 + 2));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_body_is_not_retried() {
        let mut mock = MockTransport::new();
        mock.expect_execute().times(1).returning(|_| ok("{\"number\": 1}\n{broken\n"));

        let err = client(mock).stream_ndjson::<Value>("stream", &["datasets", "x", "stream"], json!({})).await;
        assert_matches!(err, Err(PortalError::Decode(DecodeError::InvalidRecord { line: 2, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn requests_carry_accept_kind_and_deadline() {
        let mut mock = MockTransport::new();
        mock.expect_execute()
            .withf(|request| {
                request.accept == AcceptKind::Ndjson
                    && request.timeout == Duration::from_millis(60_000)
                    && request.body == Some(json!({"fromBlock": 1}))
            })
            .times(1)
            .returning(|_| ok(""));
        mock.expect_execute()
            .withf(|request| request.accept == AcceptKind::Json && request.timeout == Duration::from_millis(15_000))
            .times(1)
            .returning(|_| ok("[]"));

        let client = client(mock);
        let records: Vec<Value> =
            client.stream_ndjson("stream", &["datasets", "x", "stream"], json!({"fromBlock": 1})).await.unwrap();
        assert!(records.is_empty());
        let listing: Vec<Value> = client.get_json("datasets", &["datasets"]).await.unwrap();
        assert!(listing.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn optional_document_absent_on_no_content_or_null() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let mut mock = MockTransport::new();
        mock.expect_execute().times(3).returning(move |_| match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(RawResponse { status: 204, body: Bytes::new(), elapsed: Duration::ZERO }),
            1 => ok("null"),
            _ => ok("{\"number\": 9}"),
        });

        let client = client(mock);
        let segments = ["datasets", "x", "finalized-head"];
        assert!(client.get_json_optional::<Value>("finalized_head", &segments).await.unwrap().is_none());
        assert!(client.get_json_optional::<Value>("finalized_head", &segments).await.unwrap().is_none());
        let head = client.get_json_optional::<Value>("finalized_head", &segments).await.unwrap().unwrap();
        assert_eq!(head["number"], 9);
    }

    #[tokio::test(start_paused = true)]
    async fn classified_error_context_names_final_attempt() {
        let mut mock = MockTransport::new();
        mock.expect_execute().times(2).returning(|_| http_failure(500, None));

        let client = PortalHttpClient::with_transport(
            &PortalParams { retry: RetryConfig { max_retries: 1, ..Default::default() }, ..params() },
            Arc::new(mock),
        );
        let err = client.get_json::<Value>("datasets", &["datasets"]).await.unwrap_err();

        let PortalError::Api(classified) = err else { panic!("expected an API error") };
        assert_eq!(classified.context["attempt"], "1");
        assert_eq!(classified.context["url"], "https://portal.test/datasets");
        assert!(!classified.suggestions.is_empty());
    }
}
