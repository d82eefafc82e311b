use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge};
use opentelemetry::KeyValue;
use portal_utils::metrics::{register_counter_metric_instrument, register_gauge_metric_instrument, Metrics};
use portal_utils::register_metric;

register_metric!(PORTAL_METRICS, PortalMetrics);

/// Metrics for Portal API calls exported to OTEL
pub struct PortalMetrics {
    /// Duration of Portal API calls in seconds, retries and backoff included
    pub api_duration_seconds: Gauge<f64>,
    /// Total number of logical Portal API calls
    pub api_calls_total: Counter<f64>,
    /// Total bytes received in successful responses
    pub response_bytes_total: Counter<f64>,
    /// Total number of retry attempts
    pub retries_total: Counter<f64>,
    /// Total number of calls that required at least one retry
    pub calls_with_retry_total: Counter<f64>,
    /// Query-size guard outcomes, by category and severity
    pub query_guard_decisions_total: Counter<f64>,
}

impl Metrics for PortalMetrics {
    fn register() -> Self {
        let meter = global::meter("portal_client");

        let api_duration_seconds = register_gauge_metric_instrument(
            &meter,
            "portal_api_duration_seconds".to_string(),
            "Duration of Portal API calls".to_string(),
            "s".to_string(),
        );

        let api_calls_total = register_counter_metric_instrument(
            &meter,
            "portal_api_calls_total".to_string(),
            "Total number of Portal API calls".to_string(),
            "calls".to_string(),
        );

        let response_bytes_total = register_counter_metric_instrument(
            &meter,
            "portal_response_bytes_total".to_string(),
            "Total response bytes received from the Portal".to_string(),
            "bytes".to_string(),
        );

        let retries_total = register_counter_metric_instrument(
            &meter,
            "portal_retries_total".to_string(),
            "Total number of Portal API retry attempts".to_string(),
            "retries".to_string(),
        );

        let calls_with_retry_total = register_counter_metric_instrument(
            &meter,
            "portal_calls_with_retry_total".to_string(),
            "Total number of calls that required at least one retry".to_string(),
            "calls".to_string(),
        );

        let query_guard_decisions_total = register_counter_metric_instrument(
            &meter,
            "portal_query_guard_decisions_total".to_string(),
            "Query-size guard decisions".to_string(),
            "decisions".to_string(),
        );

        Self {
            api_duration_seconds,
            api_calls_total,
            response_bytes_total,
            retries_total,
            calls_with_retry_total,
            query_guard_decisions_total,
        }
    }
}

impl PortalMetrics {
    /// Record a successful API call
    pub fn record_success(&self, operation: &str, duration_s: f64, response_bytes: u64, retry_count: u32) {
        let attrs = [
            KeyValue::new("operation", operation.to_string()),
            KeyValue::new("success", "true"),
            KeyValue::new("error_type", "none"),
        ];

        self.api_calls_total.add(1.0, &attrs);
        self.api_duration_seconds.record(duration_s, &attrs);

        let op_attr = [KeyValue::new("operation", operation.to_string())];
        self.response_bytes_total.add(response_bytes as f64, &op_attr);
        self.record_retries(&op_attr, retry_count);
    }

    /// Record a failed API call
    pub fn record_failure(&self, operation: &str, duration_s: f64, error_type: &str, retry_count: u32) {
        let attrs = [
            KeyValue::new("operation", operation.to_string()),
            KeyValue::new("success", "false"),
            KeyValue::new("error_type", error_type.to_string()),
        ];

        self.api_calls_total.add(1.0, &attrs);
        self.api_duration_seconds.record(duration_s, &attrs);

        let op_attr = [KeyValue::new("operation", operation.to_string())];
        self.record_retries(&op_attr, retry_count);
    }

    pub fn record_guard_decision(&self, category: &str, severity: &str) {
        let attrs = [KeyValue::new("category", category.to_string()), KeyValue::new("severity", severity.to_string())];
        self.query_guard_decisions_total.add(1.0, &attrs);
    }

    fn record_retries(&self, op_attr: &[KeyValue], retry_count: u32) {
        if retry_count > 0 {
            self.retries_total.add(retry_count as f64, op_attr);
            self.calls_with_retry_total.add(1.0, op_attr);
        }
    }
}
