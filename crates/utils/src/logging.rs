use chrono::Utc;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Registry};

/// Filter applied when `RUST_LOG` is unset or unparsable
const DEFAULT_FILTER: &str = "portal_client=info,portal_resilience=info";

#[derive(Default)]
struct JsonFieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl Visit for JsonFieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let v = format!("{:?}", value).trim_matches('"').to_string();
        if field.name() == "message" {
            self.message = Some(v);
        } else {
            self.fields.insert(field.name().to_string(), Value::String(v));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }
}

/// One JSON object per line, suitable for log shippers
pub struct JsonEventFormatter;

impl<S, N> FormatEvent<S, N> for JsonEventFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
        let meta = event.metadata();

        let mut visitor = JsonFieldVisitor::default();
        event.record(&mut visitor);

        let mut root = Map::new();
        root.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
        root.insert("level".to_string(), Value::String(meta.level().to_string()));
        root.insert("target".to_string(), Value::String(meta.target().to_string()));
        root.insert("component".to_string(), Value::String(component_name(meta.target()).to_string()));
        if let Some(message) = visitor.message.take() {
            root.insert("message".to_string(), Value::String(message));
        }

        let mut fields = visitor.fields;
        if let Some(span) = ctx.lookup_current() {
            fields.insert("span_name".to_string(), Value::String(span.metadata().name().to_string()));
        }
        if !fields.is_empty() {
            root.insert("fields".to_string(), Value::Object(fields));
        }

        let line = serde_json::to_string(&Value::Object(root)).map_err(|_| std::fmt::Error)?;
        writeln!(writer, "{}", line)
    }
}

/// Initialize the global tracing subscriber.
///
/// - `RUST_LOG` drives the filter, falling back to info for the portal crates
/// - `LOG_FORMAT=json` switches to [`JsonEventFormatter`], anything else gives compact console output
///
/// Calling this more than once keeps the first subscriber.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder().with_default_directive(Level::INFO.into()).parse_lossy(DEFAULT_FILTER)
    });

    let json = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);

    let result = if json {
        let fmt_layer = fmt::layer().event_format(JsonEventFormatter);
        tracing::subscriber::set_global_default(Registry::default().with(env_filter).with(fmt_layer))
    } else {
        let fmt_layer = fmt::layer().compact().with_target(true).with_line_number(true);
        tracing::subscriber::set_global_default(Registry::default().with(env_filter).with(fmt_layer))
    };

    if result.is_err() {
        tracing::debug!("Global tracing subscriber already installed, keeping it");
    }
}

/// Short component label for a tracing target
fn component_name(target: &str) -> &'static str {
    if target.starts_with("portal_client::client") {
        "TRANSPORT"
    } else if target.starts_with("portal_client::registry") {
        "REGISTRY"
    } else if target.starts_with("portal_client::validation") || target.starts_with("portal_client::guard") {
        "ADMISSION"
    } else if target.starts_with("portal_resilience") {
        "RETRY"
    } else if target.starts_with("portal_client") {
        "PORTAL"
    } else {
        "EXTERNAL"
    }
}
