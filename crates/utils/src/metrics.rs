use opentelemetry::metrics::{Counter, Gauge, Meter};

pub use once_cell::sync::Lazy;

pub trait Metrics {
    fn register() -> Self;
}

/// Declare a lazily registered metrics struct as a `static`.
///
/// The instruments are created on first use against whatever meter provider
/// is installed globally at that moment (a no-op provider when none is).
#[macro_export]
macro_rules! register_metric {
    ($name:ident, $type:ty) => {
        pub static $name: $crate::metrics::Lazy<$type> = $crate::metrics::Lazy::new(|| <$type>::register());
    };
}

pub fn register_gauge_metric_instrument(
    crate_meter: &Meter,
    instrument_name: String,
    desc: String,
    unit: String,
) -> Gauge<f64> {
    crate_meter.f64_gauge(instrument_name).with_description(desc).with_unit(unit).init()
}

pub fn register_counter_metric_instrument(
    crate_meter: &Meter,
    instrument_name: String,
    desc: String,
    unit: String,
) -> Counter<f64> {
    crate_meter.f64_counter(instrument_name).with_description(desc).with_unit(unit).init()
}
