//! Test utilities and shared fixtures for the tmetrics workspace.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Once;

use crate::{MetricName, MetricRule, MetricSpec, Month, RawDataPoint, SourceKey};

static INIT: Once = Once::new();

/// Initialize logging for tests; safe to call from every test.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));

        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(filter)
            .try_init();
    });
}

/// Fixed timestamp fixture.
pub fn mock_timestamp(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
        .unwrap()
}

/// Parse a `YYYY-MM` month fixture.
pub fn month(value: &str) -> Month {
    value.parse().expect("valid month fixture")
}

/// Source key fixture.
pub fn source_key(value: &str) -> SourceKey {
    SourceKey::new(value).expect("valid source key fixture")
}

/// Metric name fixture.
pub fn metric_name(value: &str) -> MetricName {
    MetricName::new(value).expect("valid metric name fixture")
}

/// Metric counting category points with the given label.
pub fn category_metric(name: &str, label: &str) -> MetricSpec {
    MetricSpec::new(metric_name(name), name.replace('_', " "), MetricRule::Category(label.to_string()))
}

/// `count` category points spread over the first days of `month`.
pub fn category_points(month: Month, label: &str, count: usize) -> Vec<RawDataPoint> {
    (0..count)
        .map(|i| {
            let day = u32::try_from(i % 28).unwrap_or(0) + 1;
            let ts = mock_timestamp(month.year(), month.month(), day, 12, 0, 0);
            RawDataPoint::category(ts, label)
        })
        .collect()
}

/// Create a temporary directory for tests that automatically cleans up.
#[cfg(feature = "tempfile")]
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary directory")
}

/// Property-based testing strategies.
#[cfg(feature = "proptest")]
pub mod property_testing {
    use crate::Month;
    use proptest::prelude::*;

    /// Strategy for months between 2000 and 2099.
    pub fn month_strategy() -> impl Strategy<Value = Month> {
        (2000i32..2100, 1u32..=12).prop_map(|(y, m)| Month::new(y, m).expect("in range"))
    }

    /// Strategy for short sequences of monthly counts.
    pub fn counts_strategy() -> impl Strategy<Value = Vec<u64>> {
        proptest::collection::vec(0u64..10_000, 1..24)
    }
}
