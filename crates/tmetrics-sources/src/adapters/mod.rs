//! Concrete adapters, one per source family.
//!
//! Each adapter owns a [`Fetcher`](crate::fetcher::Fetcher) and implements
//! [`PageDecoder`](crate::adapter::PageDecoder); the shared engine in
//! [`paginate_pages`](crate::adapter::paginate_pages) does the rest.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tmetrics_common::{MetricName, MetricRule, MetricSpec, MetricsError, Result, SourceKey};
use tmetrics_config::SourceSettings;

/// Wire an adapter holding `fetcher` and `metrics` fields into [`SourceAdapter`](crate::adapter::SourceAdapter)
macro_rules! source_adapter {
    ($adapter:ty, $scheme:expr) => {
        impl $crate::adapter::SourceAdapter for $adapter {
            fn source(&self) -> &$crate::source::Source {
                self.fetcher.source()
            }

            fn metrics(&self) -> &[tmetrics_common::MetricSpec] {
                &self.metrics
            }

            fn authenticate(&mut self, credential: $crate::fetcher::Credential) -> tmetrics_common::Result<()> {
                self.fetcher.authenticate(credential, $scheme)
            }

            fn paginate(
                &self,
                month: tmetrics_common::Month,
            ) -> futures::stream::BoxStream<'_, tmetrics_common::Result<tmetrics_common::RawDataPoint>> {
                $crate::adapter::paginate_pages(&self.fetcher, self, month)
            }
        }
    };
}

pub mod addon_catalog;
pub mod forum;
pub mod git_hosting;
pub mod issue_tracker;
pub mod localization;

pub use addon_catalog::AddonCatalogAdapter;
pub use forum::{DiscourseAdapter, SupportForumAdapter};
pub use git_hosting::GitHubAdapter;
pub use issue_tracker::{BugzillaAdapter, CodeCoverageAdapter, CrashStatsAdapter};
pub use localization::{WeblateChangesAdapter, WeblateStatsAdapter};

/// Metric definition with a validated name
pub(crate) fn metric(name: &str, label: &str, rule: MetricRule) -> Result<MetricSpec> {
    Ok(MetricSpec::new(MetricName::new(name)?, label, rule))
}

/// A parameter the adapter cannot work without
pub(crate) fn required_param(key: &SourceKey, settings: &SourceSettings, name: &str) -> Result<String> {
    settings
        .param(name)
        .map(str::to_string)
        .ok_or_else(|| MetricsError::config(format!("source '{key}' requires the '{name}' parameter")))
}

/// Parse the timestamp shapes the supported APIs return.
///
/// Values without an offset are taken as UTC.
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&midnight));
    }
    Err(MetricsError::validation_field(
        format!("unrecognised timestamp '{value}'"),
        "timestamp",
    ))
}

/// `YYYY-MM-DD`
pub(crate) fn format_day(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// `YYYY-MM-DDTHH:MM:SSZ`
pub(crate) fn format_instant(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmetrics_common::test_utils::mock_timestamp;

    #[test]
    fn test_parse_timestamp_shapes() {
        let expected = mock_timestamp(2024, 3, 5, 10, 30, 0);
        assert_eq!(parse_timestamp("2024-03-05T10:30:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-05T11:30:00+01:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-05 10:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-05T10:30:00.000").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2024-03-05").unwrap(),
            mock_timestamp(2024, 3, 5, 0, 0, 0)
        );
        assert!(parse_timestamp("last tuesday").is_err());
    }

    #[test]
    fn test_formatting() {
        let ts = mock_timestamp(2024, 3, 1, 0, 0, 0);
        assert_eq!(format_day(ts), "2024-03-01");
        assert_eq!(format_instant(ts), "2024-03-01T00:00:00Z");
    }
}
