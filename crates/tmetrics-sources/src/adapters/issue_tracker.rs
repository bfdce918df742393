//! Issue-tracker style sources: Bugzilla, crash statistics and code coverage.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tmetrics_common::{MetricRule, MetricSpec, MetricUnit, Month, RawDataPoint, Result};
use tracing::warn;

use super::{format_day, format_instant, metric, parse_timestamp, required_param};
use crate::adapter::{next_offset, Page, PageCursor, PageDecoder};
use crate::fetcher::{AuthScheme, Fetcher};
use crate::registry::AdapterContext;
use crate::source::{Capabilities, PaginationStyle};
use crate::transport::{FetchRequest, FetchResponse};

/// Category emitted for a newly filed bug
pub const CREATED: &str = "created";
/// Category emitted for a bug resolved in the month
pub const RESOLVED: &str = "resolved";

/// Bug tracker listing bugs filed and resolved per month
pub struct BugzillaAdapter {
    fetcher: Fetcher,
    metrics: Vec<MetricSpec>,
    products: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BugList {
    bugs: Vec<Bug>,
}

#[derive(Debug, Deserialize)]
struct Bug {
    creation_time: String,
    #[serde(default)]
    cf_last_resolved: Option<String>,
}

impl BugzillaAdapter {
    /// Build from configuration
    pub fn new(ctx: AdapterContext<'_>) -> Result<Self> {
        let products = ctx.settings.param_list("product");
        let fetcher = ctx.fetcher(
            PaginationStyle::Offset,
            Capabilities {
                token_auth: true,
                date_filter: true,
            },
        )?;
        Ok(Self {
            fetcher,
            metrics: vec![
                metric("bugs_created", "Bugs filed", MetricRule::Category(CREATED.into()))?,
                metric("bugs_resolved", "Bugs resolved", MetricRule::Category(RESOLVED.into()))?,
            ],
            products,
        })
    }
}

impl PageDecoder for BugzillaAdapter {
    fn request(&self, month: Month, cursor: &PageCursor) -> Result<FetchRequest> {
        let offset = match cursor {
            PageCursor::Offset(offset) => *offset,
            _ => 0,
        };
        let mut request = FetchRequest::get(self.fetcher.source().endpoint("bug")?);
        for product in &self.products {
            request = request.query("product", product);
        }
        Ok(request
            .query("include_fields", "id,creation_time,cf_last_resolved")
            .query("last_change_time", format_instant(month.start()))
            .query("limit", self.fetcher.source().page_size)
            .query("offset", offset))
    }

    fn decode(&self, _month: Month, cursor: &PageCursor, response: &FetchResponse) -> Result<Page> {
        let list: BugList = response.json()?;
        let mut points = Vec::with_capacity(list.bugs.len());
        for bug in &list.bugs {
            points.push(RawDataPoint::category(parse_timestamp(&bug.creation_time)?, CREATED));
            if let Some(resolved) = bug.cf_last_resolved.as_deref().filter(|s| !s.is_empty()) {
                points.push(RawDataPoint::category(parse_timestamp(resolved)?, RESOLVED));
            }
        }
        let next = next_offset(cursor, list.bugs.len(), self.fetcher.source().page_size);
        Ok(Page::with_next(points, next))
    }
}

source_adapter!(BugzillaAdapter, AuthScheme::Header("X-BUGZILLA-API-KEY"));

/// Crash report counts from a daily search histogram
pub struct CrashStatsAdapter {
    fetcher: Fetcher,
    metrics: Vec<MetricSpec>,
    product: String,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    facets: SearchFacets,
}

#[derive(Debug, Deserialize)]
struct SearchFacets {
    #[serde(default)]
    histogram_date: Vec<HistogramBin>,
}

#[derive(Debug, Deserialize)]
struct HistogramBin {
    term: String,
    count: u64,
}

impl CrashStatsAdapter {
    /// Build from configuration
    pub fn new(ctx: AdapterContext<'_>) -> Result<Self> {
        let product = required_param(&ctx.key, ctx.settings, "product")?;
        let fetcher = ctx.fetcher(
            PaginationStyle::None,
            Capabilities {
                token_auth: true,
                date_filter: true,
            },
        )?;
        Ok(Self {
            fetcher,
            metrics: vec![metric("crash_reports", "Crash reports", MetricRule::Sum)?],
            product,
        })
    }
}

impl PageDecoder for CrashStatsAdapter {
    fn request(&self, month: Month, _cursor: &PageCursor) -> Result<FetchRequest> {
        Ok(FetchRequest::get(self.fetcher.source().endpoint("SuperSearch/")?)
            .query("product", &self.product)
            .query("date", format!(">={}", format_day(month.start())))
            .query("date", format!("<{}", format_day(month.end())))
            .query("_results_number", 0)
            .query("_histogram.date", "product")
            .query("_histogram_interval.date", "1d"))
    }

    fn decode(&self, _month: Month, _cursor: &PageCursor, response: &FetchResponse) -> Result<Page> {
        let results: SearchResults = response.json()?;
        let points = results
            .facets
            .histogram_date
            .iter()
            .map(|bin| Ok(RawDataPoint::count(parse_timestamp(&bin.term)?, bin.count)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::last(points))
    }
}

source_adapter!(CrashStatsAdapter, AuthScheme::Header("Auth-Token"));

/// Line coverage history, averaged per month
pub struct CodeCoverageAdapter {
    fetcher: Fetcher,
    metrics: Vec<MetricSpec>,
    path: String,
}

#[derive(Debug, Deserialize)]
struct CoverageSample {
    date: i64,
    coverage: f64,
}

impl CodeCoverageAdapter {
    /// Build from configuration
    pub fn new(ctx: AdapterContext<'_>) -> Result<Self> {
        let path = ctx.settings.param("path").unwrap_or_default().to_string();
        let fetcher = ctx.fetcher(
            PaginationStyle::None,
            Capabilities {
                token_auth: false,
                date_filter: false,
            },
        )?;
        Ok(Self {
            fetcher,
            metrics: vec![metric("line_coverage", "Line coverage", MetricRule::Average)?
                .with_unit(MetricUnit::Percent)],
            path,
        })
    }
}

impl PageDecoder for CodeCoverageAdapter {
    fn request(&self, _month: Month, _cursor: &PageCursor) -> Result<FetchRequest> {
        Ok(FetchRequest::get(self.fetcher.source().endpoint("history")?).query("path", &self.path))
    }

    fn decode(&self, _month: Month, _cursor: &PageCursor, response: &FetchResponse) -> Result<Page> {
        let samples: Vec<CoverageSample> = response.json()?;
        let points = samples
            .iter()
            .filter_map(|sample| {
                let Some(ts) = DateTime::<Utc>::from_timestamp(sample.date, 0) else {
                    warn!(date = sample.date, "coverage sample with out-of-range timestamp skipped");
                    return None;
                };
                Some(RawDataPoint::count(ts, hundredths(sample.coverage)))
            })
            .collect();
        Ok(Page::last(points))
    }
}

source_adapter!(CodeCoverageAdapter, AuthScheme::Bearer);

/// Percentage as integer hundredths, clamped to 0..=100%
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn hundredths(percent: f64) -> u64 {
    if percent.is_finite() {
        (percent.clamp(0.0, 100.0) * 100.0).round() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{collect_month, SourceAdapter};
    use crate::fetcher::Credential;
    use crate::test_support::{context, scripted_environment, settings};
    use serde_json::json;
    use tmetrics_common::test_utils::{mock_timestamp, month};

    #[tokio::test]
    async fn test_bugzilla_pages_until_short_page() {
        let (transport, env, _) = scripted_environment();
        let config = settings("bugzilla", 2, &[("product", "Thunderbird, Calendar")]);
        let mut adapter = BugzillaAdapter::new(context("bugzilla", &config, env, mock_timestamp(2024, 4, 2, 0, 0, 0))).unwrap();
        adapter.authenticate(Credential::new("key")).unwrap();

        transport.respond_json(
            "offset=0",
            &json!({ "bugs": [
                { "id": 1, "creation_time": "2024-03-02T10:00:00Z", "cf_last_resolved": "2024-03-20 09:00:00" },
                { "id": 2, "creation_time": "2024-02-10T10:00:00Z", "cf_last_resolved": "2024-03-05 09:00:00" }
            ]}),
        );
        transport.respond_json(
            "offset=2",
            &json!({ "bugs": [
                { "id": 3, "creation_time": "2024-03-28T10:00:00Z", "cf_last_resolved": null }
            ]}),
        );

        let points = collect_month(&adapter, month("2024-03")).await.unwrap();
        let [created, resolved] = adapter.metrics() else {
            panic!("two bug metrics expected");
        };
        assert_eq!(created.evaluate(&points), Some(2));
        assert_eq!(resolved.evaluate(&points), Some(2));

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].url.contains("product=Thunderbird&product=Calendar"));
        assert!(requests[0].url.contains("last_change_time=2024-03-01T00%3A00%3A00Z"));
        assert_eq!(requests[0].headers.get("X-BUGZILLA-API-KEY").map(String::as_str), Some("key"));
    }

    #[tokio::test]
    async fn test_crash_stats_sums_histogram() {
        let (transport, env, _) = scripted_environment();
        let config = settings("crash_stats", 1, &[("product", "Thunderbird")]);
        let adapter = CrashStatsAdapter::new(context("crash_stats", &config, env, mock_timestamp(2024, 4, 2, 0, 0, 0))).unwrap();

        transport.respond_json(
            "SuperSearch",
            &json!({ "total": 30, "facets": { "histogram_date": [
                { "term": "2024-03-01T00:00:00+00:00", "count": 10 },
                { "term": "2024-03-02T00:00:00+00:00", "count": 20 }
            ]}}),
        );

        let points = collect_month(&adapter, month("2024-03")).await.unwrap();
        assert_eq!(adapter.metrics()[0].evaluate(&points), Some(30));
        let url = &transport.requests()[0].url;
        assert!(url.contains("date=%3E%3D2024-03-01"));
        assert!(url.contains("date=%3C2024-04-01"));
    }

    #[tokio::test]
    async fn test_coverage_averages_month_samples() {
        let (transport, env, _) = scripted_environment();
        let config = settings("code_coverage", 1, &[]);
        let mut adapter = CodeCoverageAdapter::new(context("code_coverage", &config, env, mock_timestamp(2024, 4, 2, 0, 0, 0))).unwrap();
        assert!(adapter.authenticate(Credential::new("unused")).is_err());

        let march_1 = mock_timestamp(2024, 3, 1, 0, 0, 0).timestamp();
        let march_15 = mock_timestamp(2024, 3, 15, 0, 0, 0).timestamp();
        let april_1 = mock_timestamp(2024, 4, 1, 0, 0, 0).timestamp();
        transport.respond_json(
            "history",
            &json!([
                { "date": april_1, "coverage": 70.0 },
                { "date": march_15, "coverage": 60.5 },
                { "date": march_1, "coverage": 60.0 }
            ]),
        );

        let points = collect_month(&adapter, month("2024-03")).await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(adapter.metrics()[0].evaluate(&points), Some(6025));
    }

    #[tokio::test]
    async fn test_coverage_month_without_samples_has_no_value() {
        let (transport, env, _) = scripted_environment();
        let config = settings("code_coverage", 1, &[]);
        let adapter = CodeCoverageAdapter::new(context("code_coverage", &config, env, mock_timestamp(2024, 4, 2, 0, 0, 0))).unwrap();

        let february = mock_timestamp(2024, 2, 20, 0, 0, 0).timestamp();
        transport.respond_json("history", &json!([{ "date": february, "coverage": 60.1 }]));

        let points = collect_month(&adapter, month("2024-03")).await.unwrap();
        assert!(points.is_empty());
        assert_eq!(adapter.metrics()[0].evaluate(&points), None);
    }

    #[test]
    fn test_hundredths() {
        assert_eq!(hundredths(54.321), 5432);
        assert_eq!(hundredths(100.0), 10_000);
        assert_eq!(hundredths(-3.0), 0);
        assert_eq!(hundredths(f64::NAN), 0);
    }
}
