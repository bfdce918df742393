//! Localization platform: change history and completion statistics.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tmetrics_common::{MetricRule, MetricSpec, MetricUnit, Month, RawDataPoint, Result};

use super::issue_tracker::hundredths;
use super::{format_instant, metric, parse_timestamp, required_param};
use crate::adapter::{Page, PageCursor, PageDecoder};
use crate::fetcher::{AuthScheme, Fetcher};
use crate::registry::AdapterContext;
use crate::source::{Capabilities, PaginationStyle};
use crate::transport::{FetchRequest, FetchResponse};

/// Action name the platform uses for a freshly added translation
pub const NEW_TRANSLATION: &str = "New translation";

#[derive(Debug, Deserialize)]
struct ChangePage {
    #[serde(default)]
    results: Vec<Change>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Change {
    timestamp: String,
    action_name: String,
}

/// Change log of one project, filtered server side to the month
pub struct WeblateChangesAdapter {
    fetcher: Fetcher,
    metrics: Vec<MetricSpec>,
    project: String,
}

impl WeblateChangesAdapter {
    /// Build from configuration
    pub fn new(ctx: AdapterContext<'_>) -> Result<Self> {
        let project = required_param(&ctx.key, ctx.settings, "project")?;
        let fetcher = ctx.fetcher(
            PaginationStyle::Cursor,
            Capabilities {
                token_auth: true,
                date_filter: true,
            },
        )?;
        Ok(Self {
            fetcher,
            metrics: vec![
                metric("changes", "Translation changes", MetricRule::Occurrences)?,
                metric(
                    "new_translations",
                    "New translations",
                    MetricRule::Category(NEW_TRANSLATION.into()),
                )?,
            ],
            project,
        })
    }
}

impl PageDecoder for WeblateChangesAdapter {
    fn request(&self, month: Month, cursor: &PageCursor) -> Result<FetchRequest> {
        if let PageCursor::Next(url) = cursor {
            return Ok(FetchRequest::get(url.clone()));
        }
        let path = format!("projects/{}/changes/", self.project);
        Ok(FetchRequest::get(self.fetcher.source().endpoint(&path)?)
            .query("timestamp_after", format_instant(month.start()))
            .query("timestamp_before", format_instant(month.end()))
            .query("page_size", self.fetcher.source().page_size))
    }

    fn decode(&self, _month: Month, _cursor: &PageCursor, response: &FetchResponse) -> Result<Page> {
        let page: ChangePage = response.json()?;
        let points = page
            .results
            .iter()
            .map(|change| Ok(RawDataPoint::category(parse_timestamp(&change.timestamp)?, &change.action_name)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::with_next(points, page.next.map(PageCursor::Next)))
    }
}

source_adapter!(WeblateChangesAdapter, AuthScheme::Token);

#[derive(Debug, Deserialize)]
struct ProjectStatistics {
    translated_percent: f64,
}

/// Current completion of one project.
///
/// The platform only reports the present value, so the reading is stamped
/// inside the requested month at the run's reference time.
pub struct WeblateStatsAdapter {
    fetcher: Fetcher,
    metrics: Vec<MetricSpec>,
    project: String,
    as_of: DateTime<Utc>,
}

impl WeblateStatsAdapter {
    /// Build from configuration
    pub fn new(ctx: AdapterContext<'_>) -> Result<Self> {
        let project = required_param(&ctx.key, ctx.settings, "project")?;
        let as_of = ctx.as_of;
        let fetcher = ctx.fetcher(
            PaginationStyle::None,
            Capabilities {
                token_auth: true,
                date_filter: false,
            },
        )?;
        Ok(Self {
            fetcher,
            metrics: vec![metric("translated", "Translation completion", MetricRule::Average)?
                .with_unit(MetricUnit::Percent)],
            project,
            as_of,
        })
    }
}

/// Instant a snapshot taken at `as_of` is attributed to, if `month` had begun by then
pub fn snapshot_stamp(month: Month, as_of: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if as_of < month.start() {
        return None;
    }
    Some(as_of.min(month.end() - Duration::seconds(1)))
}

impl PageDecoder for WeblateStatsAdapter {
    fn request(&self, _month: Month, _cursor: &PageCursor) -> Result<FetchRequest> {
        let path = format!("projects/{}/statistics/", self.project);
        Ok(FetchRequest::get(self.fetcher.source().endpoint(&path)?))
    }

    fn decode(&self, month: Month, _cursor: &PageCursor, response: &FetchResponse) -> Result<Page> {
        let stats: ProjectStatistics = response.json()?;
        let points = snapshot_stamp(month, self.as_of)
            .map(|ts| RawDataPoint::count(ts, hundredths(stats.translated_percent)))
            .into_iter()
            .collect();
        Ok(Page::last(points))
    }
}

source_adapter!(WeblateStatsAdapter, AuthScheme::Token);
