//! Add-on catalog: listings sorted by last update.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tmetrics_common::{MetricRule, MetricSpec, Month, RawDataPoint, Result};

use super::{metric, parse_timestamp};
use crate::adapter::{page_number, Page, PageCursor, PageDecoder};
use crate::fetcher::{AuthScheme, Fetcher};
use crate::registry::AdapterContext;
use crate::source::{Capabilities, PaginationStyle};
use crate::transport::{FetchRequest, FetchResponse};

/// Add-on first published in the month
pub const CREATED: &str = "created";
/// Add-on updated in the month
pub const UPDATED: &str = "updated";

/// Catalog search listing, most recently updated first.
///
/// Download counts are a rolling weekly figure; they are attributed to the
/// month of the add-on's last update.
pub struct AddonCatalogAdapter {
    fetcher: Fetcher,
    metrics: Vec<MetricSpec>,
    app: String,
    kind: String,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<Addon>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Addon {
    created: String,
    last_updated: String,
    #[serde(default)]
    weekly_downloads: u64,
}

impl AddonCatalogAdapter {
    /// Build from configuration
    pub fn new(ctx: AdapterContext<'_>) -> Result<Self> {
        let app = ctx.settings.param("app").unwrap_or("thunderbird").to_string();
        let kind = ctx.settings.param("type").unwrap_or("extension").to_string();
        let fetcher = ctx.fetcher(
            PaginationStyle::Page,
            Capabilities {
                token_auth: false,
                date_filter: false,
            },
        )?;
        Ok(Self {
            fetcher,
            metrics: vec![
                metric("addons_created", "Add-ons published", MetricRule::Category(CREATED.into()))?,
                metric("addons_updated", "Add-ons updated", MetricRule::Category(UPDATED.into()))?,
                metric("weekly_downloads", "Weekly downloads of updated add-ons", MetricRule::Sum)?,
            ],
            app,
            kind,
        })
    }
}

impl PageDecoder for AddonCatalogAdapter {
    fn request(&self, _month: Month, cursor: &PageCursor) -> Result<FetchRequest> {
        Ok(FetchRequest::get(self.fetcher.source().endpoint("addons/search/")?)
            .query("app", &self.app)
            .query("type", &self.kind)
            .query("sort", "updated")
            .query("page_size", self.fetcher.source().page_size)
            .query("page", page_number(cursor, 1)))
    }

    fn decode(&self, month: Month, cursor: &PageCursor, response: &FetchResponse) -> Result<Page> {
        let page: SearchPage = response.json()?;
        let mut points = Vec::with_capacity(page.results.len() * 3);
        let mut oldest_update: Option<DateTime<Utc>> = None;
        for addon in &page.results {
            let updated = parse_timestamp(&addon.last_updated)?;
            points.push(RawDataPoint::category(parse_timestamp(&addon.created)?, CREATED));
            points.push(RawDataPoint::category(updated, UPDATED));
            points.push(RawDataPoint::count(updated, addon.weekly_downloads));
            oldest_update = Some(oldest_update.map_or(updated, |o| o.min(updated)));
        }

        // Anything created in the month was also updated in or after it
        let past_window = oldest_update.is_some_and(|o| o < month.start());
        let next = (page.next.is_some() && !past_window)
            .then(|| PageCursor::Page(page_number(cursor, 1) + 1));
        Ok(Page::with_next(points, next))
    }
}

source_adapter!(AddonCatalogAdapter, AuthScheme::Bearer);
