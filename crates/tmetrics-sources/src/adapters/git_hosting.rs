//! Git hosting: issues and pull requests of one repository.

use serde::Deserialize;
use tmetrics_common::{MetricRule, MetricSpec, Month, RawDataPoint, Result};

use super::{format_instant, metric, parse_timestamp, required_param};
use crate::adapter::{Page, PageCursor, PageDecoder};
use crate::fetcher::{AuthScheme, Fetcher};
use crate::registry::AdapterContext;
use crate::source::{Capabilities, PaginationStyle};
use crate::transport::{FetchRequest, FetchResponse};

/// Issue opened in the month
pub const ISSUE_OPENED: &str = "issue_opened";
/// Issue closed in the month
pub const ISSUE_CLOSED: &str = "issue_closed";
/// Pull request opened in the month
pub const PR_OPENED: &str = "pr_opened";
/// Pull request closed or merged in the month
pub const PR_CLOSED: &str = "pr_closed";

/// Repository activity from the issues listing, which also carries pull requests
pub struct GitHubAdapter {
    fetcher: Fetcher,
    metrics: Vec<MetricSpec>,
    repository: String,
}

#[derive(Debug, Deserialize)]
struct Issue {
    created_at: String,
    #[serde(default)]
    closed_at: Option<String>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl GitHubAdapter {
    /// Build from configuration
    pub fn new(ctx: AdapterContext<'_>) -> Result<Self> {
        let repository = required_param(&ctx.key, ctx.settings, "repository")?;
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
                metric("issues_opened", "Issues opened", MetricRule::Category(ISSUE_OPENED.into()))?,
                metric("issues_closed", "Issues closed", MetricRule::Category(ISSUE_CLOSED.into()))?,
                metric("prs_opened", "Pull requests opened", MetricRule::Category(PR_OPENED.into()))?,
                metric("prs_closed", "Pull requests closed", MetricRule::Category(PR_CLOSED.into()))?,
            ],
            repository,
        })
    }
}

impl PageDecoder for GitHubAdapter {
    fn request(&self, month: Month, cursor: &PageCursor) -> Result<FetchRequest> {
        let request = match cursor {
            // The link already carries every filter
            PageCursor::Next(url) => FetchRequest::get(url.clone()),
            _ => {
                let path = format!("repos/{}/issues", self.repository.trim_matches('/'));
                FetchRequest::get(self.fetcher.source().endpoint(&path)?)
                    .query("state", "all")
                    .query("since", format_instant(month.start()))
                    .query("per_page", self.fetcher.source().page_size.min(100))
            }
        };
        Ok(request.header("Accept", "application/vnd.github+json"))
    }

    fn decode(&self, _month: Month, _cursor: &PageCursor, response: &FetchResponse) -> Result<Page> {
        let issues: Vec<Issue> = response.json()?;
        let mut points = Vec::with_capacity(issues.len());
        for issue in &issues {
            let (opened, closed) = if issue.pull_request.is_some() {
                (PR_OPENED, PR_CLOSED)
            } else {
                (ISSUE_OPENED, ISSUE_CLOSED)
            };
            points.push(RawDataPoint::category(parse_timestamp(&issue.created_at)?, opened));
            if let Some(closed_at) = &issue.closed_at {
                points.push(RawDataPoint::category(parse_timestamp(closed_at)?, closed));
            }
        }
        Ok(Page::with_next(points, response.link_next().map(PageCursor::Next)))
    }
}

source_adapter!(GitHubAdapter, AuthScheme::Bearer);
