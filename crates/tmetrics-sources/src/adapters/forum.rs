//! Forum and support-site sources: Discourse and the support question board.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::Los_Angeles;
use serde::Deserialize;
use tmetrics_common::{MetricRule, MetricSpec, MetricsError, Month, RawDataPoint, Result};

use super::{format_day, metric, parse_timestamp, required_param};
use crate::adapter::{page_number, Page, PageCursor, PageDecoder};
use crate::fetcher::{AuthScheme, Fetcher};
use crate::registry::AdapterContext;
use crate::source::{Capabilities, PaginationStyle};
use crate::transport::{FetchRequest, FetchResponse};

/// Discourse category, newest topics first
pub struct DiscourseAdapter {
    fetcher: Fetcher,
    metrics: Vec<MetricSpec>,
    category: String,
}

#[derive(Debug, Deserialize)]
struct CategoryListing {
    topic_list: TopicList,
}

#[derive(Debug, Deserialize)]
struct TopicList {
    #[serde(default)]
    topics: Vec<Topic>,
    #[serde(default)]
    more_topics_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Topic {
    title: String,
    created_at: String,
    #[serde(default)]
    posts_count: u64,
    #[serde(default)]
    pinned: bool,
}

impl DiscourseAdapter {
    /// Build from configuration
    pub fn new(ctx: AdapterContext<'_>) -> Result<Self> {
        let category = required_param(&ctx.key, ctx.settings, "category")?;
        let fetcher = ctx.fetcher(
            PaginationStyle::Page,
            Capabilities {
                token_auth: true,
                date_filter: false,
            },
        )?;
        Ok(Self {
            fetcher,
            metrics: vec![
                metric("topics_created", "Topics created", MetricRule::Occurrences)?,
                metric("topic_replies", "Replies to new topics", MetricRule::Sum)?,
            ],
            category,
        })
    }
}

impl PageDecoder for DiscourseAdapter {
    fn request(&self, _month: Month, cursor: &PageCursor) -> Result<FetchRequest> {
        let path = format!("c/{}/l/latest.json", self.category.trim_matches('/'));
        Ok(FetchRequest::get(self.fetcher.source().endpoint(&path)?)
            .query("order", "created")
            .query("page", page_number(cursor, 0))
            .query("per_page", self.fetcher.source().page_size))
    }

    fn decode(&self, month: Month, cursor: &PageCursor, response: &FetchResponse) -> Result<Page> {
        let listing: CategoryListing = response.json()?;
        let mut points = Vec::with_capacity(listing.topic_list.topics.len() * 2);
        let mut oldest: Option<DateTime<Utc>> = None;
        for topic in &listing.topic_list.topics {
            let created = parse_timestamp(&topic.created_at)?;
            points.push(RawDataPoint::text(created, &topic.title));
            points.push(RawDataPoint::count(created, topic.posts_count.saturating_sub(1)));
            // Pinned topics sit on top regardless of age
            if !topic.pinned {
                oldest = Some(oldest.map_or(created, |o| o.min(created)));
            }
        }

        let past_window = oldest.is_some_and(|o| o < month.start());
        let next = (listing.topic_list.more_topics_url.is_some() && !past_window)
            .then(|| PageCursor::Page(page_number(cursor, 0) + 1));
        Ok(Page::with_next(points, next))
    }
}

source_adapter!(DiscourseAdapter, AuthScheme::Header("Api-Key"));

/// Support question board, oldest questions first.
///
/// Each configured product is walked as its own listing. Question times are
/// Los Angeles wall-clock values whatever offset they carry.
pub struct SupportForumAdapter {
    fetcher: Fetcher,
    metrics: Vec<MetricSpec>,
    products: Vec<String>,
}

/// Category for a question asked in the month
pub const QUESTION: &str = "question";
/// Category for a question with at least one answer
pub const ANSWERED: &str = "answered";
/// Category for a question marked solved
pub const SOLVED: &str = "solved";
/// Status category: no answer yet
pub const STATUS_OPEN: &str = "status:open";
/// Status category: answered but not solved
pub const STATUS_ANSWERED: &str = "status:answered";
/// Status category: solved
pub const STATUS_SOLVED: &str = "status:solved";

/// Product category of a question
pub fn product_category(product: &str) -> String {
    format!("product:{product}")
}

#[derive(Debug, Deserialize)]
struct QuestionPage {
    #[serde(default)]
    results: Vec<Question>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Question {
    created: String,
    #[serde(default)]
    product: Option<String>,
    #[serde(default)]
    num_answers: u64,
    #[serde(default)]
    is_solved: bool,
}

impl Question {
    const fn status(&self) -> &'static str {
        if self.is_solved {
            STATUS_SOLVED
        } else if self.num_answers > 0 {
            STATUS_ANSWERED
        } else {
            STATUS_OPEN
        }
    }
}

/// Read a board timestamp as Los Angeles local time, ignoring any offset
fn parse_board_time(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    let naive = DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.naive_local())
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        })
        .ok_or_else(|| {
            MetricsError::validation_field(format!("unrecognised timestamp '{value}'"), "created")
        })?;
    // Wall-clock times skipped by the spring transition resolve an hour later
    let local = Los_Angeles
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| Los_Angeles.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .ok_or_else(|| {
            MetricsError::validation_field(format!("no local time for '{value}'"), "created")
        })?;
    Ok(local.with_timezone(&Utc))
}

fn product_metric_name(product: &str) -> String {
    let slug: String = product
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("questions_{slug}")
}

impl SupportForumAdapter {
    /// Build from configuration
    pub fn new(ctx: AdapterContext<'_>) -> Result<Self> {
        let products = ctx.settings.param_list("product");
        if products.is_empty() {
            return Err(MetricsError::config(format!(
                "source '{}' requires the 'product' parameter",
                ctx.key
            )));
        }
        let fetcher = ctx.fetcher(
            PaginationStyle::Page,
            Capabilities {
                token_auth: false,
                date_filter: true,
            },
        )?;

        let mut metrics = vec![
            metric("questions", "Questions asked", MetricRule::Category(QUESTION.into()))?,
            metric("questions_answered", "Questions answered", MetricRule::Category(ANSWERED.into()))?,
            metric("questions_solved", "Questions solved", MetricRule::Category(SOLVED.into()))?,
            metric("questions_open", "Questions without an answer", MetricRule::Category(STATUS_OPEN.into()))?,
            metric(
                "questions_answered_unsolved",
                "Questions answered, not solved",
                MetricRule::Category(STATUS_ANSWERED.into()),
            )?,
        ];
        for product in &products {
            metrics.push(metric(
                &product_metric_name(product),
                &format!("Questions about {product}"),
                MetricRule::Category(product_category(product)),
            )?);
        }

        Ok(Self {
            fetcher,
            metrics,
            products,
        })
    }

    const fn position(cursor: &PageCursor) -> (usize, u32) {
        match cursor {
            PageCursor::Segment(product, page) => (*product, *page),
            _ => (0, 1),
        }
    }
}

impl PageDecoder for SupportForumAdapter {
    fn request(&self, month: Month, cursor: &PageCursor) -> Result<FetchRequest> {
        let (index, page) = Self::position(cursor);
        let product = self
            .products
            .get(index)
            .ok_or_else(|| MetricsError::validation(format!("no product at position {index}")))?;
        // The board filters on its local calendar; one spare day each side
        // covers the offset and the exclusive bounds
        let after = month.start() - Duration::days(2);
        let before = month.end() + Duration::days(1);
        Ok(FetchRequest::get(self.fetcher.source().endpoint("question")?)
            .query("product", product)
            .query("created__gt", format_day(after))
            .query("created__lt", format_day(before))
            .query("ordering", "+created")
            .query("page", page))
    }

    fn decode(&self, month: Month, cursor: &PageCursor, response: &FetchResponse) -> Result<Page> {
        let (index, page_no) = Self::position(cursor);
        let requested = self.products.get(index).map_or("", String::as_str);
        let page: QuestionPage = response.json()?;
        let mut points = Vec::with_capacity(page.results.len() * 4);
        let mut newest = None;
        for question in &page.results {
            let created = parse_board_time(&question.created)?;
            points.push(RawDataPoint::category(created, QUESTION));
            if question.num_answers > 0 {
                points.push(RawDataPoint::category(created, ANSWERED));
            }
            if question.is_solved {
                points.push(RawDataPoint::category(created, SOLVED));
            }
            points.push(RawDataPoint::category(created, question.status()));
            let product = question.product.as_deref().unwrap_or(requested);
            points.push(RawDataPoint::category(created, product_category(product)));
            newest = Some(created);
        }

        let past_window = newest.is_some_and(|n| n >= month.end());
        let next = if page.next.is_some() && !past_window {
            Some(PageCursor::Segment(index, page_no + 1))
        } else if index + 1 < self.products.len() {
            Some(PageCursor::Segment(index + 1, 1))
        } else {
            None
        };
        Ok(Page::with_next(points, next))
    }
}

source_adapter!(SupportForumAdapter, AuthScheme::Token);
