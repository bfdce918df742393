//! The source adapter contract and the shared pagination engine.

use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tmetrics_common::{MetricSpec, MetricsError, Month, RawDataPoint, Result};
use tracing::{debug, instrument};

use crate::fetcher::{Credential, Fetcher};
use crate::source::Source;
use crate::transport::{FetchRequest, FetchResponse};

/// Position in a paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Initial request
    First,
    /// Offset-based position
    Offset(u64),
    /// Page number
    Page(u32),
    /// Absolute URL or opaque token handed out by the source
    Next(String),
    /// Page number within one of several listings walked in turn
    Segment(usize, u32),
}

/// One decoded page
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Points found on the page, in source order
    pub points: Vec<RawDataPoint>,
    /// Where to continue; `None` ends pagination
    pub next: Option<PageCursor>,
}

impl Page {
    /// Final page
    pub const fn last(points: Vec<RawDataPoint>) -> Self {
        Self { points, next: None }
    }

    /// Page followed by `next`
    pub const fn with_next(points: Vec<RawDataPoint>, next: Option<PageCursor>) -> Self {
        Self { points, next }
    }
}

/// Translates a source's paging idiom into requests and decoded pages
pub trait PageDecoder: Send + Sync {
    /// Request for the page at `cursor`
    fn request(&self, month: Month, cursor: &PageCursor) -> Result<FetchRequest>;

    /// Decode the response for the page at `cursor`
    fn decode(&self, month: Month, cursor: &PageCursor, response: &FetchResponse) -> Result<Page>;
}

/// Shared capability contract of every source family
pub trait SourceAdapter: Send + Sync {
    /// The source served by this adapter
    fn source(&self) -> &Source;

    /// Metrics derived from this source's points
    fn metrics(&self) -> &[MetricSpec];

    /// Attach a credential, lifting the request ceiling
    fn authenticate(&mut self, credential: Credential) -> Result<()>;

    /// Lazy, finite sequence of the month's points.
    ///
    /// Any page failure ends the stream with `SourceUnavailable`.
    fn paginate(&self, month: Month) -> BoxStream<'_, Result<RawDataPoint>>;
}

/// Drive `decoder` page by page through `fetcher`, keeping only points inside `month`
pub fn paginate_pages<'a, D>(fetcher: &'a Fetcher, decoder: &'a D, month: Month) -> BoxStream<'a, Result<RawDataPoint>>
where
    D: PageDecoder + ?Sized,
{
    let key = fetcher.source().key.clone();

    stream::try_unfold(Some(PageCursor::First), move |state| {
        next_page(fetcher, decoder, month, state)
    })
    .map_ok(|points| stream::iter(points.into_iter().map(Ok::<_, MetricsError>)))
    .try_flatten()
    .try_filter(move |point| future::ready(month.contains(point.timestamp)))
    .map_err(move |err| MetricsError::source_unavailable(key.as_str(), err))
    .boxed()
}

async fn next_page<D>(
    fetcher: &Fetcher,
    decoder: &D,
    month: Month,
    state: Option<PageCursor>,
) -> Result<Option<(Vec<RawDataPoint>, Option<PageCursor>)>>
where
    D: PageDecoder + ?Sized,
{
    let Some(cursor) = state else {
        return Ok(None);
    };

    let request = decoder.request(month, &cursor)?;
    let response = fetcher.fetch(&request).await?;
    let page = decoder.decode(month, &cursor, &response)?;
    debug!(
        source = %fetcher.source().key,
        ?cursor,
        points = page.points.len(),
        more = page.next.is_some(),
        "page decoded"
    );

    if page.next.as_ref() == Some(&cursor) {
        return Err(MetricsError::validation(format!(
            "pagination did not advance past {cursor:?}"
        )));
    }

    Ok(Some((page.points, page.next)))
}

/// Next offset cursor, or `None` once a page comes back short
pub fn next_offset(cursor: &PageCursor, received: usize, page_size: u32) -> Option<PageCursor> {
    if received < page_size as usize {
        return None;
    }
    let current = match cursor {
        PageCursor::Offset(offset) => *offset,
        _ => 0,
    };
    Some(PageCursor::Offset(current + u64::from(page_size)))
}

/// Page number addressed by `cursor`, counting from `first`
pub const fn page_number(cursor: &PageCursor, first: u32) -> u32 {
    match cursor {
        PageCursor::Page(n) => *n,
        _ => first,
    }
}

/// Collect a whole month, failing as a unit
#[instrument(skip(adapter), fields(source = %adapter.source().key))]
pub async fn collect_month(adapter: &dyn SourceAdapter, month: Month) -> Result<Vec<RawDataPoint>> {
    let points: Vec<RawDataPoint> = adapter.paginate(month).try_collect().await?;
    debug!(points = points.len(), %month, "month collected");
    Ok(points)
}
