//! Scripted transport and manual timeline for exercising fetchers and adapters
//! without a network or a real clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::clock::FakeRelativeClock;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tmetrics_common::SourceKey;
use tmetrics_config::SourceSettings;

use crate::fetcher::{FetchEnvironment, RetryPolicy};
use crate::registry::AdapterContext;
use crate::throttle::{Sleeper, ThrottleClock, ThrottlePool};
use crate::transport::{FetchRequest, FetchResponse, HttpTransport, TransportError};

/// Base URL used by [`settings`]
pub const TEST_BASE_URL: &str = "https://api.test/";

/// Manual clock shared by throttles and the sleeper.
///
/// Sleeping advances time instantly.
#[derive(Debug, Default)]
pub struct FakeTimeline {
    clock: FakeRelativeClock,
    elapsed: Mutex<Duration>,
}

impl FakeTimeline {
    /// Timeline at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock to build throttles on
    pub fn clock(&self) -> FakeRelativeClock {
        self.clock.clone()
    }

    /// Time slept so far
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }

    /// Move time forward
    pub fn advance(&self, duration: Duration) {
        self.clock.advance(duration);
        *self.elapsed.lock() += duration;
    }
}

#[async_trait]
impl Sleeper for FakeTimeline {
    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// One scripted outcome
pub type Reply = std::result::Result<FetchResponse, TransportError>;

/// A request as the transport saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// URL including the query string
    pub url: String,
    /// Headers sent
    pub headers: BTreeMap<String, String>,
    /// Timeline position when sent
    pub at: Duration,
}

struct Route {
    pattern: String,
    replies: VecDeque<Reply>,
}

/// Transport answering from scripted routes.
///
/// A route matches when its pattern occurs in the full URL; the first
/// matching route wins. Replies are consumed in order and the last one
/// repeats. Unmatched requests get a 404.
pub struct ScriptedTransport {
    timeline: Option<Arc<FakeTimeline>>,
    routes: Mutex<Vec<Route>>,
    log: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    /// Transport without a timeline; recorded times are zero
    pub fn new() -> Self {
        Self {
            timeline: None,
            routes: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Transport recording request times from `timeline`
    pub fn with_timeline(timeline: Arc<FakeTimeline>) -> Self {
        Self {
            timeline: Some(timeline),
            ..Self::new()
        }
    }

    /// Script a sequence of replies for URLs containing `pattern`
    pub fn route(&self, pattern: impl Into<String>, replies: Vec<Reply>) -> &Self {
        self.routes.lock().push(Route {
            pattern: pattern.into(),
            replies: replies.into(),
        });
        self
    }

    /// Always answer URLs containing `pattern` with `response`
    pub fn respond(&self, pattern: impl Into<String>, response: FetchResponse) -> &Self {
        self.route(pattern, vec![Ok(response)])
    }

    /// Always answer URLs containing `pattern` with a 200 JSON body
    pub fn respond_json(&self, pattern: impl Into<String>, body: &serde_json::Value) -> &Self {
        self.respond(pattern, FetchResponse::new(200, body.to_string()))
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().clone()
    }

    /// Number of requests seen so far
    pub fn request_count(&self) -> usize {
        self.log.lock().len()
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &FetchRequest) -> std::result::Result<FetchResponse, TransportError> {
        let url = request.full_url();
        self.log.lock().push(RecordedRequest {
            url: url.clone(),
            headers: request.headers.iter().cloned().collect(),
            at: self.timeline.as_ref().map_or(Duration::ZERO, |t| t.elapsed()),
        });

        let mut routes = self.routes.lock();
        let Some(route) = routes.iter_mut().find(|r| url.contains(&r.pattern)) else {
            return Ok(FetchResponse::new(404, format!("no scripted route for {url}")));
        };
        if route.replies.len() > 1 {
            route.replies.pop_front().unwrap_or_else(|| Ok(FetchResponse::new(500, "")))
        } else {
            route
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(FetchResponse::new(404, "")))
        }
    }
}

/// Fetch environment wired to `transport` and a fresh timeline
pub fn fake_environment(transport: Arc<ScriptedTransport>, timeline: Arc<FakeTimeline>) -> FetchEnvironment {
    FetchEnvironment {
        transport,
        throttles: ThrottlePool::new(ThrottleClock::Manual(timeline.clock())),
        sleeper: timeline,
        policy: RetryPolicy::default(),
    }
}

/// Scripted transport and environment sharing one timeline
pub fn scripted_environment() -> (Arc<ScriptedTransport>, FetchEnvironment, Arc<FakeTimeline>) {
    let timeline = Arc::new(FakeTimeline::new());
    let transport = Arc::new(ScriptedTransport::with_timeline(timeline.clone()));
    let env = fake_environment(transport.clone(), timeline.clone());
    (transport, env, timeline)
}

/// Source settings pointing at [`TEST_BASE_URL`]
pub fn settings(adapter: &str, page_size: u32, params: &[(&str, &str)]) -> SourceSettings {
    SourceSettings {
        adapter: adapter.to_string(),
        label: format!("Test {adapter}"),
        base_url: TEST_BASE_URL.to_string(),
        page_size,
        requests_per_hour: 3600,
        authenticated_requests_per_hour: 36_000,
        params: params
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        token: None,
    }
}

/// Adapter context for `settings` under `key`
pub fn context<'a>(
    key: &str,
    settings: &'a SourceSettings,
    env: FetchEnvironment,
    as_of: DateTime<Utc>,
) -> AdapterContext<'a> {
    AdapterContext {
        key: SourceKey::new(key).expect("valid source key fixture"),
        settings,
        env,
        as_of,
    }
}
