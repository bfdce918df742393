//! Per-source request throttling and the suspension seam.
//!
//! A [`Throttle`] only answers "may I send now, and if not, how long until
//! I may"; waiting is delegated to a [`Sleeper`] so the same fetch loop runs
//! against the tokio timer in production and a manual clock in tests.

use async_trait::async_trait;
use dashmap::DashMap;
use governor::{
    clock::{Clock, FakeRelativeClock, QuantaClock},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tmetrics_common::{MetricsError, Result, SourceKey};

type DirectLimiter<C> = RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Decides when the next request to a source may be sent
pub trait Throttle: Send + Sync {
    /// Take a slot now, or report how long until one frees up
    fn try_acquire(&self) -> std::result::Result<(), Duration>;

    /// Minimum spacing between two requests
    fn interval(&self) -> Duration;
}

/// Fixed-interval throttle backed by a GCRA limiter without burst.
///
/// With an interval of `3600 / n` seconds no rolling hour ever holds more
/// than `n` requests.
pub struct GovernorThrottle<C: Clock> {
    limiter: DirectLimiter<C>,
    clock: C,
    interval: Duration,
}

impl<C: Clock> GovernorThrottle<C> {
    /// Throttle allowing one request per `interval`
    pub fn new(interval: Duration, clock: C) -> Result<Self> {
        let quota = Quota::with_period(interval)
            .ok_or_else(|| MetricsError::config("request interval must be greater than zero"))?;
        let limiter = RateLimiter::direct_with_clock(quota, &clock);
        Ok(Self {
            limiter,
            clock,
            interval,
        })
    }
}

impl<C> Throttle for GovernorThrottle<C>
where
    C: Clock + Send + Sync,
    C::Instant: Send + Sync,
{
    fn try_acquire(&self) -> std::result::Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Spacing that keeps a source under `per_hour` requests in any rolling hour
pub fn interval_for(per_hour: u32) -> Duration {
    let per_hour = per_hour.max(1);
    Duration::from_nanos(3_600_000_000_000 / u64::from(per_hour))
}

/// Clock family used to build throttles
#[derive(Debug, Clone)]
pub enum ThrottleClock {
    /// Monotonic system clock
    System(QuantaClock),
    /// Manually advanced clock
    Manual(FakeRelativeClock),
}

impl Default for ThrottleClock {
    fn default() -> Self {
        Self::System(QuantaClock::default())
    }
}

impl ThrottleClock {
    /// Throttle for a source allowed `per_hour` requests
    pub fn throttle(&self, per_hour: u32) -> Result<Arc<dyn Throttle>> {
        let interval = interval_for(per_hour);
        Ok(match self {
            Self::System(clock) => Arc::new(GovernorThrottle::new(interval, clock.clone())?),
            Self::Manual(clock) => Arc::new(GovernorThrottle::new(interval, clock.clone())?),
        })
    }
}

/// Run-wide throttles, one per source and ceiling.
///
/// Every fetcher built for the same source draws from the same limiter, so a
/// source listed under several topics still shares a single hourly budget.
/// Clones share the underlying map.
#[derive(Clone, Default)]
pub struct ThrottlePool {
    clock: ThrottleClock,
    throttles: Arc<DashMap<(SourceKey, u32), Arc<dyn Throttle>>>,
}

impl ThrottlePool {
    /// Empty pool on `clock`
    pub fn new(clock: ThrottleClock) -> Self {
        Self {
            clock,
            throttles: Arc::new(DashMap::new()),
        }
    }

    /// Shared throttle of `source` at `per_hour`, created on first use
    pub fn get(&self, source: &SourceKey, per_hour: u32) -> Result<Arc<dyn Throttle>> {
        let entry = self
            .throttles
            .entry((source.clone(), per_hour))
            .or_try_insert_with(|| self.clock.throttle(per_hour))?;
        Ok(Arc::clone(entry.value()))
    }

    /// Number of throttles handed out so far
    pub fn len(&self) -> usize {
        self.throttles.len()
    }

    /// Whether no throttle has been created yet
    pub fn is_empty(&self) -> bool {
        self.throttles.is_empty()
    }
}

impl fmt::Debug for ThrottlePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottlePool")
            .field("clock", &self.clock)
            .field("throttles", &self.throttles.len())
            .finish()
    }
}

/// Suspends the calling flow for a duration.
///
/// This is the only place the pipeline blocks on purpose.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Resume once `duration` has elapsed
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
