//! Rate-limited, retrying fetcher bound to one source.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tmetrics_common::{MetricsError, Result};
use tmetrics_config::FetchConfig;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tracing::{debug, instrument, warn};

use crate::source::Source;
use crate::throttle::{Sleeper, Throttle, ThrottlePool, TokioSleeper};
use crate::transport::{FetchRequest, FetchResponse, HttpTransport, ReqwestTransport, TransportError};

/// How a credential is presented to a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `Authorization: Token <token>`
    Token,
    /// Token sent in a dedicated header
    Header(&'static str),
}

/// A per-source secret
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    fn header(&self, scheme: AuthScheme) -> (String, String) {
        match scheme {
            AuthScheme::Bearer => ("Authorization".to_string(), format!("Bearer {}", self.0)),
            AuthScheme::Token => ("Authorization".to_string(), format!("Token {}", self.0)),
            AuthScheme::Header(name) => (name.to_string(), self.0.clone()),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Retry and wait budget of a fetcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after transient failures
    pub max_retries: u32,
    /// Waits after rate-limited responses
    pub max_rate_limit_waits: u32,
    /// First backoff delay
    pub backoff_base: Duration,
    /// Backoff cap
    pub max_backoff: Duration,
    /// Wait after a rate-limited response without a hint
    pub rate_limit_fallback: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            max_rate_limit_waits: config.max_rate_limit_waits,
            backoff_base: config.backoff_base(),
            max_backoff: config.max_backoff(),
            rate_limit_fallback: config.rate_limit_fallback(),
        }
    }
}

impl RetryPolicy {
    /// Jittered exponential delays: base, 2*base, 4*base, ... capped
    fn backoff(&self) -> impl Iterator<Item = Duration> {
        let base_ms = u64::try_from(self.backoff_base.as_millis()).unwrap_or(u64::MAX).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(base_ms / 2)
            .max_delay(self.max_backoff)
            .map(jitter)
    }
}

/// Everything fetchers share across sources within a run
#[derive(Clone)]
pub struct FetchEnvironment {
    /// Network access
    pub transport: Arc<dyn HttpTransport>,
    /// Suspension seam
    pub sleeper: Arc<dyn Sleeper>,
    /// Per-source throttles shared by every fetcher of the run
    pub throttles: ThrottlePool,
    /// Retry budget
    pub policy: RetryPolicy,
}

impl FetchEnvironment {
    /// Real network, tokio timer and system clock
    pub fn live(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            transport: Arc::new(ReqwestTransport::new(config.timeout(), &config.user_agent)?),
            sleeper: Arc::new(TokioSleeper),
            throttles: ThrottlePool::default(),
            policy: RetryPolicy::from(config),
        })
    }
}

impl fmt::Debug for FetchEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchEnvironment")
            .field("throttles", &self.throttles)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

enum Attempt {
    Done(FetchResponse),
    RateLimited(Duration),
    Transient(String, Option<TransportError>),
    Fatal(u16, String),
}

/// Issues requests for one source, honouring its throttle and retry rules
pub struct Fetcher {
    source: Source,
    env: FetchEnvironment,
    throttle: Arc<dyn Throttle>,
    credential: Option<(Credential, AuthScheme)>,
}

impl Fetcher {
    /// Anonymous fetcher using the source's anonymous ceiling
    pub fn new(source: Source, env: FetchEnvironment) -> Result<Self> {
        let throttle = env.throttles.get(&source.key, source.rate.anonymous_per_hour)?;
        Ok(Self {
            source,
            env,
            throttle,
            credential: None,
        })
    }

    /// The source this fetcher talks to
    pub const fn source(&self) -> &Source {
        &self.source
    }

    /// Whether a credential is attached
    pub const fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    /// Minimum spacing currently enforced
    pub fn interval(&self) -> Duration {
        self.throttle.interval()
    }

    /// Attach a credential and switch to the authenticated ceiling
    pub fn authenticate(&mut self, credential: Credential, scheme: AuthScheme) -> Result<()> {
        if !self.source.capabilities.token_auth {
            return Err(MetricsError::validation_field(
                format!("source '{}' does not accept credentials", self.source.key),
                "token",
            ));
        }
        self.throttle = self
            .env
            .throttles
            .get(&self.source.key, self.source.rate.authenticated_per_hour)?;
        self.credential = Some((credential, scheme));
        debug!(source = %self.source.key, interval = ?self.throttle.interval(), "credential attached");
        Ok(())
    }

    /// Send a request, waiting for the throttle and retrying per policy
    #[instrument(skip(self, request), fields(source = %self.source.key, url = %request.url))]
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let key = self.source.key.as_str();
        let request = self.authorize(request);
        let mut backoff = self.env.policy.backoff();
        let mut failures = 0u32;
        let mut rate_limited = 0u32;

        loop {
            self.wait_for_slot().await;

            match self.classify(self.env.transport.execute(&request).await) {
                Attempt::Done(response) => {
                    debug!(status = response.status, "request succeeded");
                    return Ok(response);
                }
                Attempt::RateLimited(wait) => {
                    rate_limited += 1;
                    if rate_limited > self.env.policy.max_rate_limit_waits {
                        return Err(MetricsError::rate_limit_exceeded(key, rate_limited));
                    }
                    warn!(attempt = rate_limited, ?wait, "rate limited, waiting for the window to reset");
                    self.env.sleeper.sleep(wait).await;
                }
                Attempt::Transient(message, cause) => {
                    failures += 1;
                    if failures > self.env.policy.max_retries {
                        let message = format!("{message} (gave up after {failures} attempts)");
                        return Err(match cause {
                            Some(cause) => MetricsError::network_with_source(key, message, cause),
                            None => MetricsError::network(key, message),
                        });
                    }
                    let delay = backoff.next().unwrap_or(self.env.policy.max_backoff);
                    warn!(attempt = failures, ?delay, %message, "transient failure, backing off");
                    self.env.sleeper.sleep(delay).await;
                }
                Attempt::Fatal(status, excerpt) => {
                    return Err(MetricsError::http(key, status, excerpt));
                }
            }
        }
    }

    async fn wait_for_slot(&self) {
        while let Err(wait) = self.throttle.try_acquire() {
            let wait = wait.max(Duration::from_millis(1));
            debug!(?wait, "throttled");
            self.env.sleeper.sleep(wait).await;
        }
    }

    fn authorize(&self, request: &FetchRequest) -> FetchRequest {
        match &self.credential {
            Some((credential, scheme)) => {
                let (name, value) = credential.header(*scheme);
                request.clone().header(name, value)
            }
            None => request.clone(),
        }
    }

    fn classify(&self, outcome: std::result::Result<FetchResponse, TransportError>) -> Attempt {
        let response = match outcome {
            Ok(response) => response,
            Err(err) => return Attempt::Transient(err.to_string(), Some(err)),
        };

        if response.is_success() {
            return Attempt::Done(response);
        }

        let exhausted_quota = response.status == 403
            && response.header("x-ratelimit-remaining").map(str::trim) == Some("0");
        if response.status == 429 || exhausted_quota {
            let wait = response
                .retry_after()
                .unwrap_or(self.env.policy.rate_limit_fallback);
            return Attempt::RateLimited(wait);
        }

        if response.status >= 500 {
            return Attempt::Transient(format!("server error {}", response.status), None);
        }

        Attempt::Fatal(response.status, response.excerpt())
    }
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("source", &self.source.key)
            .field("interval", &self.throttle.interval())
            .field("authenticated", &self.credential.is_some())
            .finish()
    }
}
