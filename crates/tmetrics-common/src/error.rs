//! Error taxonomy shared by every stage of the metrics pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Boxed error used as the `source` of wrapped failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for the metrics pipeline
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        /// Human readable description
        message: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The source kept answering "rate limited" after every allowed wait
    #[error("Rate limit exceeded for source '{source_key}' after {attempts} waits")]
    RateLimitExceeded {
        /// Key of the throttled source
        source_key: String,
        /// Number of rate-limited responses received
        attempts: u32,
    },

    /// Transient network failures that exhausted the retry budget
    #[error("Network error for source '{source_key}': {message}")]
    Network {
        /// Key of the source being fetched
        source_key: String,
        /// Human readable description
        message: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// Non-retryable HTTP status
    #[error("HTTP {status} from source '{source_key}': {message}")]
    Http {
        /// Key of the source being fetched
        source_key: String,
        /// HTTP status code
        status: u16,
        /// Short excerpt of the response
        message: String,
    },

    /// A source could not deliver a consistent month of data
    #[error("Source '{source_key}' unavailable: {cause}")]
    SourceUnavailable {
        /// Key of the failed source
        source_key: String,
        /// The failure that made the source unavailable
        #[source]
        cause: Box<MetricsError>,
    },

    /// Stored data disagrees with a re-fetch in a suspicious way
    #[error("Data anomaly for {source_key}/{metric} in {month}: {message}")]
    DataAnomaly {
        /// Key of the source
        source_key: String,
        /// Metric name
        metric: String,
        /// Month in `YYYY-MM` form
        month: String,
        /// Human readable description
        message: String,
    },

    /// Chart drawing errors
    #[error("Render error: {message}")]
    Render {
        /// Human readable description
        message: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// Persisted series store errors
    #[error("Storage error: {message}")]
    Storage {
        /// Human readable description
        message: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// Validation errors for identifiers, months or payloads
    #[error("Validation error: {message}")]
    Validation {
        /// Human readable description
        message: String,
        /// Offending field, if any
        field: Option<String>,
    },
}

impl MetricsError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new configuration error with source
    pub fn config_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a rate limit exhaustion error
    pub fn rate_limit_exceeded(source_key: impl Into<String>, attempts: u32) -> Self {
        Self::RateLimitExceeded {
            source_key: source_key.into(),
            attempts,
        }
    }

    /// Create a new network error
    pub fn network(source_key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Network {
            source_key: source_key.into(),
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new network error with source
    pub fn network_with_source(
        source_key: impl Into<String>,
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            source_key: source_key.into(),
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a non-retryable HTTP error
    pub fn http(source_key: impl Into<String>, status: u16, msg: impl Into<String>) -> Self {
        Self::Http {
            source_key: source_key.into(),
            status,
            message: msg.into(),
        }
    }

    /// Wrap a failure as `SourceUnavailable`; already wrapped errors are kept as they are
    pub fn source_unavailable(source_key: impl Into<String>, cause: Self) -> Self {
        match cause {
            already @ Self::SourceUnavailable { .. } => already,
            cause => Self::SourceUnavailable {
                source_key: source_key.into(),
                cause: Box::new(cause),
            },
        }
    }

    /// Create a data anomaly error
    pub fn data_anomaly(
        source_key: impl Into<String>,
        metric: impl Into<String>,
        month: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::DataAnomaly {
            source_key: source_key.into(),
            metric: metric.into(),
            month: month.into(),
            message: msg.into(),
        }
    }

    /// Create a new render error
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new render error with source
    pub fn render_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Render {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new storage error with source
    pub fn storage_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a new validation error for a specific field
    pub fn validation_field(msg: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Source key this error is attributed to, if any
    pub fn source_key(&self) -> Option<&str> {
        match self {
            Self::RateLimitExceeded { source_key, .. }
            | Self::Network { source_key, .. }
            | Self::Http { source_key, .. }
            | Self::SourceUnavailable { source_key, .. }
            | Self::DataAnomaly { source_key, .. } => Some(source_key),
            _ => None,
        }
    }

    /// HTTP status carried by the error, looking through `SourceUnavailable`
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::SourceUnavailable { cause, .. } => cause.http_status(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MetricsError {
    fn from(err: reqwest::Error) -> Self {
        let key = err
            .url()
            .and_then(|url| url.host_str())
            .unwrap_or("unknown")
            .to_string();

        if let Some(status) = err.status() {
            Self::http(key, status.as_u16(), err.to_string())
        } else if err.is_timeout() {
            Self::network_with_source(key, "request timed out", err)
        } else if err.is_connect() {
            Self::network_with_source(key, "connection failed", err)
        } else {
            Self::network_with_source(key, "request failed", err)
        }
    }
}

#[cfg(feature = "plotters")]
impl<T> From<plotters::drawing::DrawingAreaErrorKind<T>> for MetricsError
where
    T: std::error::Error + Send + Sync + 'static,
{
    fn from(err: plotters::drawing::DrawingAreaErrorKind<T>) -> Self {
        Self::render_with_source("drawing failed", err)
    }
}
