//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tmetrics_common::LoggingConfig;
use validator::Validate;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP and retry behaviour shared by every source
    pub fetch: FetchConfig,
    /// Configured sources keyed by source key
    pub sources: BTreeMap<String, SourceSettings>,
    /// Email topics in delivery order
    pub topics: Vec<TopicConfig>,
    /// Chart rendering settings
    pub charts: ChartConfig,
    /// Persisted series store
    pub storage: StorageConfig,
    /// Run-scoped limits
    pub run: RunConfig,
    /// Logging configuration
    pub logging: LoggingSettings,
}

impl Config {
    /// Settings of a configured source
    pub fn source(&self, key: &str) -> Option<&SourceSettings> {
        self.sources.get(key)
    }

    /// Topic by key
    pub fn topic(&self, key: &str) -> Option<&TopicConfig> {
        self.topics.iter().find(|t| t.key == key)
    }
}

/// HTTP fetch and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub timeout_seconds: u64,

    /// Retries after transient network failures or 5xx responses
    #[validate(range(max = 10, message = "Max retries cannot exceed 10"))]
    pub max_retries: u32,

    /// Waits allowed after rate-limited responses before giving up
    #[validate(range(max = 10, message = "Max rate limit waits cannot exceed 10"))]
    pub max_rate_limit_waits: u32,

    /// First backoff delay; doubles on every retry
    #[validate(range(min = 10, max = 60000, message = "Backoff base must be between 10 and 60000 ms"))]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay
    #[validate(range(min = 1, max = 3600, message = "Max backoff must be between 1 and 3600 seconds"))]
    pub max_backoff_seconds: u64,

    /// Wait after a rate-limited response that carries no retry hint
    #[validate(range(min = 1, max = 3600, message = "Fallback wait must be between 1 and 3600 seconds"))]
    pub rate_limit_fallback_seconds: u64,

    /// User-Agent sent with every request
    #[validate(length(min = 1, message = "User agent cannot be empty"))]
    pub user_agent: String,
}

impl FetchConfig {
    /// Request timeout
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Backoff base delay
    pub const fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Backoff cap
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds)
    }

    /// Fallback rate limit wait
    pub const fn rate_limit_fallback(&self) -> Duration {
        Duration::from_secs(self.rate_limit_fallback_seconds)
    }
}

/// Settings of one source.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct SourceSettings {
    /// Registry id of the adapter family serving this source
    #[validate(length(min = 1, message = "Adapter id cannot be empty"))]
    pub adapter: String,

    /// Human label used in reports
    #[validate(length(min = 1, message = "Source label cannot be empty"))]
    pub label: String,

    /// Base endpoint, ending with `/`
    #[validate(url(message = "Base URL must be a valid URL"))]
    pub base_url: String,

    /// Requested page size
    #[validate(range(min = 1, max = 10000, message = "Page size must be between 1 and 10000"))]
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Request ceiling without a credential
    #[validate(range(min = 1, max = 1000000, message = "Requests per hour must be between 1 and 1000000"))]
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u32,

    /// Request ceiling with a credential
    #[validate(range(min = 1, max = 1000000, message = "Requests per hour must be between 1 and 1000000"))]
    #[serde(default = "default_requests_per_hour")]
    pub authenticated_requests_per_hour: u32,

    /// Adapter specific parameters (product, repository, category, project, ...)
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Credential; normally supplied through `TMETRICS_TOKEN_<KEY>`
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

const fn default_page_size() -> u32 {
    100
}

const fn default_requests_per_hour() -> u32 {
    3600
}

impl SourceSettings {
    /// Adapter parameter by name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Comma separated adapter parameter as a list
    pub fn param_list(&self, name: &str) -> Vec<String> {
        self.param(name)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSettings")
            .field("adapter", &self.adapter)
            .field("label", &self.label)
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("requests_per_hour", &self.requests_per_hour)
            .field("authenticated_requests_per_hour", &self.authenticated_requests_per_hour)
            .field("params", &self.params)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One email digest.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TopicConfig {
    /// Stable topic key, used for the report file name
    #[validate(length(min = 1, max = 64, message = "Topic key must be 1-64 characters"))]
    pub key: String,

    /// Section title
    #[validate(length(min = 1, message = "Topic title cannot be empty"))]
    pub title: String,

    /// Source keys in report priority order
    #[validate(length(min = 1, message = "Topic must list at least one source"))]
    pub sources: Vec<String>,
}

/// Image format of rendered charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartFormat {
    /// Raster PNG
    #[default]
    Png,
    /// Vector SVG
    Svg,
}

impl ChartFormat {
    /// File extension without the dot
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }
}

/// Chart rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ChartConfig {
    /// Image width in pixels
    #[validate(range(min = 200, max = 4000, message = "Width must be between 200 and 4000 pixels"))]
    pub width: u32,

    /// Image height in pixels
    #[validate(range(min = 150, max = 4000, message = "Height must be between 150 and 4000 pixels"))]
    pub height: u32,

    /// Output format
    pub format: ChartFormat,

    /// Months shown, ending at the target month
    #[validate(range(min = 2, max = 240, message = "History must be between 2 and 240 months"))]
    pub history_months: u32,

    /// Font family for captions and labels
    #[validate(length(min = 1, message = "Font family cannot be empty"))]
    pub font_family: String,
}

/// Persisted series store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory of the embedded key-value store
    pub path: PathBuf,
}

/// Run-scoped limits.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RunConfig {
    /// Sources fetched concurrently within a topic
    #[validate(range(min = 1, max = 64, message = "Worker limit must be between 1 and 64"))]
    pub worker_limit: usize,

    /// Overall budget for fetching and aggregating, shared by every topic of a run
    #[validate(range(min = 1, max = 86400, message = "Run timeout must be between 1 and 86400 seconds"))]
    pub run_timeout_seconds: u64,

    /// Root of the dated output directories
    pub output_dir: PathBuf,
}

impl RunConfig {
    /// Run timeout
    pub const fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level or filter directive
    #[validate(custom = "crate::validator::validate_log_level")]
    pub level: String,

    /// JSON output
    pub json: bool,

    /// Optional log file
    pub file_path: Option<String>,
}

impl LoggingSettings {
    /// Convert into the subscriber configuration
    pub fn to_logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.level.clone(),
            json_format: self.json,
            file_path: self.file_path.clone(),
            ..LoggingConfig::default()
        }
    }
}
