//! Default configuration values.
//!
//! The default source set describes the public community services the
//! digest was built for; every entry can be overridden from YAML.

use crate::schema::{
    ChartConfig, ChartFormat, Config, FetchConfig, LoggingSettings, RunConfig, SourceSettings,
    StorageConfig, TopicConfig,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// User-Agent announced to every source
pub const DEFAULT_USER_AGENT: &str = concat!(
    "tmetrics/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/engels74/tmetrics)"
);

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            sources: default_sources(),
            topics: default_topics(),
            charts: ChartConfig::default(),
            storage: StorageConfig::default(),
            run: RunConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_retries: 3,
            max_rate_limit_waits: 3,
            backoff_base_ms: 1000,
            max_backoff_seconds: 60,
            rate_limit_fallback_seconds: 60,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 600,
            format: ChartFormat::Png,
            history_months: 24,
            font_family: "sans-serif".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/series"),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            worker_limit: 4,
            run_timeout_seconds: 1800,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_path: None,
        }
    }
}

struct SourceDefaults {
    adapter: &'static str,
    label: &'static str,
    base_url: &'static str,
    page_size: u32,
    anonymous: u32,
    authenticated: u32,
    params: &'static [(&'static str, &'static str)],
}

impl From<SourceDefaults> for SourceSettings {
    fn from(d: SourceDefaults) -> Self {
        Self {
            adapter: d.adapter.to_string(),
            label: d.label.to_string(),
            base_url: d.base_url.to_string(),
            page_size: d.page_size,
            requests_per_hour: d.anonymous,
            authenticated_requests_per_hour: d.authenticated,
            params: d
                .params
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            token: None,
        }
    }
}

/// Built-in source set
pub fn default_sources() -> BTreeMap<String, SourceSettings> {
    let entries = [
        (
            "bugzilla",
            SourceDefaults {
                adapter: "bugzilla",
                label: "Bugzilla",
                base_url: "https://bugzilla.mozilla.org/rest/",
                page_size: 1000,
                anonymous: 600,
                authenticated: 3600,
                params: &[("product", "Thunderbird,MailNews Core,Calendar,Chat Core")],
            },
        ),
        (
            "crash_stats",
            SourceDefaults {
                adapter: "crash_stats",
                label: "Crash Stats",
                base_url: "https://crash-stats.mozilla.org/api/",
                page_size: 1,
                anonymous: 600,
                authenticated: 3600,
                params: &[("product", "Thunderbird")],
            },
        ),
        (
            "code_coverage",
            SourceDefaults {
                adapter: "code_coverage",
                label: "Code Coverage",
                base_url: "https://coverage.thunderbird.net/v2/",
                page_size: 1,
                anonymous: 600,
                authenticated: 600,
                params: &[],
            },
        ),
        (
            "github",
            SourceDefaults {
                adapter: "github",
                label: "GitHub (thunderbird-android)",
                base_url: "https://api.github.com/",
                page_size: 100,
                anonymous: 60,
                authenticated: 5000,
                params: &[("repository", "thunderbird/thunderbird-android")],
            },
        ),
        (
            "discourse",
            SourceDefaults {
                adapter: "discourse",
                label: "Mozilla Discourse",
                base_url: "https://discourse.mozilla.org/",
                page_size: 100,
                anonymous: 600,
                authenticated: 3600,
                params: &[("category", "thunderbird")],
            },
        ),
        (
            "sumo",
            SourceDefaults {
                adapter: "sumo",
                label: "Mozilla Support (SUMO)",
                base_url: "https://support.mozilla.org/api/2/",
                page_size: 20,
                anonymous: 600,
                authenticated: 600,
                params: &[("product", "thunderbird")],
            },
        ),
        (
            "addons",
            SourceDefaults {
                adapter: "addons",
                label: "Thunderbird Add-ons",
                base_url: "https://addons.thunderbird.net/api/v4/",
                page_size: 50,
                anonymous: 600,
                authenticated: 600,
                params: &[("app", "thunderbird"), ("type", "extension")],
            },
        ),
        (
            "weblate",
            SourceDefaults {
                adapter: "weblate",
                label: "Weblate activity (tb-android)",
                base_url: "https://hosted.weblate.org/api/",
                page_size: 1000,
                anonymous: 4,
                authenticated: 5000,
                params: &[("project", "tb-android")],
            },
        ),
        (
            "weblate_stats",
            SourceDefaults {
                adapter: "weblate_stats",
                label: "Weblate completion (tb-android)",
                base_url: "https://hosted.weblate.org/api/",
                page_size: 1000,
                anonymous: 4,
                authenticated: 5000,
                params: &[("project", "tb-android")],
            },
        ),
    ];

    entries
        .into_iter()
        .map(|(key, d)| (key.to_string(), SourceSettings::from(d)))
        .collect()
}

/// Built-in topics
pub fn default_topics() -> Vec<TopicConfig> {
    let topic = |key: &str, title: &str, sources: &[&str]| TopicConfig {
        key: key.to_string(),
        title: title.to_string(),
        sources: sources.iter().map(|s| (*s).to_string()).collect(),
    };

    vec![
        topic("bugs", "Bugs and crashes", &["bugzilla", "crash_stats", "code_coverage"]),
        topic("development", "Development", &["github"]),
        topic("community", "Community support", &["sumo", "discourse"]),
        topic("addons", "Add-ons", &["addons"]),
        topic("localization", "Localization", &["weblate_stats", "weblate"]),
    ]
}
