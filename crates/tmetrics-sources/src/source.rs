//! Static description of an external data provider.

use std::time::Duration;
use tmetrics_common::{MetricsError, Result, SourceKey};
use tmetrics_config::SourceSettings;
use url::Url;

use crate::throttle::interval_for;

/// How a source splits its results into pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStyle {
    /// `offset`/`limit` parameters
    Offset,
    /// Page numbers
    Page,
    /// Opaque next cursor or link
    Cursor,
    /// A single response
    None,
}

/// What a source supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Accepts a bearer token or API key
    pub token_auth: bool,
    /// Filters server side by date
    pub date_filter: bool,
}

/// Documented request ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCeiling {
    /// Requests per hour without a credential
    pub anonymous_per_hour: u32,
    /// Requests per hour with a credential
    pub authenticated_per_hour: u32,
}

/// One configured external provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Unique key
    pub key: SourceKey,
    /// Human label
    pub label: String,
    /// Base endpoint, always ending with `/`
    pub base_url: Url,
    /// Requested page size
    pub page_size: u32,
    /// Pagination idiom
    pub pagination: PaginationStyle,
    /// Capability flags
    pub capabilities: Capabilities,
    /// Request ceilings
    pub rate: RateCeiling,
}

impl Source {
    /// Build from configuration plus the adapter family's fixed traits
    pub fn from_settings(
        key: SourceKey,
        settings: &SourceSettings,
        pagination: PaginationStyle,
        capabilities: Capabilities,
    ) -> Result<Self> {
        let mut base = settings.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| {
            MetricsError::config_with_source(format!("invalid base URL for source '{key}'"), e)
        })?;

        Ok(Self {
            key,
            label: settings.label.clone(),
            base_url,
            page_size: settings.page_size.max(1),
            pagination,
            capabilities,
            rate: RateCeiling {
                anonymous_per_hour: settings.requests_per_hour,
                authenticated_per_hour: settings.authenticated_requests_per_hour,
            },
        })
    }

    /// Minimum spacing between requests
    pub fn min_request_interval(&self, authenticated: bool) -> Duration {
        if authenticated {
            interval_for(self.rate.authenticated_per_hour)
        } else {
            interval_for(self.rate.anonymous_per_hour)
        }
    }

    /// Resolve a path relative to the base endpoint
    pub fn endpoint(&self, path: &str) -> Result<String> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map(String::from)
            .map_err(|e| {
                MetricsError::config_with_source(
                    format!("cannot build endpoint '{path}' for source '{}'", self.key),
                    e,
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn settings(base_url: &str) -> SourceSettings {
        SourceSettings {
            adapter: "bugzilla".into(),
            label: "Tracker".into(),
            base_url: base_url.into(),
            page_size: 500,
            requests_per_hour: 60,
            authenticated_requests_per_hour: 3600,
            params: BTreeMap::new(),
            token: None,
        }
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let source = Source::from_settings(
            SourceKey::new("tracker").unwrap(),
            &settings("https://bugs.example.org/rest"),
            PaginationStyle::Offset,
            Capabilities {
                token_auth: true,
                date_filter: true,
            },
        )
        .unwrap();

        assert_eq!(source.endpoint("bug").unwrap(), "https://bugs.example.org/rest/bug");
        assert_eq!(source.endpoint("/bug").unwrap(), "https://bugs.example.org/rest/bug");
        assert_eq!(source.min_request_interval(false), Duration::from_secs(60));
        assert_eq!(source.min_request_interval(true), Duration::from_secs(1));
    }
}
