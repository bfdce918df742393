//! Static registry of adapter families keyed by adapter id.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use tmetrics_common::{MetricsError, Result, SourceKey};
use tmetrics_config::{Config, SourceSettings};
use tracing::{debug, warn};

use crate::adapter::SourceAdapter;
use crate::adapters::{
    AddonCatalogAdapter, BugzillaAdapter, CodeCoverageAdapter, CrashStatsAdapter, DiscourseAdapter,
    GitHubAdapter, SupportForumAdapter, WeblateChangesAdapter, WeblateStatsAdapter,
};
use crate::fetcher::{Credential, FetchEnvironment, Fetcher};
use crate::source::{Capabilities, PaginationStyle, Source};

/// Everything an adapter needs to be built
#[derive(Debug, Clone)]
pub struct AdapterContext<'a> {
    /// Configured source key
    pub key: SourceKey,
    /// Source configuration
    pub settings: &'a SourceSettings,
    /// Shared fetch environment of the run
    pub env: FetchEnvironment,
    /// Reference time of the run, used to stamp snapshot readings
    pub as_of: DateTime<Utc>,
}

impl AdapterContext<'_> {
    /// Anonymous fetcher for this source with the family's fixed traits
    pub fn fetcher(&self, pagination: PaginationStyle, capabilities: Capabilities) -> Result<Fetcher> {
        let source = Source::from_settings(self.key.clone(), self.settings, pagination, capabilities)?;
        Fetcher::new(source, self.env.clone())
    }
}

/// Constructor of one adapter family
pub type AdapterFactory = fn(AdapterContext<'_>) -> Result<Box<dyn SourceAdapter>>;

macro_rules! factory {
    ($adapter:ty) => {{
        fn build(ctx: AdapterContext<'_>) -> Result<Box<dyn SourceAdapter>> {
            Ok(Box::new(<$adapter>::new(ctx)?))
        }
        build as AdapterFactory
    }};
}

static REGISTRY: Lazy<BTreeMap<&'static str, AdapterFactory>> = Lazy::new(|| {
    BTreeMap::from([
        ("bugzilla", factory!(BugzillaAdapter)),
        ("crash_stats", factory!(CrashStatsAdapter)),
        ("code_coverage", factory!(CodeCoverageAdapter)),
        ("github", factory!(GitHubAdapter)),
        ("discourse", factory!(DiscourseAdapter)),
        ("sumo", factory!(SupportForumAdapter)),
        ("addons", factory!(AddonCatalogAdapter)),
        ("weblate", factory!(WeblateChangesAdapter)),
        ("weblate_stats", factory!(WeblateStatsAdapter)),
    ])
});

/// Registered adapter ids, sorted
pub fn adapter_ids() -> impl Iterator<Item = &'static str> {
    REGISTRY.keys().copied()
}

/// Whether `id` names a registered adapter
pub fn is_registered(id: &str) -> bool {
    REGISTRY.contains_key(id)
}

/// Check every configured source names a registered adapter
pub fn check_adapters(config: &Config) -> Result<()> {
    for (key, settings) in &config.sources {
        if !is_registered(&settings.adapter) {
            return Err(MetricsError::config(format!(
                "source '{key}' uses unknown adapter '{}' (known: {})",
                settings.adapter,
                adapter_ids().collect::<Vec<_>>().join(", ")
            )));
        }
    }
    Ok(())
}

/// Build the adapter selected by the source's `adapter` setting
pub fn build_adapter(ctx: AdapterContext<'_>) -> Result<Box<dyn SourceAdapter>> {
    let factory = REGISTRY.get(ctx.settings.adapter.as_str()).ok_or_else(|| {
        MetricsError::config(format!(
            "source '{}' uses unknown adapter '{}'",
            ctx.key, ctx.settings.adapter
        ))
    })?;
    debug!(source = %ctx.key, adapter = %ctx.settings.adapter, "building adapter");
    factory(ctx)
}

/// Build an adapter and attach `credential` when the source accepts one
pub fn build_source(ctx: AdapterContext<'_>, credential: Option<Credential>) -> Result<Box<dyn SourceAdapter>> {
    let key = ctx.key.clone();
    let mut adapter = build_adapter(ctx)?;
    if let Some(credential) = credential {
        if adapter.source().capabilities.token_auth {
            adapter.authenticate(credential)?;
        } else {
            warn!(source = %key, "source does not accept credentials, continuing anonymously");
        }
    }
    Ok(adapter)
}
