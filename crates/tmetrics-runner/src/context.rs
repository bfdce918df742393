//! Run-scoped settings passed explicitly through every step.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tmetrics_common::Month;
use tmetrics_config::Config;
use tmetrics_sources::{Credential, FetchEnvironment};
use tokio::time::Instant;

/// Everything one run needs to know, fixed before the first topic starts
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Month being reported
    pub month: Month,
    /// Calendar month of `as_of`; earlier months are final
    pub current_month: Month,
    /// Reference time of the run
    pub as_of: DateTime<Utc>,
    /// Sources fetched at once within a topic
    pub worker_limit: usize,
    /// Budget for fetching and aggregating across the whole run
    pub run_timeout: Duration,
    /// When the run budget runs out; fixed once for every topic
    pub deadline: Instant,
    /// Months shown in charts, ending at `month`
    pub history_months: u32,
    /// Root of the dated output directories
    pub output_dir: PathBuf,
    /// Shared fetch environment
    pub env: FetchEnvironment,
    credentials: BTreeMap<String, Credential>,
}

impl RunContext {
    /// Context for reporting `month`, or the month before `as_of` when absent
    pub fn new(config: &Config, env: FetchEnvironment, as_of: DateTime<Utc>, month: Option<Month>) -> Self {
        let credentials = config
            .sources
            .iter()
            .filter_map(|(key, settings)| {
                settings
                    .token
                    .as_deref()
                    .map(|token| (key.clone(), Credential::new(token)))
            })
            .collect();

        Self {
            month: month.unwrap_or_else(|| Month::previous_of(as_of)),
            current_month: Month::of(as_of),
            as_of,
            worker_limit: config.run.worker_limit.max(1),
            run_timeout: config.run.run_timeout(),
            deadline: Instant::now() + config.run.run_timeout(),
            history_months: config.charts.history_months.max(2),
            output_dir: config.run.output_dir.clone(),
            env,
            credentials,
        }
    }

    /// Credential configured for a source
    pub fn credential(&self, source_key: &str) -> Option<Credential> {
        self.credentials.get(source_key).cloned()
    }

    /// First month shown in charts
    pub fn history_start(&self) -> Month {
        let span = i32::try_from(self.history_months).unwrap_or(i32::MAX);
        self.month.offset(1 - span)
    }
}
