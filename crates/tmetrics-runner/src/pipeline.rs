//! Topic runs: sources in parallel, each through fetch, aggregate, trend,
//! render, then one composed section.

use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tmetrics_common::{MetricSpec, MetricsError, Result, SourceKey, TimeSeries};
use tmetrics_config::{Config, TopicConfig};
use tmetrics_graphs::{
    aggregate_all, chart_file_name, Chart, ChartRenderer, ChartStatus, ChartStyle, DataAnomaly, LineChartRenderer,
    SeriesStore,
};
use tmetrics_report::{compose, MetricReport, ReportSection, SourceOutcome};
use tmetrics_sources::{build_source, collect_month, AdapterContext};
use tokio::time::timeout_at;
use tracing::{error, info, instrument, warn};

use crate::context::RunContext;
use crate::error::{RunnerError, RunnerResult};
use crate::output::chart_dir;
use crate::state::{PipelineState, StateTrace, TopicState};

/// Finished run of one topic
#[derive(Debug, Clone)]
pub struct TopicRun {
    /// Terminal state
    pub state: TopicState,
    /// Composed section, also for a failed topic
    pub section: ReportSection,
    /// State history of every source, in completion order
    pub traces: Vec<StateTrace>,
}

impl TopicRun {
    /// Whether every source was unavailable
    pub fn is_failed(&self) -> bool {
        self.state == TopicState::Failed
    }
}

struct MergedMetric {
    spec: MetricSpec,
    series: TimeSeries,
    anomaly: Option<DataAnomaly>,
}

/// Runs topics against one store and renderer
pub struct Pipeline {
    config: Arc<Config>,
    store: SeriesStore,
    renderer: Arc<dyn ChartRenderer>,
}

impl Pipeline {
    /// Pipeline with an explicit renderer
    pub fn new(config: Arc<Config>, store: SeriesStore, renderer: Arc<dyn ChartRenderer>) -> Self {
        Self {
            config,
            store,
            renderer,
        }
    }

    /// Pipeline drawing line charts in the configured style
    pub fn with_line_charts(config: Arc<Config>, store: SeriesStore) -> Self {
        let renderer = Arc::new(LineChartRenderer::new(ChartStyle::from(&config.charts)));
        Self::new(config, store, renderer)
    }

    /// The series store
    pub const fn store(&self) -> &SeriesStore {
        &self.store
    }

    /// Topics to run: the named ones in the given order, or all configured topics
    pub fn select_topics(&self, names: &[String]) -> RunnerResult<Vec<TopicConfig>> {
        if names.is_empty() {
            return Ok(self.config.topics.clone());
        }
        names
            .iter()
            .map(|name| {
                self.config
                    .topic(name)
                    .cloned()
                    .ok_or_else(|| RunnerError::UnknownTopic(name.clone()))
            })
            .collect()
    }

    /// Run one topic to a composed section
    #[instrument(skip_all, fields(topic = %topic.key, month = %ctx.month))]
    pub async fn run_topic(&self, ctx: &RunContext, topic: &TopicConfig) -> TopicRun {
        let charts = chart_dir(&ctx.output_dir, ctx.month);

        let keys: Vec<SourceKey> = topic
            .sources
            .iter()
            .filter_map(|key| match SourceKey::new(key.as_str()) {
                Ok(key) => Some(key),
                Err(e) => {
                    error!(source = %key, error = %e, "invalid source key in topic");
                    None
                }
            })
            .collect();

        let (outcomes, traces): (Vec<_>, Vec<_>) = stream::iter(keys)
            .map(|key| self.run_source(ctx, key, &charts))
            .buffer_unordered(ctx.worker_limit)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .unzip();

        let section = compose(topic, ctx.month, outcomes);
        let state = if section.is_failed() {
            error!(sources = section.subsections.len(), "every source of the topic was unavailable");
            TopicState::Failed
        } else {
            info!(
                available = section.available_count(),
                unavailable = section.unavailable_count(),
                "topic composed"
            );
            TopicState::Composed
        };

        TopicRun {
            state,
            section,
            traces,
        }
    }

    async fn run_source(
        &self,
        ctx: &RunContext,
        key: SourceKey,
        charts: &Path,
    ) -> (SourceOutcome, StateTrace) {
        let label = self
            .config
            .source(key.as_str())
            .map_or_else(|| key.to_string(), |s| s.label.clone());
        let mut trace = StateTrace::new(key.clone());
        trace.advance(PipelineState::Fetching);

        let merged = match timeout_at(ctx.deadline, self.fetch_and_merge(ctx, &key, &mut trace)).await {
            Ok(Ok(merged)) => merged,
            Ok(Err(e)) => {
                warn!(source = %key, error = %e, "source unavailable");
                trace.advance(PipelineState::Unavailable);
                return (
                    SourceOutcome::Unavailable {
                        key,
                        label,
                        reason: e.to_string(),
                    },
                    trace,
                );
            }
            Err(_) => {
                warn!(source = %key, state = %trace.current(), "source cancelled by run timeout");
                trace.advance(PipelineState::Unavailable);
                return (
                    SourceOutcome::Unavailable {
                        key,
                        label,
                        reason: format!("run timed out after {}s", ctx.run_timeout.as_secs()),
                    },
                    trace,
                );
            }
        };

        trace.advance(PipelineState::Trending);
        let mut reports: Vec<MetricReport> = merged
            .iter()
            .map(|m| {
                let report = MetricReport::from_series(m.spec.clone(), &m.series, ctx.month);
                match &m.anomaly {
                    Some(anomaly) => report.with_anomaly(anomaly),
                    None => report,
                }
            })
            .collect();

        trace.advance(PipelineState::Rendering);
        for (report, metric) in reports.iter_mut().zip(&merged) {
            report.chart = Some(self.render_chart(ctx, &label, metric, charts).await);
        }

        trace.advance(PipelineState::Composed);
        (
            SourceOutcome::Available {
                key,
                label,
                metrics: reports,
            },
            trace,
        )
    }

    async fn fetch_and_merge(&self, ctx: &RunContext, key: &SourceKey, trace: &mut StateTrace) -> Result<Vec<MergedMetric>> {
        let settings = self
            .config
            .source(key.as_str())
            .ok_or_else(|| MetricsError::config(format!("source '{key}' is not configured")))?;
        let adapter = build_source(
            AdapterContext {
                key: key.clone(),
                settings,
                env: ctx.env.clone(),
                as_of: ctx.as_of,
            },
            ctx.credential(key.as_str()),
        )?;

        let points = collect_month(adapter.as_ref(), ctx.month).await?;
        trace.advance(PipelineState::Aggregating);

        let buckets = aggregate_all(key, adapter.metrics(), ctx.month, &points);
        let mut merged = Vec::with_capacity(buckets.len());
        for (spec, bucket) in adapter.metrics().iter().zip(&buckets) {
            let (series, outcome) = self.store.merge(bucket, ctx.current_month).await?;
            merged.push(MergedMetric {
                spec: spec.clone(),
                series,
                anomaly: outcome.anomaly,
            });
        }
        Ok(merged)
    }

    async fn render_chart(&self, ctx: &RunContext, label: &str, metric: &MergedMetric, charts: &Path) -> Chart {
        let window = metric.series.window(ctx.history_start(), ctx.month);
        let source = window.source.clone();
        let name = window.metric.clone();
        let path = charts.join(chart_file_name(&source, &name, self.config.charts.format));

        let renderer = Arc::clone(&self.renderer);
        let spec = metric.spec.clone();
        let title = format!("{label}: {}", spec.label);
        let dir = charts.to_path_buf();
        match tokio::task::spawn_blocking(move || renderer.render(&window, &spec, &title, &dir)).await {
            Ok(chart) => chart,
            Err(e) => {
                warn!(source = %source, metric = %name, error = %e, "chart task failed");
                Chart {
                    source,
                    metric: name,
                    path,
                    status: ChartStatus::Omitted {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }
}
