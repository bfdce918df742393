//! End-to-end topic runs against scripted sources

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tmetrics_common::test_utils::{create_temp_dir, mock_timestamp, month};
use tmetrics_common::{BucketValue, MetricSpec, TimeSeries};
use tmetrics_config::{ChartFormat, Config, TopicConfig};
use tmetrics_graphs::{chart_file_name, Chart, ChartRenderer, ChartStatus, SeriesStore};
use tmetrics_report::{render_markdown, SourceOutcome};
use tmetrics_runner::{write_section, Pipeline, PipelineState, RunContext, TopicState};
use tmetrics_sources::test_support::{scripted_environment, settings, ScriptedTransport};
use tmetrics_sources::{
    FetchEnvironment, FetchRequest, FetchResponse, HttpTransport, RetryPolicy, ThrottlePool, TokioSleeper,
    TransportError,
};

/// Renderer that records the chart path without drawing
struct NullRenderer;

impl ChartRenderer for NullRenderer {
    fn render(&self, series: &TimeSeries, _spec: &MetricSpec, _title: &str, dir: &Path) -> Chart {
        Chart {
            source: series.source.clone(),
            metric: series.metric.clone(),
            path: dir.join(chart_file_name(&series.source, &series.metric, ChartFormat::Png)),
            status: ChartStatus::Rendered,
        }
    }
}

fn test_config(output_dir: &Path) -> Config {
    let mut config = Config::default();
    config.sources.clear();
    config.sources.insert("coverage".to_string(), settings("code_coverage", 1, &[]));
    config
        .sources
        .insert("crashes".to_string(), settings("crash_stats", 1, &[("product", "Thunderbird")]));
    config
        .sources
        .insert("support".to_string(), settings("sumo", 20, &[("product", "thunderbird")]));
    config.topics = vec![
        TopicConfig {
            key: "quality".to_string(),
            title: "Quality".to_string(),
            sources: vec!["coverage".to_string(), "crashes".to_string(), "support".to_string()],
        },
        TopicConfig {
            key: "community".to_string(),
            title: "Community".to_string(),
            sources: vec!["support".to_string()],
        },
    ];
    config.run.output_dir = output_dir.to_path_buf();
    config
}

fn script_sources(transport: &ScriptedTransport) {
    let march_1 = mock_timestamp(2024, 3, 1, 0, 0, 0).timestamp();
    let march_15 = mock_timestamp(2024, 3, 15, 0, 0, 0).timestamp();
    transport.respond_json(
        "history",
        &json!([
            { "date": march_15, "coverage": 60.5 },
            { "date": march_1, "coverage": 60.0 }
        ]),
    );
    transport.respond_json(
        "SuperSearch",
        &json!({ "total": 30, "facets": { "histogram_date": [
            { "term": "2024-03-01T00:00:00+00:00", "count": 10 },
            { "term": "2024-03-02T00:00:00+00:00", "count": 20 }
        ]}}),
    );
    transport.respond("question", FetchResponse::new(503, "maintenance"));
}

fn current_values(outcome: &SourceOutcome) -> Vec<BucketValue> {
    match outcome {
        SourceOutcome::Available { metrics, .. } => metrics.iter().map(|m| m.current).collect(),
        SourceOutcome::Unavailable { .. } => Vec::new(),
    }
}

#[tokio::test]
async fn test_failing_source_does_not_fail_topic() {
    let dir = create_temp_dir();
    let config = Arc::new(test_config(dir.path()));
    let (transport, env, _) = scripted_environment();
    script_sources(&transport);

    let ctx = RunContext::new(&config, env, mock_timestamp(2024, 4, 2, 6, 0, 0), None);
    assert_eq!(ctx.month, month("2024-03"));
    let pipeline = Pipeline::new(Arc::clone(&config), SeriesStore::temporary().unwrap(), Arc::new(NullRenderer));
    let topic = pipeline.select_topics(&["quality".to_string()]).unwrap().remove(0);

    let run = pipeline.run_topic(&ctx, &topic).await;

    assert_eq!(run.state, TopicState::Composed);
    let keys: Vec<&str> = run.section.subsections.iter().map(|s| s.key().as_str()).collect();
    assert_eq!(keys, vec!["coverage", "crashes", "support"]);
    assert_eq!(run.section.available_count(), 2);
    assert_eq!(run.section.unavailable_count(), 1);
    assert_eq!(current_values(&run.section.subsections[0]), vec![BucketValue::Count(6025)]);
    assert_eq!(current_values(&run.section.subsections[1]), vec![BucketValue::Count(30)]);
    assert!(!run.section.subsections[2].is_available());
    assert_eq!(run.section.charts().len(), 2);

    for trace in &run.traces {
        let expected = if trace.source().as_str() == "support" {
            PipelineState::Unavailable
        } else {
            PipelineState::Composed
        };
        assert_eq!(trace.current(), expected, "source {}", trace.source());
    }

    let path = write_section(&ctx.output_dir, &run.section).unwrap();
    let markdown = std::fs::read_to_string(path).unwrap();
    assert!(markdown.starts_with("# Quality: March 2024"));
    assert!(markdown.contains("**data unavailable for Test sumo**"));
}

#[tokio::test]
async fn test_topic_fails_when_every_source_is_unavailable() {
    let dir = create_temp_dir();
    let config = Arc::new(test_config(dir.path()));
    let (transport, env, _) = scripted_environment();
    script_sources(&transport);

    let ctx = RunContext::new(&config, env, mock_timestamp(2024, 4, 2, 6, 0, 0), None);
    let pipeline = Pipeline::new(Arc::clone(&config), SeriesStore::temporary().unwrap(), Arc::new(NullRenderer));
    let topic = pipeline.select_topics(&["community".to_string()]).unwrap().remove(0);

    let run = pipeline.run_topic(&ctx, &topic).await;

    assert!(run.is_failed());
    assert_eq!(run.section.subsections.len(), 1);
    assert_eq!(run.section.unavailable_count(), 1);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dir = create_temp_dir();
    let config = Arc::new(test_config(dir.path()));
    let (transport, env, _) = scripted_environment();
    script_sources(&transport);

    let ctx = RunContext::new(&config, env, mock_timestamp(2024, 4, 2, 6, 0, 0), None);
    let pipeline = Pipeline::new(Arc::clone(&config), SeriesStore::temporary().unwrap(), Arc::new(NullRenderer));
    let topic = pipeline.select_topics(&["quality".to_string()]).unwrap().remove(0);

    let first = pipeline.run_topic(&ctx, &topic).await;
    let second = pipeline.run_topic(&ctx, &topic).await;

    assert_eq!(render_markdown(&first.section), render_markdown(&second.section));
    assert!(second.section.warnings().is_empty());
}

#[test]
fn test_unknown_topic_is_rejected() {
    let dir = create_temp_dir();
    let config = Arc::new(test_config(dir.path()));
    let pipeline = Pipeline::new(config, SeriesStore::temporary().unwrap(), Arc::new(NullRenderer));

    assert!(pipeline.select_topics(&["nope".to_string()]).is_err());
    assert_eq!(pipeline.select_topics(&[]).unwrap().len(), 2);
}

/// Transport whose requests never complete
struct StalledTransport;

#[async_trait]
impl HttpTransport for StalledTransport {
    async fn execute(&self, _request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        futures::future::pending().await
    }
}

fn unavailable_reason(outcome: &SourceOutcome) -> Option<&str> {
    match outcome {
        SourceOutcome::Unavailable { reason, .. } => Some(reason.as_str()),
        SourceOutcome::Available { .. } => None,
    }
}

#[tokio::test]
async fn test_source_in_two_topics_shares_its_hourly_ceiling() {
    let dir = create_temp_dir();
    let mut config = test_config(dir.path());
    if let Some(support) = config.sources.get_mut("support") {
        support.requests_per_hour = 1;
    }
    let config = Arc::new(config);
    let (transport, env, _) = scripted_environment();
    transport.respond_json("question", &json!({ "next": null, "results": [] }));

    let ctx = RunContext::new(&config, env, mock_timestamp(2024, 4, 2, 6, 0, 0), None);
    let pipeline = Pipeline::new(Arc::clone(&config), SeriesStore::temporary().unwrap(), Arc::new(NullRenderer));
    let topics = pipeline
        .select_topics(&["community".to_string(), "quality".to_string()])
        .unwrap();
    let [community, quality] = topics.as_slice() else {
        panic!("two topics expected");
    };

    let first = pipeline.run_topic(&ctx, community).await;
    let second = pipeline.run_topic(&ctx, quality).await;
    assert_eq!(first.state, TopicState::Composed);
    assert_eq!(second.state, TopicState::Composed);

    let times: Vec<Duration> = transport
        .requests()
        .iter()
        .filter(|r| r.url.contains("question"))
        .map(|r| r.at)
        .collect();
    assert_eq!(times.len(), 2);
    assert!(times[1] - times[0] >= Duration::from_secs(3600), "{times:?}");
}

#[tokio::test]
async fn test_run_deadline_is_shared_by_every_topic() {
    let dir = create_temp_dir();
    let mut config = test_config(dir.path());
    config.run.run_timeout_seconds = 1;
    let config = Arc::new(config);
    let env = FetchEnvironment {
        transport: Arc::new(StalledTransport),
        sleeper: Arc::new(TokioSleeper),
        throttles: ThrottlePool::default(),
        policy: RetryPolicy::default(),
    };

    let ctx = RunContext::new(&config, env, mock_timestamp(2024, 4, 2, 6, 0, 0), None);
    let pipeline = Pipeline::new(Arc::clone(&config), SeriesStore::temporary().unwrap(), Arc::new(NullRenderer));
    let topics = pipeline
        .select_topics(&["quality".to_string(), "community".to_string()])
        .unwrap();

    let first = pipeline.run_topic(&ctx, &topics[0]).await;
    assert!(first.is_failed());
    for outcome in &first.section.subsections {
        let reason = unavailable_reason(outcome).unwrap();
        assert!(reason.contains("run timed out"), "{reason}");
    }
    for trace in &first.traces {
        assert_eq!(trace.current(), PipelineState::Unavailable, "source {}", trace.source());
    }

    // The budget is already spent, so the next topic gives up at once
    let started = Instant::now();
    let second = pipeline.run_topic(&ctx, &topics[1]).await;
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(second.is_failed());
    let reason = unavailable_reason(&second.section.subsections[0]).unwrap();
    assert!(reason.contains("run timed out"), "{reason}");
    assert_eq!(second.traces[0].current(), PipelineState::Unavailable);
}
