//! tmetrics - monthly community-metrics digests.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tmetrics_common::{init_logging, Month};
use tmetrics_config::ConfigLoader;
use tmetrics_graphs::SeriesStore;
use tmetrics_runner::{write_section, Pipeline, RunContext};
use tmetrics_sources::{check_adapters, FetchEnvironment};
use tracing::{error, info};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "TMETRICS_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Month to report, as YYYY-MM (default: the previous month)
    #[arg(short, long)]
    month: Option<Month>,

    /// Topic to run; repeat for several (default: all)
    #[arg(short, long = "topic")]
    topics: Vec<String>,

    /// Log level or filter directive
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            error!(failed, "some topics failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            // The subscriber may not be installed yet
            eprintln!("tmetrics: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Run every selected topic, returning how many failed
async fn run(args: Args) -> Result<usize> {
    let mut config = ConfigLoader::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging.to_logging_config())?;
    check_adapters(&config)?;

    let env = FetchEnvironment::live(&config.fetch)?;
    let store = SeriesStore::open(&config.storage.path)
        .with_context(|| format!("opening series store at {}", config.storage.path.display()))?;
    let ctx = RunContext::new(&config, env, Utc::now(), args.month);
    info!(month = %ctx.month, workers = ctx.worker_limit, "starting run");

    let config = Arc::new(config);
    let pipeline = Pipeline::with_line_charts(Arc::clone(&config), store);
    let topics = pipeline.select_topics(&args.topics)?;

    let mut failed = 0;
    for topic in &topics {
        let run = pipeline.run_topic(&ctx, topic).await;
        if run.is_failed() {
            failed += 1;
        }
        write_section(&ctx.output_dir, &run.section)?;
    }
    info!(topics = topics.len(), failed, "run finished");
    Ok(failed)
}
