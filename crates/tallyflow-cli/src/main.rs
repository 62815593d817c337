//! Tallyflow CLI
//!
//! Plan and run chunked KPI fetches, and compute target metrics.
//!
//! # Usage
//!
//! ```bash
//! # Preview how a request is split
//! tallyflow plan --entities store-1,store-2 --from 2025-09-01 --to 2025-09-30
//!
//! # Fetch from a fixture file, with settings from a config file
//! tallyflow --config tallyflow.yaml fetch --fixture series.json \
//!     --entities store-1,store-2 --from 2025-09-01 --to 2025-09-30
//!
//! # Compute dashboard metrics through the worker protocol
//! tallyflow metrics dashboard-input.json
//! ```

mod config;
mod dates;
mod fixture;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use config::TallyflowConfig;
use dates::date_range;
use fixture::FixtureFetcher;
use prometheus::{Encoder, TextEncoder};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tallyflow_cache::ResponseCache;
use tallyflow_core::PartialResult;
use tallyflow_fetch::{ChunkedFetcher, plan_chunks};
use tallyflow_metrics::MetricsWorker;
use tallyflow_observability::Metrics;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tallyflow")]
#[command(about = "Tallyflow - chunked KPI fetching and target tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (YAML or TOML)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "TALLYFLOW_CONFIG",
        global = true
    )]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct RangeArgs {
    /// Comma-separated entity ids
    #[arg(long, value_delimiter = ',', required = true)]
    entities: Vec<String>,

    /// First date (YYYY-MM-DD)
    #[arg(long)]
    from: String,

    /// Last date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    to: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a request would be split into chunks
    Plan {
        #[command(flatten)]
        range: RangeArgs,

        /// Print the chunks as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
    /// Fetch and merge series from a JSON fixture file
    Fetch {
        /// Fixture file holding `[{"entityId": ..., "days": [...]}]`
        #[arg(long, value_name = "FILE")]
        fixture: PathBuf,

        #[command(flatten)]
        range: RangeArgs,

        /// Simulated backend latency per call
        #[arg(long, default_value = "0")]
        latency_ms: u64,

        /// Print Prometheus metrics after the fetch
        #[arg(long, default_value = "false")]
        print_metrics: bool,
    },
    /// Compute dashboard metrics for a worker input file
    Metrics {
        /// JSON file holding a dashboard worker input
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Give up waiting for the worker after this many seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TallyflowConfig> {
    let mut config = match path {
        Some(path) => TallyflowConfig::from_file(path)?,
        None => TallyflowConfig::default(),
    };

    // Merge environment variables (they override config file)
    config.merge_env();
    Ok(config)
}

fn print_metrics(metrics: &Metrics) -> anyhow::Result<()> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metrics.registry().gather(), &mut buffer)?;
    print!("{}", String::from_utf8(buffer)?);
    Ok(())
}

fn run_plan(config: &TallyflowConfig, range: RangeArgs, as_json: bool) -> anyhow::Result<()> {
    let dates = date_range(&range.from, &range.to)?;
    let options = config.fetch_options();
    let chunks = plan_chunks(&range.entities, &dates, options.limits);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    println!(
        "{} entities x {} dates -> {} chunk(s)",
        range.entities.len(),
        dates.len(),
        chunks.len()
    );
    for (index, chunk) in chunks.iter().enumerate() {
        println!(
            "  [{}/{}] {} x {}: {} | {}..{}",
            index + 1,
            chunks.len(),
            chunk.entity_ids.len(),
            chunk.dates.len(),
            chunk.entity_ids.join(","),
            chunk.dates.first().map(String::as_str).unwrap_or(""),
            chunk.dates.last().map(String::as_str).unwrap_or(""),
        );
    }
    Ok(())
}

async fn run_fetch(
    config: &TallyflowConfig,
    fixture: &Path,
    range: RangeArgs,
    latency: Duration,
    show_metrics: bool,
) -> anyhow::Result<()> {
    let dates = date_range(&range.from, &range.to)?;
    let fetcher = Arc::new(
        FixtureFetcher::from_file(fixture, config.fetch.endpoint.clone())?.with_latency(latency),
    );
    let metrics = Metrics::new()?;

    let cancel_token = CancellationToken::new();
    let cache: Arc<ResponseCache<PartialResult>> = Arc::new(ResponseCache::new(config.cache_ttl()));
    let sweeper = config
        .sweep_interval()
        .map(|interval| cache.clone().spawn_sweeper(interval, cancel_token.child_token()));

    let chunked = ChunkedFetcher::with_cache(fetcher.clone(), cache).with_metrics(metrics.clone());
    let options = config
        .fetch_options()
        .with_progress(|current, total| info!(current, total, "Chunk complete"));

    let interrupt_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling fetch");
            interrupt_token.cancel();
        }
    });

    let result = chunked
        .fetch(&range.entities, &dates, &options, &cancel_token)
        .await;

    cancel_token.cancel();
    if let Some(sweeper) = sweeper {
        stop_sweeper(sweeper).await;
    }

    let series = result.context("Fetch failed")?;
    info!(
        entities = series.len(),
        backend_calls = fetcher.calls(),
        "Fetch complete"
    );
    println!("{}", serde_json::to_string_pretty(&series)?);

    if show_metrics {
        print_metrics(&metrics)?;
    }
    Ok(())
}

/// Wait for the cache sweeper to exit, logging if it panicked or was aborted.
async fn stop_sweeper(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Cache sweeper task failed");
            false
        }
    }
}

async fn run_metrics(input: &Path, timeout: Duration) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read metrics input {}", input.display()))?;
    let payload: Value = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid JSON in {}", input.display()))?;
    let message = json!({ "type": "compute", "payload": payload }).to_string();

    let worker = MetricsWorker::spawn(Some(Metrics::new()?))?;
    let receiver = worker.post(message)?;

    let reply = match tokio::time::timeout(timeout, receiver).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(_)) => bail!("Metrics worker dropped the request"),
        Err(_) => bail!("Metrics worker did not respond within {}s", timeout.as_secs()),
    };

    let reply: Value = serde_json::from_str(&reply)?;
    println!("{}", serde_json::to_string_pretty(&reply)?);

    if reply["type"] == "error" {
        bail!("Metrics computation failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    tallyflow_observability::init_logging(
        &config.logging.level,
        config.logging.format(),
        &config.logging.directives,
    )?;

    match cli.command {
        Commands::Plan { range, json } => run_plan(&config, range, json),
        Commands::Fetch {
            fixture,
            range,
            latency_ms,
            print_metrics,
        } => {
            run_fetch(
                &config,
                &fixture,
                range,
                Duration::from_millis(latency_ms),
                print_metrics,
            )
            .await
        }
        Commands::Metrics {
            input,
            timeout_secs,
        } => run_metrics(&input, Duration::from_secs(timeout_secs)).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_sweeper_reports_clean_exit() {
        let handle = tokio::spawn(async {});
        assert!(stop_sweeper(handle).await);
    }

    #[tokio::test]
    async fn test_stop_sweeper_reports_panicked_task() {
        let handle = tokio::spawn(async { panic!("sweeper exploded") });
        assert!(!stop_sweeper(handle).await);
    }
}
