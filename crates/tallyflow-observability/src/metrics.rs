//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for Tallyflow:
//! - Cache lookups (hit/miss) and live entry count
//! - In-flight deduplication joins
//! - Fetch attempts, retries and latency
//! - Chunked aggregation outcomes
//! - Metrics engine computations

use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for Tallyflow
#[derive(Clone)]
pub struct Metrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    // Cache metrics
    /// Cache lookups by outcome (hit, miss)
    pub cache_lookups_total: CounterVec,
    /// Entries currently held by the response cache (expired ones included until evicted)
    pub cache_entries: Gauge,

    // Dedup metrics
    /// Callers that joined an already in-flight request
    pub dedup_joins_total: CounterVec,

    // Fetch metrics
    /// Physical backend fetch attempts
    pub fetch_attempts_total: CounterVec,
    /// Attempts that were followed by a backoff and another try
    pub fetch_retries_total: CounterVec,
    /// Backend fetch duration
    pub fetch_duration_seconds: HistogramVec,

    // Aggregation metrics
    /// Chunks issued by the orchestrator
    pub chunks_total: CounterVec,
    /// Completed aggregations by outcome (success, or the error kind)
    pub aggregations_total: CounterVec,

    // Metrics engine
    /// Worker computations by outcome (success, error)
    pub computations_total: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let cache_lookups_total = CounterVec::new(
            Opts::new(
                "tallyflow_cache_lookups_total",
                "Total number of response cache lookups",
            ),
            &["endpoint", "outcome"],
        )?;

        let cache_entries = Gauge::with_opts(Opts::new(
            "tallyflow_cache_entries",
            "Number of entries held by the response cache",
        ))?;

        let dedup_joins_total = CounterVec::new(
            Opts::new(
                "tallyflow_dedup_joins_total",
                "Requests served by joining an in-flight fetch",
            ),
            &["endpoint"],
        )?;

        let fetch_attempts_total = CounterVec::new(
            Opts::new(
                "tallyflow_fetch_attempts_total",
                "Total number of backend fetch attempts",
            ),
            &["endpoint"],
        )?;

        let fetch_retries_total = CounterVec::new(
            Opts::new(
                "tallyflow_fetch_retries_total",
                "Total number of retried backend fetches",
            ),
            &["endpoint"],
        )?;

        let fetch_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "tallyflow_fetch_duration_seconds",
                "Backend fetch duration in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["endpoint"],
        )?;

        let chunks_total = CounterVec::new(
            Opts::new("tallyflow_chunks_total", "Total number of chunks issued"),
            &["endpoint"],
        )?;

        let aggregations_total = CounterVec::new(
            Opts::new(
                "tallyflow_aggregations_total",
                "Completed chunked aggregations by outcome",
            ),
            &["endpoint", "outcome"],
        )?;

        let computations_total = CounterVec::new(
            Opts::new(
                "tallyflow_metrics_computations_total",
                "Metrics engine computations by outcome",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(cache_lookups_total.clone()))?;
        registry.register(Box::new(cache_entries.clone()))?;
        registry.register(Box::new(dedup_joins_total.clone()))?;
        registry.register(Box::new(fetch_attempts_total.clone()))?;
        registry.register(Box::new(fetch_retries_total.clone()))?;
        registry.register(Box::new(fetch_duration_seconds.clone()))?;
        registry.register(Box::new(chunks_total.clone()))?;
        registry.register(Box::new(aggregations_total.clone()))?;
        registry.register(Box::new(computations_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            cache_lookups_total,
            cache_entries,
            dedup_joins_total,
            fetch_attempts_total,
            fetch_retries_total,
            fetch_duration_seconds,
            chunks_total,
            aggregations_total,
            computations_total,
        })
    }

    /// Get the Prometheus registry for exporting metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_cache_hit(&self, endpoint: &str) {
        self.cache_lookups_total
            .with_label_values(&[endpoint, "hit"])
            .inc();
    }

    pub fn record_cache_miss(&self, endpoint: &str) {
        self.cache_lookups_total
            .with_label_values(&[endpoint, "miss"])
            .inc();
    }

    pub fn set_cache_entries(&self, count: usize) {
        self.cache_entries.set(count as f64);
    }

    pub fn record_dedup_join(&self, endpoint: &str) {
        self.dedup_joins_total.with_label_values(&[endpoint]).inc();
    }

    /// Record one physical fetch attempt and how long it took
    pub fn record_fetch_attempt(&self, endpoint: &str, duration_secs: f64) {
        self.fetch_attempts_total.with_label_values(&[endpoint]).inc();
        self.fetch_duration_seconds
            .with_label_values(&[endpoint])
            .observe(duration_secs);
    }

    pub fn record_retry(&self, endpoint: &str) {
        self.fetch_retries_total.with_label_values(&[endpoint]).inc();
    }

    pub fn record_chunks(&self, endpoint: &str, count: usize) {
        self.chunks_total
            .with_label_values(&[endpoint])
            .inc_by(count as f64);
    }

    /// Record the end of an aggregation; `outcome` is "success" or an error kind
    pub fn record_aggregation(&self, endpoint: &str, outcome: &str) {
        self.aggregations_total
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    pub fn record_computation(&self, success: bool) {
        let outcome = if success { "success" } else { "error" };
        self.computations_total.with_label_values(&[outcome]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
