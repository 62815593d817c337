//! End-to-end chunked fetch
//!
//! Chunks run one after another with a fixed pause between them, which is
//! the only backpressure the backend gets. Every chunk goes through the
//! deduplicator, then the response cache, then the retry executor. A chunk
//! that fails after its retries aborts the whole call; rows already fetched
//! are dropped rather than returned as a partial answer.

use crate::aggregator::Aggregator;
use crate::planner::{ChunkLimits, plan_chunks};
use crate::retry::{RetryPolicy, with_retry};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tallyflow_cache::{RequestDeduplicator, RequestSignature, ResponseCache};
use tallyflow_core::{Chunk, EntitySeries, Error, Fetcher, PartialResult, Result};
use tallyflow_observability::Metrics;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};

/// Progress callback invoked with `(completed_chunks, total_chunks)`
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Clone)]
pub struct FetchOptions {
    pub limits: ChunkLimits,
    pub retry: RetryPolicy,
    /// Pause between consecutive chunks
    pub inter_chunk_delay: Duration,
    /// TTL for cached chunk results; `None` uses the cache default
    pub cache_ttl: Option<Duration>,
    pub on_progress: Option<ProgressFn>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            limits: ChunkLimits::default(),
            retry: RetryPolicy::default(),
            inter_chunk_delay: Duration::from_millis(200),
            cache_ttl: None,
            on_progress: None,
        }
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("limits", &self.limits)
            .field("retry", &self.retry)
            .field("inter_chunk_delay", &self.inter_chunk_delay)
            .field("cache_ttl", &self.cache_ttl)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl FetchOptions {
    pub fn with_limits(mut self, limits: ChunkLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_inter_chunk_delay(mut self, delay: Duration) -> Self {
        self.inter_chunk_delay = delay;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_progress<F>(mut self, on_progress: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    fn report(&self, current: usize, total: usize) {
        if let Some(on_progress) = &self.on_progress {
            on_progress(current, total);
        }
    }
}

/// Owns the cache and in-flight table for one backend endpoint
pub struct ChunkedFetcher {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<ResponseCache<PartialResult>>,
    dedup: Arc<RequestDeduplicator<PartialResult>>,
    metrics: Option<Metrics>,
}

impl ChunkedFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache_ttl: Duration) -> Self {
        Self::with_cache(fetcher, Arc::new(ResponseCache::new(cache_ttl)))
    }

    /// Build around an existing cache, e.g. one shared with a sweeper task
    pub fn with_cache(fetcher: Arc<dyn Fetcher>, cache: Arc<ResponseCache<PartialResult>>) -> Self {
        Self {
            fetcher,
            cache,
            dedup: Arc::new(RequestDeduplicator::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cache(&self) -> &Arc<ResponseCache<PartialResult>> {
        &self.cache
    }

    pub fn dedup(&self) -> &Arc<RequestDeduplicator<PartialResult>> {
        &self.dedup
    }

    pub fn endpoint(&self) -> &str {
        self.fetcher.endpoint()
    }

    /// Fetch and merge series for `entity_ids` over `dates`
    pub async fn fetch(
        &self,
        entity_ids: &[String],
        dates: &[String],
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<EntitySeries>> {
        let chunks = plan_chunks(entity_ids, dates, options.limits);
        if chunks.is_empty() {
            debug!("Nothing to fetch: empty entity or date list");
            return Ok(Vec::new());
        }

        let endpoint = self.endpoint().to_string();
        if let Some(metrics) = &self.metrics {
            metrics.record_chunks(&endpoint, chunks.len());
        }

        let result = self.run_chunks(chunks, options, cancel).await;

        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => "success",
                Err(err) => err.kind(),
            };
            metrics.record_aggregation(&endpoint, outcome);
        }
        result
    }

    async fn run_chunks(
        &self,
        chunks: Vec<Chunk>,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<EntitySeries>> {
        let total = chunks.len();
        let mut aggregator = Aggregator::new();

        for (index, chunk) in chunks.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let current = index + 1;
            let span = info_span!(
                "chunk",
                current,
                total,
                entities = chunk.entity_ids.len(),
                dates = chunk.dates.len()
            );
            let partial = self
                .fetch_chunk(chunk, options, cancel)
                .instrument(span)
                .await?;

            aggregator.push(partial);
            debug!(current, total, "Chunk merged");
            options.report(current, total);

            if current < total && !options.inter_chunk_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(options.inter_chunk_delay) => {}
                }
            }
        }

        if total > 1 {
            info!(
                chunks = total,
                entities = aggregator.entity_count(),
                rows = aggregator.rows_seen(),
                "Merged chunked fetch"
            );
        }
        Ok(aggregator.finish())
    }

    /// One chunk through dedup, cache and retry
    async fn fetch_chunk(
        &self,
        chunk: Chunk,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<PartialResult> {
        let endpoint = self.endpoint().to_string();
        let signature = RequestSignature::for_chunk(&endpoint, &chunk);
        let chunk = Arc::new(chunk);

        loop {
            let (pending, joined) = self.dedup.join_or_start(signature.clone(), || {
                self.chunk_work(
                    endpoint.clone(),
                    signature.clone(),
                    Arc::clone(&chunk),
                    options,
                    cancel.clone(),
                )
            });

            if !joined {
                // The work observes our token itself, so it always settles
                return pending.await;
            }

            if let Some(metrics) = &self.metrics {
                metrics.record_dedup_join(&endpoint);
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = pending => result,
            };

            match result {
                // The owner of the shared fetch was cancelled, not us
                Err(Error::Cancelled) if !cancel.is_cancelled() => {
                    debug!(
                        signature = signature.short(),
                        "Joined request was cancelled by its owner, reissuing"
                    );
                    continue;
                }
                other => return other,
            }
        }
    }

    fn chunk_work(
        &self,
        endpoint: String,
        signature: RequestSignature,
        chunk: Arc<Chunk>,
        options: &FetchOptions,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<PartialResult>> {
        let fetcher = Arc::clone(&self.fetcher);
        let cache = Arc::clone(&self.cache);
        let metrics = self.metrics.clone();
        let policy = options.retry;
        let ttl = options.cache_ttl.unwrap_or_else(|| cache.default_ttl());

        async move {
            if let Some(hit) = cache.get(&signature) {
                debug!(signature = signature.short(), "Cache hit");
                if let Some(metrics) = &metrics {
                    metrics.record_cache_hit(&endpoint);
                }
                return Ok(hit);
            }
            if let Some(metrics) = &metrics {
                metrics.record_cache_miss(&endpoint);
            }

            let attempts = AtomicU32::new(0);
            let result = with_retry(&policy, &cancel, || {
                let fetcher = Arc::clone(&fetcher);
                let chunk = Arc::clone(&chunk);
                let metrics = metrics.clone();
                let endpoint = endpoint.clone();
                let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                async move {
                    if attempt > 1
                        && let Some(metrics) = &metrics
                    {
                        metrics.record_retry(&endpoint);
                    }
                    let started = Instant::now();
                    let result = fetcher.fetch(&chunk.entity_ids, &chunk.dates).await;
                    if let Some(metrics) = &metrics {
                        metrics.record_fetch_attempt(&endpoint, started.elapsed().as_secs_f64());
                    }
                    result
                }
            })
            .await?;

            cache.set(signature, result.clone(), ttl);
            if let Some(metrics) = &metrics {
                metrics.set_cache_entries(cache.len());
            }
            Ok(result)
        }
        .boxed()
    }
}
