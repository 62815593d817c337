//! TTL response cache
//!
//! Entries are valid while `now - stored_at < ttl`. Expired entries are
//! treated as absent and evicted lazily on lookup; `spawn_sweeper` adds a
//! periodic purge for long-running processes.

use crate::signature::RequestSignature;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    stored_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct ResponseCache<T> {
    entries: DashMap<RequestSignature, CacheEntry<T>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Clone> ResponseCache<T> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Return the cached value if present and unexpired
    pub fn get(&self, signature: &RequestSignature) -> Option<T> {
        let now = Instant::now();

        let expired = match self.entries.get(signature) {
            Some(entry) if entry.is_fresh(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        // The read guard is released above; removing while holding it would deadlock the shard
        if expired {
            self.entries
                .remove_if(signature, |_, entry| !entry.is_fresh(now));
            debug!(signature = signature.short(), "Evicted expired cache entry");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value with an explicit TTL
    pub fn set(&self, signature: RequestSignature, value: T, ttl: Duration) {
        self.entries.insert(
            signature,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Store a value with the cache's default TTL
    pub fn insert(&self, signature: RequestSignature, value: T) {
        self.set(signature, value, self.default_ttl);
    }

    pub fn invalidate(&self, signature: &RequestSignature) -> bool {
        self.entries.remove(signature).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Entries currently stored, expired ones included until evicted
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ResponseCache<T> {
    /// Spawn a background task purging expired entries every `interval`
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Response cache sweeper started (interval: {}ms)",
                interval.as_millis()
            );

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.purge_expired();
                        if removed > 0 {
                            debug!(removed, remaining = self.len(), "Swept expired cache entries");
                        }
                    }
                    _ = cancel_token.cancelled() => {
                        info!("Response cache sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }
}
