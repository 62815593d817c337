//! In-flight request deduplication
//!
//! Concurrent callers asking for the same signature share one pending
//! future. The entry is removed when that future settles, success or
//! failure, so at most one physical fetch per signature is outstanding.

use crate::signature::RequestSignature;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tallyflow_core::Result;
use tracing::debug;

/// A pending fetch that any number of callers can await
pub type SharedFetch<T> = Shared<BoxFuture<'static, Result<T>>>;

struct InFlight<T: Clone> {
    /// Distinguishes this issuance from a later one under the same signature
    id: u64,
    future: SharedFetch<T>,
}

pub struct RequestDeduplicator<T: Clone> {
    inflight: Arc<DashMap<RequestSignature, InFlight<T>>>,
    next_id: AtomicU64,
    joins: AtomicU64,
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            joins: AtomicU64::new(0),
        }
    }

    /// Join the pending fetch for `signature`, or start one with `make`.
    ///
    /// `make` is only invoked when nothing is in flight. The returned flag is
    /// `true` when the caller joined an existing fetch.
    pub fn join_or_start<F, Fut>(&self, signature: RequestSignature, make: F) -> (SharedFetch<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        match self.inflight.entry(signature) {
            Entry::Occupied(entry) => {
                self.joins.fetch_add(1, Ordering::Relaxed);
                debug!(signature = entry.key().short(), "Joined in-flight request");
                (entry.get().future.clone(), true)
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let table = Arc::clone(&self.inflight);
                let key = entry.key().clone();
                let work = make();

                let future = async move {
                    let result = work.await;
                    // Only remove our own issuance; a newer one may already be registered
                    table.remove_if(&key, |_, pending| pending.id == id);
                    result
                }
                .boxed()
                .shared();

                entry.insert(InFlight {
                    id,
                    future: future.clone(),
                });
                (future, false)
            }
        }
    }

    /// Run `make` unless an identical request is already in flight
    pub async fn run<F, Fut>(&self, signature: RequestSignature, make: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (future, _joined) = self.join_or_start(signature, make);
        future.await
    }

    /// Number of signatures with a fetch currently outstanding
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_in_flight(&self, signature: &RequestSignature) -> bool {
        self.inflight.contains_key(signature)
    }

    /// Total callers served by joining instead of fetching
    pub fn joins(&self) -> u64 {
        self.joins.load(Ordering::Relaxed)
    }
}

impl<T> Default for RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
