//! Tallyflow Fetch Orchestration
//!
//! This crate turns one oversized dashboard request into bounded backend calls:
//! - Chunk planning over entities and dates
//! - Exponential-backoff retry with cancellation
//! - Merging partial results into per-entity series
//! - Sequential chunk execution through the dedup and cache layers

pub mod aggregator;
pub mod orchestrator;
pub mod planner;
pub mod retry;

pub use aggregator::{Aggregator, merge_partials};
pub use orchestrator::{ChunkedFetcher, FetchOptions, ProgressFn};
pub use planner::{ChunkLimits, plan_chunks};
pub use retry::{RetryPolicy, with_retry};
