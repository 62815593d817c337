//! Tallyflow Response Cache
//!
//! This crate provides the shared state sitting in front of backend fetches:
//! - Canonical request signatures
//! - TTL response cache with lazy eviction and an optional sweeper
//! - In-flight request deduplication

pub mod cache;
pub mod dedup;
pub mod signature;

pub use cache::{CacheStats, ResponseCache};
pub use dedup::{RequestDeduplicator, SharedFetch};
pub use signature::RequestSignature;
