//! Tallyflow Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout Tallyflow:
//! - Per-entity daily series types shared by fetch, cache and aggregation
//! - The `Fetcher` trait every backend collaborator implements
//! - Core error types

pub mod error;
pub mod fetcher;
pub mod types;

pub use error::{Error, Result};
pub use fetcher::{FnFetcher, Fetcher};
pub use types::{Chunk, DayRow, EntitySeries, PartialResult};
