//! Chunk planning
//!
//! Requests within both limits pass through as a single chunk. Anything
//! larger is split into contiguous entity groups and date groups, and the
//! full cross product is emitted, entity group major.

use serde::{Deserialize, Serialize};
use tallyflow_core::Chunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLimits {
    pub max_entities_per_chunk: usize,
    pub max_dates_per_chunk: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_entities_per_chunk: 5,
            max_dates_per_chunk: 7,
        }
    }
}

impl ChunkLimits {
    pub fn new(max_entities_per_chunk: usize, max_dates_per_chunk: usize) -> Self {
        Self {
            max_entities_per_chunk,
            max_dates_per_chunk,
        }
    }

    /// Whether a request of this shape fits in one chunk
    pub fn fits(&self, entities: usize, dates: usize) -> bool {
        entities <= self.max_entities_per_chunk.max(1) && dates <= self.max_dates_per_chunk.max(1)
    }
}

/// Partition a request into chunks bounded by `limits`
pub fn plan_chunks(entity_ids: &[String], dates: &[String], limits: ChunkLimits) -> Vec<Chunk> {
    if entity_ids.is_empty() || dates.is_empty() {
        return Vec::new();
    }

    if limits.fits(entity_ids.len(), dates.len()) {
        return vec![Chunk::new(entity_ids.to_vec(), dates.to_vec())];
    }

    let entity_groups = entity_ids.chunks(limits.max_entities_per_chunk.max(1));
    let date_groups: Vec<&[String]> = dates.chunks(limits.max_dates_per_chunk.max(1)).collect();

    let mut chunks = Vec::with_capacity(entity_groups.len() * date_groups.len());
    for entities in entity_groups {
        for group in &date_groups {
            chunks.push(Chunk::new(entities.to_vec(), group.to_vec()));
        }
    }
    chunks
}
