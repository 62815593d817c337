//! Merging per-chunk partial results
//!
//! Results are folded in call order. When the same (entity, date) pair shows
//! up in more than one chunk the later chunk's row replaces the earlier one.
//! That tie-break is arbitrary but relied upon, see the tests.

use std::collections::{BTreeMap, HashMap};
use tallyflow_core::{DayRow, EntitySeries, PartialResult};

#[derive(Debug, Default)]
pub struct Aggregator {
    /// Entity ids in first-seen order
    order: Vec<String>,
    days: HashMap<String, BTreeMap<String, DayRow>>,
    rows_seen: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk's result into the running merge
    pub fn push(&mut self, partial: PartialResult) {
        for series in partial {
            if !self.days.contains_key(&series.entity_id) {
                self.order.push(series.entity_id.clone());
            }
            let day_map = self.days.entry(series.entity_id).or_default();

            for row in series.days {
                self.rows_seen += 1;
                day_map.insert(row.date.clone(), row);
            }
        }
    }

    pub fn entity_count(&self) -> usize {
        self.order.len()
    }

    /// Rows folded in so far, duplicates included
    pub fn rows_seen(&self) -> usize {
        self.rows_seen
    }

    /// Per-entity series with rows sorted by date ascending
    pub fn finish(mut self) -> Vec<EntitySeries> {
        self.order
            .into_iter()
            .map(|entity_id| {
                let days = self
                    .days
                    .remove(&entity_id)
                    .map(|rows| rows.into_values().collect())
                    .unwrap_or_default();
                EntitySeries { entity_id, days }
            })
            .collect()
    }
}

/// Merge partial results in order
pub fn merge_partials<I>(partials: I) -> Vec<EntitySeries>
where
    I: IntoIterator<Item = PartialResult>,
{
    let mut aggregator = Aggregator::new();
    for partial in partials {
        aggregator.push(partial);
    }
    aggregator.finish()
}
