//! Backend stand-in serving series from a JSON file

use anyhow::Context;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tallyflow_core::{DayRow, EntitySeries, Fetcher, PartialResult, Result};
use tracing::debug;

/// Serves the rows of a `[{"entityId": ..., "days": [...]}]` file,
/// filtered to the requested entities and dates
pub struct FixtureFetcher {
    endpoint: String,
    series: HashMap<String, Vec<DayRow>>,
    latency: Duration,
    calls: AtomicUsize,
}

impl FixtureFetcher {
    pub fn from_series(endpoint: impl Into<String>, series: Vec<EntitySeries>) -> Self {
        let mut by_entity: HashMap<String, Vec<DayRow>> = HashMap::new();
        for entry in series {
            by_entity
                .entry(entry.entity_id)
                .or_default()
                .extend(entry.days);
        }

        Self {
            endpoint: endpoint.into(),
            series: by_entity,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn from_file(path: impl AsRef<Path>, endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        let series: Vec<EntitySeries> = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid fixture JSON in {}", path.display()))?;
        Ok(Self::from_series(endpoint, series))
    }

    /// Simulated round-trip time per call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, entity_ids: &[String], dates: &[String]) -> Result<PartialResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let wanted: HashSet<&str> = dates.iter().map(String::as_str).collect();
        let result: PartialResult = entity_ids
            .iter()
            .filter_map(|id| {
                self.series.get(id).map(|days| EntitySeries {
                    entity_id: id.clone(),
                    days: days
                        .iter()
                        .filter(|row| wanted.contains(row.date.as_str()))
                        .cloned()
                        .collect(),
                })
            })
            .collect();

        debug!(
            entities = entity_ids.len(),
            dates = dates.len(),
            matched = result.len(),
            "Served fixture chunk"
        );
        Ok(result)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
