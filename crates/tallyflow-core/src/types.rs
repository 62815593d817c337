//! Shared data model for per-entity daily series

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of a per-entity daily series.
///
/// Only `date` is interpreted by the core; every other backend field is
/// carried through untouched in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRow {
    /// ISO-8601 date (`YYYY-MM-DD`)
    pub date: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl DayRow {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            fields: Map::new(),
        }
    }

    /// Attach a backend field to the row
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Daily rows for a single entity (e.g. a branch or stock id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySeries {
    pub entity_id: String,
    #[serde(default)]
    pub days: Vec<DayRow>,
}

impl EntitySeries {
    pub fn new(entity_id: impl Into<String>, days: Vec<DayRow>) -> Self {
        Self {
            entity_id: entity_id.into(),
            days,
        }
    }
}

/// What a single fetch returns: series for the entities of one chunk
pub type PartialResult = Vec<EntitySeries>;

/// A bounded sub-request covering a subset of entities and dates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub entity_ids: Vec<String>,
    pub dates: Vec<String>,
}

impl Chunk {
    pub fn new(entity_ids: Vec<String>, dates: Vec<String>) -> Self {
        Self { entity_ids, dates }
    }

    /// Number of (entity, date) cells the chunk covers
    pub fn cells(&self) -> usize {
        self.entity_ids.len() * self.dates.len()
    }
}
