//! Canonical request signatures
//!
//! A signature identifies a logical request for caching and deduplication.
//! Object keys are sorted recursively before hashing, so parameter maps built
//! in different insertion orders collapse onto the same key.

use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::fmt;
use tallyflow_core::{Chunk, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestSignature(String);

impl RequestSignature {
    /// Derive a signature from an endpoint name and its parameters
    pub fn new<P: Serialize + ?Sized>(endpoint: &str, params: &P) -> Result<Self> {
        let value = serde_json::to_value(params)?;
        Ok(Self::from_value(endpoint, &value))
    }

    pub fn from_value(endpoint: &str, params: &Value) -> Self {
        let mut canonical = String::new();
        write_canonical(params, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(endpoint.as_bytes());
        hasher.update(b"\n");
        hasher.update(canonical.as_bytes());

        let digest = hasher.finalize();
        let hex = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Self(hex)
    }

    /// Signature for fetching one chunk from `endpoint`
    pub fn for_chunk(endpoint: &str, chunk: &Chunk) -> Self {
        Self::from_value(
            endpoint,
            &json!({
                "entityIds": chunk.entity_ids,
                "dates": chunk.dates,
            }),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a string cannot fail
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
