//! Enrichment database configuration
//!
//! Records can come inline from TOML tables, from a JSON file, or both.
//! The JSON file is needed for values TOML cannot express, such as `null`.
//! Inline entries win over file entries with the same key.
//!
//! ```toml
//! [enrichment]
//! file = "/etc/sluice/enrichment.json"
//!
//! [enrichment.uuids.abc]
//! sensor_uuid = "abc"
//! a = 1
//!
//! [enrichment.topics.rb_flow]
//! partition_key = "client_mac"
//! partition_algo = "mac"
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Enrichment configuration, kept as raw JSON values
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// JSON document `{"uuids": {...}, "topics": {...}}` loaded at startup
    /// and on every reload
    pub file: Option<PathBuf>,

    /// Identity -> fields merged into matching records
    pub uuids: Map<String, Value>,

    /// Topic -> topic settings (partitioning)
    pub topics: Map<String, Value>,
}

impl EnrichmentConfig {
    /// Whether no enrichment source is configured
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.uuids.is_empty() && self.topics.is_empty()
    }

    /// Inline entries as one JSON document
    pub fn inline_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("uuids".into(), Value::Object(self.uuids.clone()));
        doc.insert("topics".into(), Value::Object(self.topics.clone()));
        Value::Object(doc)
    }
}
