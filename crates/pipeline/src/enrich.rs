//! Enrichment engine
//!
//! Records are looked up by exact identity key and merged into decoded
//! values. Configured fields always overwrite decoded fields of the same
//! name; nested objects and arrays are replaced whole. An unknown identity
//! leaves the value untouched.
//!
//! The database is immutable once built. Reloading builds a new one and
//! swaps it into [`SharedEnrichment`]; readers holding the old snapshot keep
//! using it until they drop it.
//!
//! # Document format
//!
//! ```json
//! {
//!   "uuids": {
//!     "abc": {"sensor_uuid": "abc", "a": 1, "b": "c", "d": true, "e": null}
//!   },
//!   "topics": {
//!     "rb_flow": {"partition_key": "client_mac", "partition_algo": "mac"},
//!     "rb_event": {}
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{EnrichmentError, Result};
use crate::mac::MacAddress;

/// How a partition field is turned into a key
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PartitionAlgo {
    /// Parse the field as a MAC address
    #[default]
    Mac,
}

/// Per-topic settings
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TopicSettings {
    /// Record field holding the partition value
    pub partition_key: Option<String>,
    /// How to turn that field into a key
    pub partition_algo: PartitionAlgo,
}

impl TopicSettings {
    /// Partition key of a record, if the topic partitions and the field parses
    pub fn partition_key_of(&self, value: &Value) -> Option<u64> {
        let field = self.partition_key.as_deref()?;
        let text = value.get(field)?.as_str()?;
        match self.partition_algo {
            PartitionAlgo::Mac => text.parse::<MacAddress>().ok().map(MacAddress::as_u64),
        }
    }
}

/// Immutable enrichment database
#[derive(Debug, Clone, Default)]
pub struct EnrichmentDb {
    records: HashMap<String, Map<String, Value>>,
    topics: HashMap<String, TopicSettings>,
}

impl EnrichmentDb {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a `{"uuids": {...}, "topics": {...}}` document
    ///
    /// Both members are optional. Every record must be a JSON object.
    pub fn from_value(document: Value) -> Result<Self> {
        let Value::Object(mut document) = document else {
            return Err(EnrichmentError::Invalid(
                "document must be a JSON object".into(),
            ));
        };

        let mut db = Self::new();

        match document.remove("uuids") {
            None | Some(Value::Null) => {}
            Some(Value::Object(uuids)) => {
                for (key, record) in uuids {
                    let Value::Object(fields) = record else {
                        return Err(EnrichmentError::Invalid(format!(
                            "record '{key}' must be a JSON object"
                        )));
                    };
                    db.records.insert(key, fields);
                }
            }
            Some(_) => {
                return Err(EnrichmentError::Invalid("uuids must be an object".into()));
            }
        }

        match document.remove("topics") {
            None | Some(Value::Null) => {}
            Some(Value::Object(topics)) => {
                for (name, settings) in topics {
                    let settings: TopicSettings =
                        serde_json::from_value(settings).map_err(|e| {
                            EnrichmentError::Invalid(format!("topic '{name}': {e}"))
                        })?;
                    db.topics.insert(name, settings);
                }
            }
            Some(_) => {
                return Err(EnrichmentError::Invalid("topics must be an object".into()));
            }
        }

        Ok(db)
    }

    /// Load a JSON document from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| EnrichmentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&contents)
    }

    /// Add every entry of `other`, replacing entries with the same key
    pub fn merge(&mut self, other: EnrichmentDb) {
        self.records.extend(other.records);
        self.topics.extend(other.topics);
    }

    /// Fields configured for `key`
    #[inline]
    pub fn lookup(&self, key: &str) -> Option<&Map<String, Value>> {
        self.records.get(key)
    }

    /// Settings of `topic`
    #[inline]
    pub fn topic(&self, topic: &str) -> Option<&TopicSettings> {
        self.topics.get(topic)
    }

    /// Merge the record for `key` into `value`
    ///
    /// Returns whether anything was merged. Values that are not objects and
    /// unknown keys pass through unchanged.
    pub fn enrich(&self, value: &mut Value, key: &str) -> bool {
        let Some(fields) = self.records.get(key) else {
            return false;
        };
        let Some(object) = value.as_object_mut() else {
            return false;
        };

        for (name, field) in fields {
            object.insert(name.clone(), field.clone());
        }
        true
    }

    /// Number of enrichment records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no enrichment records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of configured topics
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

impl FromStr for EnrichmentDb {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(s)?)
    }
}

/// Hot-swappable handle to the current database
#[derive(Debug, Clone)]
pub struct SharedEnrichment {
    current: Arc<ArcSwap<EnrichmentDb>>,
}

impl SharedEnrichment {
    /// Wrap an initial database
    pub fn new(db: EnrichmentDb) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(db)),
        }
    }

    /// Current snapshot
    #[inline]
    pub fn load(&self) -> Arc<EnrichmentDb> {
        self.current.load_full()
    }

    /// Replace the snapshot; readers of the old one are unaffected
    pub fn store(&self, db: EnrichmentDb) {
        self.current.store(Arc::new(db));
    }
}

impl Default for SharedEnrichment {
    fn default() -> Self {
        Self::new(EnrichmentDb::new())
    }
}

#[cfg(test)]
#[path = "enrich_test.rs"]
mod enrich_test;
