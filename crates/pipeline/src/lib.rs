//! Sluice - Pipeline
//!
//! The decode/enrich core shared by every listener.
//!
//! # Architecture
//!
//! ```text
//! socket bytes ──→ Session (DecodeBuffer) ──→ decoder::feed ──→ serde_json::Value
//!                                                                  │
//!                  Publisher ←── Message ←── serialize ←── EnrichmentDb::enrich
//! ```
//!
//! # Key Design
//!
//! - **Single owner**: a [`Session`] belongs to the thread that owns its
//!   connection; [`SessionStore`]s are sharded per worker, never shared
//! - **Chunking invariance**: values split across reads decode the same as
//!   values delivered whole
//! - **Tunable growth**: buffers grow by [`GrowthPolicy`], bounded by a
//!   ceiling whose breach faults only the offending session
//! - **Snapshot enrichment**: [`SharedEnrichment`] swaps immutable databases
//!   atomically on reload
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sluice_pipeline::{EnrichmentDb, Pipeline, PipelineConfig, SessionIdentity, SharedEnrichment};
//! use sluice_sinks::ChannelSink;
//!
//! let db: EnrichmentDb = r#"{"uuids": {"127.0.0.1": {"site": "lab"}}}"#.parse().unwrap();
//! let (sink, rx) = ChannelSink::unbounded();
//! let pipeline = Pipeline::new(PipelineConfig::default(), SharedEnrichment::new(db), Arc::new(sink));
//!
//! let mut session = pipeline.open_session(SessionIdentity::client("127.0.0.1"));
//! pipeline.process(&mut session, br#"{"a":"#);
//! pipeline.process(&mut session, br#"1}"#);
//! pipeline.finish(&mut session);
//!
//! assert_eq!(rx.recv().unwrap().payload, br#"{"a":1,"site":"lab"}"#);
//! ```

mod buffer;
mod decoder;
mod enrich;
mod error;
mod ingest;
mod mac;
mod metrics;
mod mse;
mod session;

pub use buffer::{DecodeBuffer, GrowthPolicy};
pub use decoder::{Decoded, Malformed, feed, flush};
pub use enrich::{EnrichmentDb, PartitionAlgo, SharedEnrichment, TopicSettings};
pub use error::{BufferError, EnrichmentError, MacParseError, MseError, Result};
pub use ingest::{Pipeline, PipelineConfig};
pub use mac::MacAddress;
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use mse::{MseRecord, convert as convert_mse};
pub use session::{Session, SessionIdentity, SessionState, SessionStore};
