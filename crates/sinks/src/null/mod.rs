//! Null sink - discards all data
//!
//! Used for benchmarking the listeners and decoder without output I/O. It
//! records metrics and drops every message immediately.

use crate::{Message, Publisher, SinkMetrics, SinkMetricsSnapshot};

/// Null sink that discards all published messages
#[derive(Debug)]
pub struct NullSink {
    name: String,
    metrics: SinkMetrics,
}

impl NullSink {
    /// Create a new null sink
    pub fn new() -> Self {
        Self::with_name("null")
    }

    /// Create a new null sink with a custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: SinkMetrics::new(),
        }
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for NullSink {
    fn publish(&self, message: Message) {
        self.metrics.record_published(message.len());
        // message dropped here
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metrics(&self) -> SinkMetricsSnapshot {
        self.metrics.snapshot()
    }
}
