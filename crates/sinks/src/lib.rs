//! Sluice - Sinks
//!
//! Publish sinks for decoded and enriched records.
//!
//! Every sink implements [`Publisher`]: workers call `publish` from their own
//! threads and hand over ownership of the serialized record. Publishing is
//! fire-and-forget; a sink that cannot deliver counts the loss in its metrics
//! instead of reporting back to the caller.
//!
//! ```text
//! [Worker thread] --Message--> [Publisher] --> [Destination]
//! ```
//!
//! # Available Sinks
//!
//! | Sink | Purpose |
//! |------|---------|
//! | `null` | Benchmarking (discard all) |
//! | `stdout` | Debug output, one line per record |
//! | `channel` | Hand records to another thread (embedding, tests) |

use std::sync::atomic::{AtomicU64, Ordering};

/// Channel sink - forwards messages over a crossbeam channel
pub mod channel;

/// Null sink - discards all data (for benchmarking)
pub mod null;

/// Stdout sink - human-readable debug output
pub mod stdout;

pub use channel::ChannelSink;
pub use null::NullSink;
pub use stdout::{StdoutConfig, StdoutSink};

/// One serialized record on its way out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Destination topic
    pub topic: String,
    /// Serialized record; the sink owns it from `publish` on
    pub payload: Vec<u8>,
    /// Optional partition key, e.g. a client MAC address
    pub partition_key: Option<u64>,
}

impl Message {
    /// Create a message without a partition key
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            partition_key: None,
        }
    }

    /// Attach a partition key
    pub fn with_partition_key(mut self, key: Option<u64>) -> Self {
        self.partition_key = key;
        self
    }

    /// Payload length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Publish sink shared by every listener and worker
///
/// Implementations must be safe to call concurrently from many threads.
pub trait Publisher: Send + Sync {
    /// Take ownership of a message and deliver it
    fn publish(&self, message: Message);

    /// Sink type name for logging
    fn name(&self) -> &str;

    /// Current counters
    fn metrics(&self) -> SinkMetricsSnapshot;
}

/// Counters shared by all sinks
#[derive(Debug, Default)]
pub struct SinkMetrics {
    messages_published: AtomicU64,
    bytes_published: AtomicU64,
    messages_dropped: AtomicU64,
    write_errors: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics with all counters at zero
    pub const fn new() -> Self {
        Self {
            messages_published: AtomicU64::new(0),
            bytes_published: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
        }
    }

    /// Record a delivered message
    #[inline]
    pub fn record_published(&self, bytes: usize) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.bytes_published
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a message the sink could not accept
    #[inline]
    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed write
    #[inline]
    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of current values
    pub fn snapshot(&self) -> SinkMetricsSnapshot {
        SinkMetricsSnapshot {
            messages_published: self.messages_published.load(Ordering::Relaxed),
            bytes_published: self.bytes_published.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of sink metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkMetricsSnapshot {
    pub messages_published: u64,
    pub bytes_published: u64,
    pub messages_dropped: u64,
    pub write_errors: u64,
}
