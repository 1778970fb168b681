//! Pipeline metrics
//!
//! Atomic counters shared by every worker feeding the pipeline. All
//! operations use relaxed ordering; values are eventually consistent.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for decode, enrichment and publish
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Sessions opened
    sessions_opened: AtomicU64,

    /// Sessions finished (flushed or dropped)
    sessions_closed: AtomicU64,

    /// Sessions faulted by buffer growth failure
    sessions_faulted: AtomicU64,

    /// Raw bytes fed to the decoder
    bytes_fed: AtomicU64,

    /// Complete values decoded
    values_decoded: AtomicU64,

    /// Values that matched an enrichment record
    values_enriched: AtomicU64,

    /// Messages handed to the publisher
    messages_published: AtomicU64,

    /// Pending regions dropped as malformed
    malformed_regions: AtomicU64,

    /// Bytes dropped as malformed or incomplete at close
    bytes_discarded: AtomicU64,
}

impl PipelineMetrics {
    /// Create new metrics instance with all counters at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            sessions_opened: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            sessions_faulted: AtomicU64::new(0),
            bytes_fed: AtomicU64::new(0),
            values_decoded: AtomicU64::new(0),
            values_enriched: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            malformed_regions: AtomicU64::new(0),
            bytes_discarded: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fault(&self) {
        self.sessions_faulted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fed(&self, bytes: usize) {
        self.bytes_fed.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decoded(&self, count: usize) {
        self.values_decoded
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enriched(&self) {
        self.values_enriched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_published(&self, count: usize) {
        self.messages_published
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed(&self, bytes: usize) {
        self.malformed_regions.fetch_add(1, Ordering::Relaxed);
        self.bytes_discarded
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_discarded(&self, bytes: usize) {
        self.bytes_discarded
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            sessions_faulted: self.sessions_faulted.load(Ordering::Relaxed),
            bytes_fed: self.bytes_fed.load(Ordering::Relaxed),
            values_decoded: self.values_decoded.load(Ordering::Relaxed),
            values_enriched: self.values_enriched.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            malformed_regions: self.malformed_regions.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of pipeline metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub sessions_faulted: u64,
    pub bytes_fed: u64,
    pub values_decoded: u64,
    pub values_enriched: u64,
    pub messages_published: u64,
    pub malformed_regions: u64,
    pub bytes_discarded: u64,
}

impl MetricsSnapshot {
    /// Sessions currently open
    pub fn sessions_active(&self) -> u64 {
        self.sessions_opened.saturating_sub(self.sessions_closed)
    }
}
