//! Common types shared by every listener
//!
//! Counters and the lifecycle state each listener exposes.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Hard ceiling on worker threads per listener
pub const MAX_WORKERS: usize = 256;

/// Readiness strategy requested for a listener
///
/// `Select`, `Poll` and `Epoll` are all served by `mio`, which picks the
/// platform's readiness API. Thread-per-connection is only available where
/// the runtime provides it (HTTP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReactorMode {
    ThreadPerConnection,
    Select,
    Poll,
    #[default]
    Epoll,
}

impl ReactorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThreadPerConnection => "thread_per_connection",
            Self::Select => "select",
            Self::Poll => "poll",
            Self::Epoll => "epoll",
        }
    }
}

impl fmt::Display for ReactorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp a requested worker count into `1..=MAX_WORKERS`, warning when it moves
pub(crate) fn clamp_workers(listener: &str, requested: usize) -> usize {
    let workers = requested.clamp(1, MAX_WORKERS);
    if workers != requested {
        tracing::warn!(
            listener = %listener,
            requested,
            workers,
            "worker count clamped"
        );
    }
    workers
}

/// Lifecycle of a listening socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Init = 0,
    Listening = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Init,
            1 => Self::Listening,
            2 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Listening => "listening",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder for a [`ListenerState`]
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(ListenerState::Init as u8))
    }

    #[inline]
    pub(crate) fn get(&self) -> ListenerState {
        ListenerState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set(&self, state: ListenerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Metrics shared by all listener types
///
/// For UDP, a "connection" is a worker thread; for HTTP it is a request.
#[derive(Debug, Default)]
pub struct SourceMetrics {
    /// Currently active connections
    pub connections_active: AtomicU64,

    /// Total connections accepted
    pub connections_total: AtomicU64,

    /// Connections closed at the acceptor (blacklist, full handoff queue)
    pub connections_rejected: AtomicU64,

    /// Total reads, datagrams or body chunks received
    pub messages_received: AtomicU64,

    /// Total bytes received
    pub bytes_received: AtomicU64,

    /// Total errors encountered
    pub errors: AtomicU64,
}

impl SourceMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn message_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_active: u64,
    pub connections_total: u64,
    pub connections_rejected: u64,
    pub messages_received: u64,
    pub bytes_received: u64,
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_connection_tracking() {
        let metrics = SourceMetrics::new();

        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_rejected();
        assert_eq!(metrics.connections_active.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.connections_total.load(Ordering::Relaxed), 2);

        metrics.connection_closed();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_active, 1);
        assert_eq!(snapshot.connections_total, 2);
        assert_eq!(snapshot.connections_rejected, 1);
    }

    #[test]
    fn test_metrics_message_tracking() {
        let metrics = SourceMetrics::new();

        metrics.message_received(100);
        metrics.message_received(200);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_received, 2);
        assert_eq!(snapshot.bytes_received, 300);
    }

    #[test]
    fn test_state_cell_transitions() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), ListenerState::Init);

        for state in [
            ListenerState::Listening,
            ListenerState::ShuttingDown,
            ListenerState::Stopped,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }

    #[test]
    fn test_clamp_workers() {
        assert_eq!(clamp_workers("tcp:1", 0), 1);
        assert_eq!(clamp_workers("tcp:1", 4), 4);
        assert_eq!(clamp_workers("tcp:1", 1000), MAX_WORKERS);
    }
}
