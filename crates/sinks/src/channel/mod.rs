//! Channel sink - forwards messages to another thread
//!
//! A bounded channel drops messages when full rather than blocking the
//! publishing worker.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::{Message, Publisher, SinkMetrics, SinkMetricsSnapshot};

/// Sink that sends every message over a crossbeam channel
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<Message>,
    metrics: SinkMetrics,
}

impl ChannelSink {
    /// Create a sink with an unbounded channel
    pub fn unbounded() -> (Self, Receiver<Message>) {
        let (sender, receiver) = channel::unbounded();
        (Self::from_sender(sender), receiver)
    }

    /// Create a sink with a bounded channel
    pub fn bounded(capacity: usize) -> (Self, Receiver<Message>) {
        let (sender, receiver) = channel::bounded(capacity);
        (Self::from_sender(sender), receiver)
    }

    fn from_sender(sender: Sender<Message>) -> Self {
        Self {
            sender,
            metrics: SinkMetrics::new(),
        }
    }
}

impl Publisher for ChannelSink {
    fn publish(&self, message: Message) {
        let len = message.len();
        match self.sender.try_send(message) {
            Ok(()) => self.metrics.record_published(len),
            Err(TrySendError::Full(_)) => {
                self.metrics.record_dropped();
                tracing::warn!("channel sink full, dropping message");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.metrics.record_dropped();
                tracing::debug!("channel sink receiver gone, dropping message");
            }
        }
    }

    fn name(&self) -> &str {
        "channel"
    }

    fn metrics(&self) -> SinkMetricsSnapshot {
        self.metrics.snapshot()
    }
}
