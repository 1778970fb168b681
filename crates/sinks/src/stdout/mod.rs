//! Stdout Sink - Human-readable debug output
//!
//! Writes one line per published record. Not intended for production use at
//! high throughput: every line takes the writer lock.
//!
//! # Example Output
//!
//! ```text
//! rb_flow [0x542696db8801] {"client_mac":"54:26:96:db:88:01","a":1}
//! rb_event {"type":"login"}
//! ```

use std::io::{self, Write};

use owo_colors::{OwoColorize, Style};
use parking_lot::Mutex;

use crate::{Message, Publisher, SinkMetrics, SinkMetricsSnapshot};

/// Configuration for stdout sink
#[derive(Debug, Clone)]
pub struct StdoutConfig {
    /// Prefix lines with topic and partition key
    pub show_topic: bool,

    /// Enable colored prefixes
    pub color: bool,
}

impl Default for StdoutConfig {
    fn default() -> Self {
        Self {
            show_topic: true,
            color: true,
        }
    }
}

impl StdoutConfig {
    /// Create config with colors disabled (for piped output)
    pub fn no_color() -> Self {
        Self {
            color: false,
            ..Self::default()
        }
    }
}

/// Stdout sink for debug output
pub struct StdoutSink {
    config: StdoutConfig,
    writer: Mutex<Box<dyn Write + Send>>,
    metrics: SinkMetrics,
}

impl StdoutSink {
    /// Create a sink writing to the process stdout
    pub fn new(config: StdoutConfig) -> Self {
        Self::with_writer(config, Box::new(io::stdout()))
    }

    /// Create a sink writing to an arbitrary writer
    pub fn with_writer(config: StdoutConfig, writer: Box<dyn Write + Send>) -> Self {
        Self {
            config,
            writer: Mutex::new(writer),
            metrics: SinkMetrics::new(),
        }
    }

    fn push_label(&self, line: &mut Vec<u8>, label: &str) {
        if self.config.color {
            line.extend_from_slice(label.style(Style::new().dimmed()).to_string().as_bytes());
        } else {
            line.extend_from_slice(label.as_bytes());
        }
        line.push(b' ');
    }

    fn format_line(&self, message: &Message) -> Vec<u8> {
        let mut line = Vec::with_capacity(message.payload.len() + message.topic.len() + 24);

        if self.config.show_topic {
            self.push_label(&mut line, &message.topic);

            if let Some(key) = message.partition_key {
                self.push_label(&mut line, &format!("[{key:#014x}]"));
            }
        }

        line.extend_from_slice(&message.payload);
        line.push(b'\n');
        line
    }
}

impl Publisher for StdoutSink {
    fn publish(&self, message: Message) {
        let line = self.format_line(&message);

        let mut writer = self.writer.lock();
        match writer.write_all(&line).and_then(|()| writer.flush()) {
            Ok(()) => self.metrics.record_published(message.len()),
            Err(e) => {
                self.metrics.record_write_error();
                tracing::warn!(error = %e, topic = %message.topic, "stdout write failed");
            }
        }
    }

    fn name(&self) -> &str {
        "stdout"
    }

    fn metrics(&self) -> SinkMetricsSnapshot {
        self.metrics.snapshot()
    }
}
