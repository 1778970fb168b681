//! Publish sink configuration
//!
//! The sink receives every decoded and enriched record. Selecting it here
//! replaces any process-wide "debug output" switch.

use serde::Deserialize;

/// Sink selection, tagged by `type`
///
/// ```toml
/// [sink]
/// type = "stdout"
/// show_topic = true
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Discards all messages, counting them
    Null(NullSinkConfig),

    /// One line per message on stdout
    Stdout(StdoutSinkConfig),
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::Stdout(StdoutSinkConfig::default())
    }
}

impl SinkConfig {
    /// Sink type name
    pub fn sink_type(&self) -> &'static str {
        match self {
            Self::Null(_) => "null",
            Self::Stdout(_) => "stdout",
        }
    }
}

/// Null sink configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NullSinkConfig {}

/// Stdout sink configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StdoutSinkConfig {
    /// Prefix every line with the topic and partition key
    /// Default: true
    pub show_topic: bool,
}

impl Default for StdoutSinkConfig {
    fn default() -> Self {
        Self { show_topic: true }
    }
}
