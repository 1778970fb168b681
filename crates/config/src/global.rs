//! Global configuration settings
//!
//! Decoder sizing, default topic and the optional TCP greeting.

use serde::Deserialize;

/// Global configuration that applies to all listeners
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Topic used for records that carry no request topic
    /// Default: "sluice"
    pub default_topic: String,

    /// Payload sent once to every accepted TCP client
    /// Default: none
    pub greeting: Option<String>,

    /// Initial capacity of a session's decode buffer (bytes)
    /// Default: 2048
    pub initial_buffer_size: usize,

    /// Ceiling for a session's decode buffer (bytes). Input that would grow
    /// the buffer past it faults the session.
    /// Default: 16MB
    pub max_buffer_size: usize,

    /// Decode buffer growth factor: new = max(allocated * factor, allocated + delta)
    /// Default: 2
    pub growth_factor: usize,

    /// Size of the per-read socket buffer (bytes)
    /// Default: 4096
    pub read_buffer_size: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_topic: "sluice".into(),
            greeting: None,
            initial_buffer_size: 2048,
            max_buffer_size: 16 * 1024 * 1024,
            growth_factor: 2,
            read_buffer_size: 4096,
        }
    }
}
