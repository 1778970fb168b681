//! Listener configuration types
//!
//! One `[[listeners]]` entry per bound endpoint. Unknown protocol, mode or
//! decoder names are rejected at parse time by serde.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Upper bound on worker threads per listener. Larger values are clamped.
pub const MAX_NUM_THREADS: usize = 256;

/// Transport protocol of a listener
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Raw TCP byte stream, framed by JSON value boundaries
    #[default]
    Tcp,
    /// One datagram per message
    Udp,
    /// HTTP POST bodies
    Http,
}

impl Protocol {
    /// Lowercase protocol name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Http => "http",
        }
    }

    /// Whether the protocol binds a TCP port
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Tcp | Self::Http)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threading/reactor mode of a listener
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMode {
    /// One thread per connection (HTTP only)
    ThreadPerConnection,
    /// select(2)-style reactor
    Select,
    /// poll(2)-style reactor
    Poll,
    /// epoll(7)-style reactor (default)
    #[default]
    Epoll,
}

impl ThreadMode {
    /// Mode name as written in the config
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThreadPerConnection => "thread_per_connection",
            Self::Select => "select",
            Self::Poll => "poll",
            Self::Epoll => "epoll",
        }
    }
}

/// Alternate decoder applied to HTTP bodies before the JSON pipeline
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DecodeAs {
    /// Cisco MSE streaming notification documents
    Mse,
}

/// Listener configuration
///
/// ```toml
/// [[listeners]]
/// proto = "tcp"
/// port = 2056
/// num_threads = 4
/// mode = "epoll"
/// tcp_keepalive = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Transport protocol
    pub proto: Protocol,

    /// Bind address
    /// Default: "0.0.0.0"
    pub address: String,

    /// Listen port
    pub port: u16,

    /// Worker threads, at least 1, clamped to MAX_NUM_THREADS
    /// Default: 1
    pub num_threads: usize,

    /// Reactor mode
    /// Default: epoll
    pub mode: ThreadMode,

    /// Enable SO_KEEPALIVE on accepted TCP connections
    /// Default: false
    pub tcp_keepalive: bool,

    /// Alternate body decoder (HTTP only)
    pub decode_as: Option<DecodeAs>,

    /// Bound of each worker's connection handoff queue (TCP only)
    /// Default: 1024
    pub handoff_capacity: usize,

    /// Bound on writing the greeting to a new TCP connection
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub greeting_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            proto: Protocol::Tcp,
            address: "0.0.0.0".into(),
            port: 2056,
            num_threads: 1,
            mode: ThreadMode::Epoll,
            tcp_keepalive: false,
            decode_as: None,
            handoff_capacity: 1024,
            greeting_timeout: Duration::from_secs(5),
        }
    }
}

impl ListenerConfig {
    /// Identifier used in logs and errors, e.g. `tcp:2056`
    pub fn name(&self) -> String {
        format!("{}:{}", self.proto, self.port)
    }

    /// Worker count after clamping to MAX_NUM_THREADS
    pub fn effective_threads(&self) -> usize {
        self.num_threads.clamp(1, MAX_NUM_THREADS)
    }

    /// Whether `num_threads` exceeded the maximum and was clamped
    pub fn is_clamped(&self) -> bool {
        self.num_threads > MAX_NUM_THREADS
    }

    /// Get the bind address as "address:port"
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
