//! Sluice - Sources
//!
//! Listeners that read client bytes and drive the [`Pipeline`](sluice_pipeline::Pipeline).
//!
//! # Available Listeners
//!
//! - **TCP** - acceptor thread plus a fixed pool of `mio` worker reactors
//! - **UDP** - per-worker `SO_REUSEPORT` sockets, one datagram per record set
//! - **HTTP** - axum POST endpoints with streamed request bodies
//!
//! # Design Principles
//!
//! - **Single owner**: a connection and its session live on one worker thread
//! - **Bounded handoff**: acceptor-to-worker queues have a fixed capacity and
//!   reject at accept time when full
//! - **Cooperative shutdown**: a shared flag plus a wakeup per reactor
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sluice_sources::{Blacklist, TcpDistributor, TcpListenerConfig};
//!
//! let config = TcpListenerConfig {
//!     num_threads: 4,
//!     ..TcpListenerConfig::with_port(2056)
//! };
//! let mut listener = TcpDistributor::start(config, pipeline, Arc::new(Blacklist::new()))?;
//! // ...
//! listener.shutdown();
//! ```

pub mod blacklist;
pub mod http;
pub mod tcp;
pub mod udp;

mod common;
mod error;
mod listener;
mod socket;
mod worker;

pub use blacklist::Blacklist;
pub use common::{ListenerState, MAX_WORKERS, MetricsSnapshot, ReactorMode, SourceMetrics};
pub use error::ListenerError;
pub use http::{BodyFormat, HttpListener, HttpListenerConfig};
pub use listener::Listener;
pub use tcp::{TcpDistributor, TcpListenerConfig};
pub use udp::{UdpListener, UdpListenerConfig};

// Test modules
#[cfg(test)]
mod tcp_test;
