//! Protocol-independent handle over running listeners

use std::net::SocketAddr;
use std::sync::Arc;

use crate::common::{ListenerState, SourceMetrics};
use crate::http::HttpListener;
use crate::tcp::TcpDistributor;
use crate::udp::UdpListener;

/// Any running listener
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpDistributor),
    Udp(UdpListener),
    Http(HttpListener),
}

impl Listener {
    /// Protocol name
    pub fn protocol(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Udp(_) => "udp",
            Self::Http(_) => "http",
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        match self {
            Self::Tcp(l) => l.local_addr(),
            Self::Udp(l) => l.local_addr(),
            Self::Http(l) => l.local_addr(),
        }
    }

    pub fn state(&self) -> ListenerState {
        match self {
            Self::Tcp(l) => l.state(),
            Self::Udp(l) => l.state(),
            Self::Http(l) => l.state(),
        }
    }

    pub fn metrics(&self) -> &Arc<SourceMetrics> {
        match self {
            Self::Tcp(l) => l.metrics(),
            Self::Udp(l) => l.metrics(),
            Self::Http(l) => l.metrics(),
        }
    }

    /// Stop the listener and join its threads
    pub fn shutdown(&mut self) {
        match self {
            Self::Tcp(l) => l.shutdown(),
            Self::Udp(l) => l.shutdown(),
            Self::Http(l) => l.shutdown(),
        }
    }
}

impl From<TcpDistributor> for Listener {
    fn from(listener: TcpDistributor) -> Self {
        Self::Tcp(listener)
    }
}

impl From<UdpListener> for Listener {
    fn from(listener: UdpListener) -> Self {
        Self::Udp(listener)
    }
}

impl From<HttpListener> for Listener {
    fn from(listener: HttpListener) -> Self {
        Self::Http(listener)
    }
}
