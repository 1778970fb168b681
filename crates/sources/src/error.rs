//! Listener errors

use crate::common::ReactorMode;

/// Errors starting a listener
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Address string did not resolve to a socket address
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    /// Reactor mode not available for this protocol
    #[error("{protocol} listener does not support mode {mode}")]
    UnsupportedMode {
        protocol: &'static str,
        mode: ReactorMode,
    },

    /// I/O error setting up reactors or threads
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
