//! Pipeline error types

use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

/// Decode buffer growth failures. Either one faults the session.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Growing would pass the configured ceiling
    #[error("decode buffer limit exceeded: {required} bytes needed, limit is {limit}")]
    LimitExceeded {
        /// Bytes the buffer would need to hold
        required: usize,
        /// Configured ceiling
        limit: usize,
    },

    /// The allocator refused the reservation
    #[error("decode buffer allocation of {requested} bytes failed: {source}")]
    Alloc {
        /// Capacity that was requested
        requested: usize,
        #[source]
        source: TryReserveError,
    },
}

/// Enrichment database loading errors
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// Failed to read the database file
    #[error("failed to read enrichment file '{path}': {source}")]
    Io {
        /// Path to the file
        path: String,
        #[source]
        source: io::Error,
    },

    /// File is not valid JSON
    #[error("failed to parse enrichment database: {0}")]
    Parse(#[from] serde_json::Error),

    /// Document has the wrong shape
    #[error("invalid enrichment database: {0}")]
    Invalid(String),
}

/// MSE document conversion errors
#[derive(Debug, Error)]
pub enum MseError {
    /// Body is not JSON
    #[error("MSE body is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Neither `StreamingNotification` nor `notifications` present
    #[error("MSE body has no StreamingNotification or notifications member")]
    MissingNotification,
}

/// MAC address text parsing error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid MAC address '{0}'")]
pub struct MacParseError(pub String);

/// Result type for enrichment loading
pub type Result<T> = std::result::Result<T, EnrichmentError>;
