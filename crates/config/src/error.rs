//! Configuration error types

use std::io;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML (unknown protocol, malformed number, ...)
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Two listeners of the same transport bind the same port
    #[error("port {port} is used by multiple listeners: {listeners}")]
    DuplicatePort {
        /// The conflicting port
        port: u16,
        /// Listeners using this port
        listeners: String,
    },

    /// Validation error - invalid value
    #[error("{component} '{name}' has invalid {field}: {message}")]
    InvalidValue {
        /// Component type
        component: &'static str,
        /// Name of the component
        name: String,
        /// Field name
        field: &'static str,
        /// Error message
        message: String,
    },

    /// No listeners configured
    #[error("no listeners are configured - at least one [[listeners]] entry is required")]
    NoListeners,
}

impl ConfigError {
    /// Create a DuplicatePort error
    pub fn duplicate_port(port: u16, listeners: impl Into<String>) -> Self {
        Self::DuplicatePort {
            port,
            listeners: listeners.into(),
        }
    }

    /// Create an InvalidValue error
    pub fn invalid_value(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            component,
            name: name.into(),
            field,
            message: message.into(),
        }
    }
}
