//! Sluice Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//!
//! # Parsing
//!
//! ```
//! use sluice_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[[listeners]]\nproto = \"tcp\"\nport = 2056").unwrap();
//! assert_eq!(config.listeners.len(), 1);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! blacklist = ["10.0.0.0/8"]
//!
//! [global]
//! greeting = "hello\n"
//!
//! [[listeners]]
//! proto = "http"
//! port = 7980
//! num_threads = 4
//!
//! [sink]
//! type = "stdout"
//! ```

mod enrichment;
mod error;
mod global;
mod listeners;
mod logging;
mod metrics;
mod prefix;
mod sinks;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use enrichment::EnrichmentConfig;
pub use error::{ConfigError, Result};
pub use global::GlobalConfig;
pub use listeners::{DecodeAs, ListenerConfig, MAX_NUM_THREADS, Protocol, ThreadMode};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use metrics::{MetricsConfig, MetricsFormat};
pub use prefix::{AddrPrefix, PrefixParseError};
pub use sinks::{NullSinkConfig, SinkConfig, StdoutSinkConfig};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Global settings (decode buffer sizing, default topic, greeting)
    pub global: GlobalConfig,

    /// Logging configuration
    pub log: LogConfig,

    /// Metrics reporting configuration
    pub metrics: MetricsConfig,

    /// Client addresses/prefixes whose TCP connections are dropped on accept
    pub blacklist: Vec<AddrPrefix>,

    /// Bound endpoints
    pub listeners: Vec<ListenerConfig>,

    /// Enrichment database
    pub enrichment: EnrichmentConfig,

    /// Publish sink
    pub sink: SinkConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Fail unless at least one listener is configured
    pub fn require_listeners(&self) -> Result<()> {
        if self.listeners.is_empty() {
            return Err(ConfigError::NoListeners);
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
