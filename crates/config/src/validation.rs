//! Configuration validation
//!
//! Validates config consistency:
//! - Listener ports are non-zero and unique per transport
//! - Thread counts and reactor modes are usable for the protocol
//! - `decode_as` is only set on HTTP listeners
//! - Decode buffer sizing is coherent
//!
//! Blacklist entries are checked earlier, while deserializing.

use crate::Config;
use crate::error::{ConfigError, Result};
use crate::listeners::{Protocol, ThreadMode};
use std::collections::HashMap;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_listeners(config)?;
    validate_global(config)?;
    Ok(())
}

fn validate_listeners(config: &Config) -> Result<()> {
    let mut stream_ports: HashMap<u16, Vec<String>> = HashMap::new();
    let mut datagram_ports: HashMap<u16, Vec<String>> = HashMap::new();

    for listener in &config.listeners {
        let name = listener.name();

        if listener.port == 0 {
            return Err(ConfigError::invalid_value(
                "listener",
                name,
                "port",
                "must be greater than 0",
            ));
        }

        if listener.num_threads == 0 {
            return Err(ConfigError::invalid_value(
                "listener",
                name,
                "num_threads",
                "must be at least 1",
            ));
        }

        if listener.mode == ThreadMode::ThreadPerConnection && listener.proto != Protocol::Http {
            return Err(ConfigError::invalid_value(
                "listener",
                name,
                "mode",
                format!("thread_per_connection is not supported for {}", listener.proto),
            ));
        }

        if listener.decode_as.is_some() && listener.proto != Protocol::Http {
            return Err(ConfigError::invalid_value(
                "listener",
                name,
                "decode_as",
                "only http listeners support alternate decoders",
            ));
        }

        if listener.proto == Protocol::Tcp && listener.handoff_capacity == 0 {
            return Err(ConfigError::invalid_value(
                "listener",
                name,
                "handoff_capacity",
                "must be at least 1",
            ));
        }

        if listener.proto == Protocol::Tcp && listener.greeting_timeout.is_zero() {
            return Err(ConfigError::invalid_value(
                "listener",
                name,
                "greeting_timeout",
                "must be greater than 0",
            ));
        }

        // UDP can share a port number with a TCP-based listener
        let ports = if listener.proto.is_stream() {
            &mut stream_ports
        } else {
            &mut datagram_ports
        };
        ports.entry(listener.port).or_default().push(name);
    }

    for (port, names) in stream_ports.iter().chain(datagram_ports.iter()) {
        if names.len() > 1 {
            return Err(ConfigError::duplicate_port(*port, names.join(", ")));
        }
    }

    Ok(())
}

fn validate_global(config: &Config) -> Result<()> {
    let global = &config.global;

    if global.initial_buffer_size == 0 {
        return Err(ConfigError::invalid_value(
            "global",
            "global",
            "initial_buffer_size",
            "must be greater than 0",
        ));
    }

    if global.max_buffer_size < global.initial_buffer_size {
        return Err(ConfigError::invalid_value(
            "global",
            "global",
            "max_buffer_size",
            "must not be smaller than initial_buffer_size",
        ));
    }

    if global.growth_factor < 2 {
        return Err(ConfigError::invalid_value(
            "global",
            "global",
            "growth_factor",
            "must be at least 2",
        ));
    }

    if global.read_buffer_size == 0 {
        return Err(ConfigError::invalid_value(
            "global",
            "global",
            "read_buffer_size",
            "must be greater than 0",
        ));
    }

    Ok(())
}
