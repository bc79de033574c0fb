//! Configuration for kvmux
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{MuxError, Result};

/// Main configuration for a kvmux connection
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Server address (host:port)
    pub server_addr: String,

    /// TCP connect timeout (milliseconds, 0 = OS default)
    pub connect_timeout_ms: u64,

    /// Socket write timeout (milliseconds, 0 = none)
    ///
    /// There is deliberately no read timeout: the reader thread idles
    /// in `receive()` for as long as the connection is open.
    pub write_timeout_ms: u64,

    /// Disable Nagle's algorithm
    pub nodelay: bool,

    // -------------------------------------------------------------------------
    // Framing Configuration
    // -------------------------------------------------------------------------
    /// Largest inbound payload accepted (bytes)
    pub max_payload_size: usize,

    // -------------------------------------------------------------------------
    // Dispatcher Configuration
    // -------------------------------------------------------------------------
    /// Frames a single tag may buffer before further frames are rejected
    pub slot_capacity: usize,

    /// Await timeout for ordinary requests (milliseconds, 0 = wait forever)
    pub request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:12345".to_string(),
            connect_timeout_ms: 5000,
            write_timeout_ms: 5000,
            nodelay: true,
            max_payload_size: 64 * 1024 * 1024, // 64 MB
            slot_capacity: 1024,
            request_timeout_ms: 0,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the values that would make a connection unusable
    pub fn validate(&self) -> Result<()> {
        if self.slot_capacity == 0 {
            return Err(MuxError::Config(
                "slot_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_payload_size == 0 || self.max_payload_size > i32::MAX as usize {
            return Err(MuxError::Config(format!(
                "max_payload_size must be in 1..={}, got {}",
                i32::MAX,
                self.max_payload_size
            )));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        millis(self.request_timeout_ms)
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the server address (host:port)
    pub fn server_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server_addr = addr.into();
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Set the maximum inbound payload size (in bytes)
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the per-tag slot capacity
    pub fn slot_capacity(mut self, capacity: usize) -> Self {
        self.config.slot_capacity = capacity;
        self
    }

    /// Set the ordinary request timeout (in milliseconds)
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
