//! Configuration module for netpulse.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API server (default: 8080)
    pub http_port: u16,
    /// Per-probe timeout inside a session, in milliseconds (default: 1500)
    pub probe_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            probe_timeout_ms: 1500,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `NETPULSE_HTTP_PORT`: HTTP port (default: 8080)
    /// - `NETPULSE_PROBE_TIMEOUT_MS`: per-probe timeout (default: 1500)
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("NETPULSE_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(timeout_str) = env::var("NETPULSE_PROBE_TIMEOUT_MS") {
            if let Ok(timeout) = timeout_str.parse() {
                cfg.probe_timeout_ms = timeout;
            }
        }

        cfg
    }
}
