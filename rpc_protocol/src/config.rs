// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Server configuration, loaded from a TOML file with field-by-field defaults (§6).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::worker::DEFAULT_WORKERS;

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_pool_max() -> isize {
    -1
}

fn default_small_packet_size() -> usize {
    512
}

fn default_large_packet_size() -> usize {
    32 * 1024
}

fn default_portmapper_port() -> i32 {
    111
}

fn default_rpc_registration_port() -> i32 {
    0
}

fn default_break_timeout_secs() -> u64 {
    30
}

fn default_deferred_queue_capacity() -> usize {
    3
}

/// Top-level server configuration. Deserialized from TOML; every field has a default so a
/// partial config file (or none at all) still produces a usable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcServerConfig {
    pub tcp_bind_address: String,
    pub udp_bind_address: String,

    #[serde(default = "default_workers")]
    pub worker_threads: usize,

    /// Maximum number of small-class buffers the packet pool will allocate; `-1` is unlimited.
    #[serde(default = "default_pool_max")]
    pub small_pkt_max: isize,
    /// Maximum number of large-class buffers the packet pool will allocate; `-1` is unlimited.
    #[serde(default = "default_pool_max")]
    pub large_pkt_max: isize,
    #[serde(default = "default_small_packet_size")]
    pub small_packet_size: usize,
    #[serde(default = "default_large_packet_size")]
    pub large_packet_size: usize,

    #[serde(default = "default_true")]
    pub register_with_portmapper: bool,
    pub portmapper_host: String,
    #[serde(default = "default_portmapper_port")]
    pub portmapper_port: i32,
    /// Local source port the portmapper client binds before connecting; `0` lets the OS assign
    /// an ephemeral port.
    #[serde(default = "default_rpc_registration_port")]
    pub rpc_registration_port: i32,

    #[serde(default = "default_break_timeout_secs")]
    pub oplock_break_timeout_secs: u64,
    #[serde(default = "default_deferred_queue_capacity")]
    pub oplock_deferred_queue_capacity: usize,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            tcp_bind_address: "0.0.0.0:2049".to_string(),
            udp_bind_address: "0.0.0.0:2049".to_string(),
            worker_threads: default_workers(),
            small_pkt_max: default_pool_max(),
            large_pkt_max: default_pool_max(),
            small_packet_size: default_small_packet_size(),
            large_packet_size: default_large_packet_size(),
            register_with_portmapper: true,
            portmapper_host: "127.0.0.1".to_string(),
            portmapper_port: default_portmapper_port(),
            rpc_registration_port: default_rpc_registration_port(),
            oplock_break_timeout_secs: default_break_timeout_secs(),
            oplock_deferred_queue_capacity: default_deferred_queue_capacity(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {e}"),
            Self::Parse(e) => write!(f, "failed to parse config file: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl RpcServerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = RpcServerConfig::default();
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.small_pkt_max, -1);
        assert_eq!(config.large_pkt_max, -1);
        assert_eq!(config.small_packet_size, 512);
        assert_eq!(config.large_packet_size, 32 * 1024);
        assert_eq!(config.oplock_break_timeout_secs, 30);
        assert_eq!(config.oplock_deferred_queue_capacity, 3);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rpc_server.toml");
        std::fs::write(&path, "worker_threads = 20\n").unwrap();

        let config = RpcServerConfig::from_file(&path).unwrap();
        assert_eq!(config.worker_threads, 20);
        assert_eq!(config.small_pkt_max, default_pool_max());
    }
}
