//! Node configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use crate::peers::protocol::{DEFAULT_BASE_PATH, DEFAULT_REPLICAS};

/// Tunables for one cache node.
#[derive(Debug, Clone)]
pub struct Config {
    /// Byte budget handed to each group's local LRU.
    pub cache_bytes: usize,
    /// Virtual nodes per peer on the consistent-hash ring. Must match across
    /// the cluster.
    pub replicas: usize,
    /// URL prefix the peer protocol is served under.
    pub base_path: String,
    /// Timeout for one peer fetch.
    pub peer_timeout: Duration,
}

impl Config {
    /// Loads configuration from the environment, falling back to defaults.
    ///
    /// # Environment Variables
    /// - `CACHE_BYTES` - per-group LRU budget in bytes (default: 64 MiB)
    /// - `RING_REPLICAS` - virtual nodes per peer (default: 50)
    /// - `BASE_PATH` - peer protocol URL prefix (default: `/_dcache_/`)
    /// - `PEER_TIMEOUT_MS` - peer fetch timeout in milliseconds (default: 500)
    pub fn from_env() -> Self {
        Self {
            cache_bytes: env::var("CACHE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(64 * 1024 * 1024),
            replicas: env::var("RING_REPLICAS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_REPLICAS),
            base_path: env::var("BASE_PATH").unwrap_or_else(|_| DEFAULT_BASE_PATH.to_string()),
            peer_timeout: env::var("PEER_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(500)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_bytes: 64 * 1024 * 1024,
            replicas: DEFAULT_REPLICAS,
            base_path: DEFAULT_BASE_PATH.to_string(),
            peer_timeout: Duration::from_millis(500),
        }
    }
}
