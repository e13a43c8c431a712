//! Configuration Module
//!
//! Loads the server's store chain settings from environment variables.

use std::env;
use std::str::FromStr;

use crate::contract::DEFAULT_COLLECTION;
use crate::stores::DEFAULT_MAX_ENTRIES_PER_COLLECTION;
use crate::wrappers::DEFAULT_COMPRESSION_THRESHOLD;

/// Largest stored record accepted by default (1 MiB)
pub const DEFAULT_MAX_ENTRY_SIZE: usize = 1024 * 1024;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Capacity of each collection in the memory engine
    pub max_entries_per_collection: usize,
    /// Collection used when a request names none
    pub default_collection: String,
    /// HTTP server port
    pub server_port: u16,
    /// Seconds between cull sweeps, 0 disables the task
    pub cull_interval: u64,
    /// Lower TTL bound applied by the clamp wrapper, in seconds
    pub min_ttl: f64,
    /// Upper TTL bound applied by the clamp wrapper, in seconds
    pub max_ttl: Option<f64>,
    /// Payloads whose JSON is longer than this many bytes are compressed
    pub compression_threshold: usize,
    /// Largest stored record accepted, in bytes
    pub max_entry_size: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES_PER_COLLECTION` - Engine capacity per collection (default: 1000)
    /// - `DEFAULT_COLLECTION` - Collection for requests without one (default: default_collection)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CULL_INTERVAL` - Cull frequency in seconds, 0 disables (default: 60)
    /// - `MIN_TTL` - Minimum TTL in seconds (default: 1)
    /// - `MAX_TTL` - Maximum TTL in seconds (default: unbounded)
    /// - `COMPRESSION_THRESHOLD` - Compression threshold in bytes (default: 1024)
    /// - `MAX_ENTRY_SIZE` - Largest record in bytes (default: 1048576)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries_per_collection: parse_env(
                "MAX_ENTRIES_PER_COLLECTION",
                defaults.max_entries_per_collection,
            ),
            default_collection: env::var("DEFAULT_COLLECTION")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.default_collection),
            server_port: parse_env("SERVER_PORT", defaults.server_port),
            cull_interval: parse_env("CULL_INTERVAL", defaults.cull_interval),
            min_ttl: parse_env("MIN_TTL", defaults.min_ttl),
            max_ttl: env::var("MAX_TTL").ok().and_then(|v| v.parse().ok()),
            compression_threshold: parse_env(
                "COMPRESSION_THRESHOLD",
                defaults.compression_threshold,
            ),
            max_entry_size: parse_env("MAX_ENTRY_SIZE", defaults.max_entry_size),
        }
    }
}

fn parse_env<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries_per_collection: DEFAULT_MAX_ENTRIES_PER_COLLECTION,
            default_collection: DEFAULT_COLLECTION.to_string(),
            server_port: 3000,
            cull_interval: 60,
            min_ttl: 1.0,
            max_ttl: None,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_entries_per_collection, 1000);
        assert_eq!(config.default_collection, "default_collection");
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cull_interval, 60);
        assert_eq!(config.min_ttl, 1.0);
        assert_eq!(config.max_ttl, None);
        assert_eq!(config.compression_threshold, 1024);
        assert_eq!(config.max_entry_size, 1024 * 1024);
    }

    #[test]
    fn test_config_from_env() {
        // Variables are set and cleared in one test; parallel tests would race on them
        for name in [
            "MAX_ENTRIES_PER_COLLECTION",
            "DEFAULT_COLLECTION",
            "SERVER_PORT",
            "CULL_INTERVAL",
            "MIN_TTL",
            "MAX_TTL",
            "COMPRESSION_THRESHOLD",
            "MAX_ENTRY_SIZE",
        ] {
            env::remove_var(name);
        }
        assert_eq!(Config::from_env(), Config::default());

        env::set_var("MAX_ENTRIES_PER_COLLECTION", "50");
        env::set_var("MAX_TTL", "3600");
        env::set_var("CULL_INTERVAL", "0");
        env::set_var("SERVER_PORT", "not-a-port");

        let config = Config::from_env();
        assert_eq!(config.max_entries_per_collection, 50);
        assert_eq!(config.max_ttl, Some(3600.0));
        assert_eq!(config.cull_interval, 0);
        assert_eq!(config.server_port, 3000);

        for name in ["MAX_ENTRIES_PER_COLLECTION", "MAX_TTL", "CULL_INTERVAL", "SERVER_PORT"] {
            env::remove_var(name);
        }
    }
}
