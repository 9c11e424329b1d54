//! Cache configuration sections.

use serde::{Deserialize, Serialize};

use crate::local::DEFAULT_MAX_ENTRIES;

pub const DEFAULT_INVALIDATION_CHANNEL: &str = "pms:cache:invalidate";

/// Shared-tier connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    /// Run with an L2 tier. When false, or when the server is unreachable at
    /// startup, caching is L1-only.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    16
}

fn default_timeout_ms() -> u64 {
    500
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            pool_size: default_pool_size(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Behaviour of the coordinators themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Master switch. When false every request goes straight to its handler.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_local_max_entries")]
    pub local_max_entries: usize,
    /// Interval of the background L1 expiry sweep, in seconds. 0 disables it.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Publish invalidations so other processes evict their L1 entries.
    #[serde(default = "default_true")]
    pub broadcast_invalidations: bool,
    #[serde(default = "default_invalidation_channel")]
    pub invalidation_channel: String,
}

fn default_true() -> bool {
    true
}

fn default_local_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_invalidation_channel() -> String {
    DEFAULT_INVALIDATION_CHANNEL.to_string()
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            local_max_entries: default_local_max_entries(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            broadcast_invalidations: true,
            invalidation_channel: default_invalidation_channel(),
        }
    }
}

impl CacheSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.local_max_entries == 0 {
            return Err("cache.local_max_entries must be greater than 0".into());
        }
        if self.invalidation_channel.trim().is_empty() {
            return Err("cache.invalidation_channel must not be empty".into());
        }
        Ok(())
    }
}
