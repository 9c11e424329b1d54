//! Key-value store abstraction shared by both cache tiers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// Opaque serialized payload. `Arc` keeps hits zero-copy.
pub type Payload = Arc<Vec<u8>>;

/// Which tier a store serves as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Process-local, never fails.
    L1,
    /// Shared across processes, may be unreachable.
    L2,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L1 => "L1",
            Self::L2 => "L2",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key-value store with per-entry expiry and a tag index.
///
/// `set` overwrites unconditionally (last writer wins) and must be a single
/// backend operation so an abandoned call never leaves half an entry behind.
/// `remove` is idempotent.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn tier(&self) -> Tier;

    /// Returns the live payload for `key`, or `None` on miss or expiry.
    async fn get(&self, key: &str) -> Result<Option<Payload>, CacheError>;

    /// Stores `value` under `key`, expiring `ttl` from now.
    async fn set(&self, key: &str, value: Payload, ttl: Duration) -> Result<(), CacheError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Records `key` as a member of `tag`. The membership outlives the
    /// entry by at most `ttl`.
    async fn add_to_tag(&self, tag: &str, key: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Removes the index for `tag` and returns the keys it held.
    async fn take_tag_members(&self, tag: &str) -> Result<Vec<String>, CacheError>;

    /// Cheap liveness probe for health checks.
    async fn ping(&self) -> bool {
        true
    }
}
