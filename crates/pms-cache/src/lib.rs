//! # pms-cache
//!
//! Two-tier read-through caching with invalidate-on-write.
//!
//! ## Cache Hierarchy
//!
//! ```text
//! query   → L1 (DashMap) → L2 (Redis) → handler
//!               ↓               ↓           ↓
//!           <1µs latency   ~ms latency   data source
//!
//! command → handler → purge L1 → purge L2 → PUBLISH to other processes
//! ```
//!
//! Requests opt in by returning a [`CachePolicy`] from
//! [`Request::cache_policy`]: reads expose a [`Cacheable`] descriptor,
//! writes an [`Invalidating`] one. The [`Pipeline`] selects the stage
//! structurally, so no request is ever both cached and invalidating.
//!
//! ## Graceful Degradation
//!
//! L2 failures never reach callers. Lookups fall through to the handler,
//! writes and removals are logged and skipped. When Redis is disabled or
//! unreachable at startup, [`build_cache`] returns an L1-only cache.
//!
//! ## Tags
//!
//! Entries may be indexed under tags. Invalidating a tag removes every
//! member key in both tiers plus the tag's own slot.

pub mod cancel;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod invalidation;
pub mod keys;
pub mod local;
pub mod pipeline;
pub mod pubsub;
pub mod read_through;
pub mod redis_store;
pub mod settings;
pub mod stats;
pub mod store;
pub mod tiered;

pub use cancel::cancellable;
pub use descriptor::{CacheDuration, CachePolicy, Cacheable, Invalidating};
pub use error::{CacheError, Cancelled, DispatchError};
pub use invalidation::InvalidationCoordinator;
pub use keys::{ENTITY_TTL, LIST_TTL, ListKey, entity_key, versioned_key};
pub use local::{CachedEntry, LocalStore};
pub use pipeline::{Handler, Mediator, Pipeline, Request};
pub use pubsub::{InvalidationBus, InvalidationEvent, InvalidationListener, RedisInvalidationBus};
pub use read_through::ReadThroughCoordinator;
pub use redis_store::{RedisStore, connect};
pub use settings::{CacheSettings, RedisSettings};
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use store::{CacheStore, Payload, Tier};
pub use tiered::{TieredCache, build_cache};
