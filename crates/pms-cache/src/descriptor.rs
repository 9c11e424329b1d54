//! Contracts operations implement to opt into caching.

use std::time::Duration;

/// A signed time-to-live. Zero or negative values disable caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CacheDuration(i64);

impl CacheDuration {
    pub const ZERO: CacheDuration = CacheDuration(0);

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000))
    }

    pub const fn from_mins(mins: i64) -> Self {
        Self::from_secs(mins.saturating_mul(60))
    }

    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// The expiry to hand to a store, or `None` when caching is disabled.
    pub fn as_ttl(&self) -> Option<Duration> {
        u64::try_from(self.0)
            .ok()
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
    }
}

impl From<Duration> for CacheDuration {
    fn from(duration: Duration) -> Self {
        Self(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
    }
}

/// A read operation whose result may be served from cache.
///
/// The key must be a pure function of the operation's parameters: two
/// requests that would produce the same result must produce the same key.
pub trait Cacheable: Send + Sync {
    /// Empty disables caching for this request.
    fn cache_key(&self) -> String;

    fn cache_duration(&self) -> CacheDuration;

    /// Labels under which the entry is indexed for bulk invalidation.
    fn cache_tags(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A mutating operation that makes cached reads stale.
///
/// Targets are computed from the fully bound request, so path parameters
/// must be set before the request is dispatched.
pub trait Invalidating: Send + Sync {
    fn cache_keys(&self) -> Vec<String>;

    fn cache_tags(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Which coordinator, if any, applies to a request.
///
/// A request declares exactly one policy, so the read-through and
/// invalidation coordinators never both activate for the same request.
#[derive(Clone, Copy)]
pub enum CachePolicy<'a> {
    None,
    Read(&'a dyn Cacheable),
    Invalidate(&'a dyn Invalidating),
}

impl CachePolicy<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Read(_) => "read",
            Self::Invalidate(_) => "invalidate",
        }
    }
}
