//! The two-tier cache handle shared by both coordinators.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::local::LocalStore;
use crate::pubsub::{InvalidationBus, InvalidationListener, RedisInvalidationBus};
use crate::redis_store::{RedisStore, connect};
use crate::settings::{CacheSettings, RedisSettings};
use crate::stats::CacheStats;
use crate::store::CacheStore;

/// L1 store, optional L2 store, optional invalidation broadcast.
///
/// ## Cache Modes
///
/// - **local**: L1 only; single process deployments or Redis unreachable
/// - **tiered**: L1 in front of a shared L2, with Pub/Sub keeping L1s in sync
pub struct TieredCache {
    l1: Arc<LocalStore>,
    l2: Option<Arc<dyn CacheStore>>,
    bus: Option<Arc<dyn InvalidationBus>>,
    stats: Arc<CacheStats>,
    origin: Uuid,
    settings: CacheSettings,
}

impl TieredCache {
    pub fn local(settings: CacheSettings) -> Self {
        Self {
            l1: Arc::new(LocalStore::new(settings.local_max_entries)),
            l2: None,
            bus: None,
            stats: Arc::new(CacheStats::new()),
            origin: Uuid::new_v4(),
            settings,
        }
    }

    pub fn with_shared(mut self, l2: Arc<dyn CacheStore>) -> Self {
        self.l2 = Some(l2);
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn InvalidationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn l1(&self) -> &Arc<LocalStore> {
        &self.l1
    }

    pub fn l2(&self) -> Option<&Arc<dyn CacheStore>> {
        self.l2.as_ref()
    }

    pub fn bus(&self) -> Option<&Arc<dyn InvalidationBus>> {
        self.bus.as_ref()
    }

    pub fn stats(&self) -> &Arc<CacheStats> {
        &self.stats
    }

    /// Identity stamped on broadcast events from this process.
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn mode(&self) -> &'static str {
        if self.l2.is_some() { "tiered" } else { "local" }
    }

    /// For health checks. `false` in local mode.
    pub async fn is_l2_available(&self) -> bool {
        match &self.l2 {
            Some(l2) => l2.ping().await,
            None => false,
        }
    }

    /// Spawns the periodic L1 expiry sweep. `None` when the interval is 0.
    pub fn start_cleanup_task(&self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        if self.settings.cleanup_interval_secs == 0 {
            return None;
        }
        let period = Duration::from_secs(self.settings.cleanup_interval_secs);
        let l1 = Arc::clone(&self.l1);

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = l1.cleanup_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "L1 cache cleanup completed");
                        }
                    }
                }
            }
        }))
    }
}

/// Builds the cache for the configured mode.
///
/// If Redis is disabled or cannot be reached, the cache runs L1-only so the
/// server can still start. In tiered mode the invalidation listener is
/// started and stops when `shutdown` fires.
pub async fn build_cache(
    redis: &RedisSettings,
    settings: &CacheSettings,
    shutdown: CancellationToken,
) -> TieredCache {
    let cache = TieredCache::local(settings.clone());

    if !redis.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return cache;
    }

    tracing::info!(url = %redis.url, "connecting to Redis");
    let pool = match connect(redis).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, falling back to local cache");
            return cache;
        }
    };
    tracing::info!("connected to Redis");

    let mut cache = cache.with_shared(Arc::new(RedisStore::new(pool.clone())));

    if settings.broadcast_invalidations {
        cache = cache.with_bus(Arc::new(RedisInvalidationBus::new(
            pool,
            settings.invalidation_channel.clone(),
        )));
        InvalidationListener {
            redis_url: redis.url.clone(),
            channel: settings.invalidation_channel.clone(),
            local: Arc::clone(cache.l1()),
            origin: cache.origin(),
            shutdown,
        }
        .start();
    }

    cache
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_redis_builds_local_cache() {
        let cache = build_cache(
            &RedisSettings::default(),
            &CacheSettings::default(),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(cache.mode(), "local");
        assert!(!cache.is_l2_available().await);
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_local() {
        let redis = RedisSettings {
            enabled: true,
            url: "redis://127.0.0.1:1".into(),
            timeout_ms: 100,
            ..Default::default()
        };
        let cache = build_cache(&redis, &CacheSettings::default(), CancellationToken::new()).await;
        assert_eq!(cache.mode(), "local");
        assert!(cache.bus().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_task_disabled_with_zero_interval() {
        let settings = CacheSettings {
            cleanup_interval_secs: 0,
            ..Default::default()
        };
        let cache = TieredCache::local(settings);
        assert!(cache.start_cleanup_task(CancellationToken::new()).is_none());
    }
}
