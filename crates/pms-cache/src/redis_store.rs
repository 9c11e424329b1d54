//! Shared cache tier backed by Redis.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::error::CacheError;
use crate::settings::RedisSettings;
use crate::store::{CacheStore, Payload, Tier};

/// Prefix of the Redis sets that index tag members.
const TAG_PREFIX: &str = "tag:";

/// Adds a member to a tag index and raises the index TTL to at least the
/// member's TTL. A shorter TTL never lowers it.
static ADD_TO_TAG: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
redis.call('SADD', KEYS[1], ARGV[1])
local ttl = tonumber(ARGV[2])
if redis.call('PTTL', KEYS[1]) < ttl then
    redis.call('PEXPIRE', KEYS[1], ttl)
end
return 0
",
    )
});

fn tag_key(tag: &str) -> String {
    format!("{TAG_PREFIX}{tag}")
}

/// Whole milliseconds, at least 1, so sub-millisecond TTLs still expire.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// L2 store. Every call checks a connection out of the pool; any failure is
/// reported as a `CacheError` for the coordinators to log and skip.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, CacheError> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn tier(&self) -> Tier {
        Tier::L2
    }

    async fn get(&self, key: &str) -> Result<Option<Payload>, CacheError> {
        let mut conn = self.conn().await?;
        let data: Option<Vec<u8>> = conn.get(key).await?;
        Ok(data.map(Arc::new))
    }

    async fn set(&self, key: &str, value: Payload, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        conn.pset_ex::<_, _, ()>(key, value.as_slice(), ttl_millis(ttl))
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn add_to_tag(&self, tag: &str, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let index = tag_key(tag);
        let _: i64 = ADD_TO_TAG
            .key(&index)
            .arg(key)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn take_tag_members(&self, tag: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn().await?;
        let index = tag_key(tag);
        let (members,): (Vec<String>,) = redis::pipe()
            .atomic()
            .smembers(&index)
            .del(&index)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn ping(&self) -> bool {
        self.pool.get().await.is_ok()
    }
}

/// Builds a connection pool and verifies one connection can be opened.
pub async fn connect(settings: &RedisSettings) -> Result<Pool, CacheError> {
    let timeout = Duration::from_millis(settings.timeout_ms);
    let mut config = deadpool_redis::Config::from_url(&settings.url);
    let mut pool_config = deadpool_redis::PoolConfig::new(settings.pool_size);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);
    config.pool = Some(pool_config);

    let pool = config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| CacheError::unavailable(format!("failed to create Redis pool: {e}")))?;

    pool.get().await?;
    Ok(pool)
}
