//! Integration tests against a real Redis instance.
//!
//! Tests use testcontainers and need a Docker daemon:
//!
//! ```text
//! cargo test -p pms-cache --test redis_cache -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use pms_cache::{
    CacheSettings, CacheStore, InvalidationBus, InvalidationEvent, InvalidationListener,
    LocalStore, RedisInvalidationBus, RedisSettings, RedisStore, build_cache, connect,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn redis_settings() -> RedisSettings {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");
            let port = container.get_host_port_ipv4(6379).await.expect("get port");
            (container, format!("redis://127.0.0.1:{port}"))
        })
        .await;

    RedisSettings {
        enabled: true,
        url: url.clone(),
        pool_size: 4,
        timeout_ms: 5_000,
    }
}

async fn store() -> RedisStore {
    RedisStore::new(connect(&redis_settings().await).await.expect("connect"))
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_build_cache_uses_redis_when_reachable() {
    let cache = build_cache(
        &redis_settings().await,
        &CacheSettings::default(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(cache.mode(), "tiered");
    assert!(cache.is_l2_available().await);
    assert!(cache.bus().is_some());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_set_get_remove() {
    let store = store().await;
    let key = format!("project:{}", Uuid::new_v4());

    store
        .set(&key, Arc::new(b"payload".to_vec()), Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(store.get(&key).await.unwrap().as_deref().map(Vec::as_slice), Some(&b"payload"[..]));

    store.remove(&key).await.unwrap();
    assert!(store.get(&key).await.unwrap().is_none());

    // Idempotent.
    store.remove(&key).await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_entries_expire() {
    let store = store().await;
    let key = format!("project:{}", Uuid::new_v4());

    store
        .set(&key, Arc::new(vec![1]), Duration::from_millis(100))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(store.get(&key).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_tag_members_are_taken_once() {
    let store = store().await;
    let tag = format!("projects:{}", Uuid::new_v4());
    let ttl = Duration::from_secs(60);

    store.add_to_tag(&tag, "a", ttl).await.unwrap();
    store.add_to_tag(&tag, "b", ttl).await.unwrap();

    let mut members = store.take_tag_members(&tag).await.unwrap();
    members.sort();
    assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
    assert!(store.take_tag_members(&tag).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_short_lived_member_does_not_shorten_tag_index() {
    let store = store().await;
    let tag = format!("projects:{}", Uuid::new_v4());

    store.add_to_tag(&tag, "long", Duration::from_secs(600)).await.unwrap();
    store.add_to_tag(&tag, "short", Duration::from_secs(5)).await.unwrap();

    let mut conn = store.pool().get().await.unwrap();
    let pttl: i64 = redis::cmd("PTTL")
        .arg(format!("tag:{tag}"))
        .query_async(&mut conn)
        .await
        .unwrap();
    assert!(pttl > 60_000, "tag index ttl dropped to {pttl}ms");

    let mut members = store.take_tag_members(&tag).await.unwrap();
    members.sort();
    assert_eq!(members, vec!["long".to_string(), "short".to_string()]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_remote_invalidation_purges_local_tier() {
    let settings = redis_settings().await;
    let channel = format!("pms:test:{}", Uuid::new_v4());
    let shutdown = CancellationToken::new();

    let local = Arc::new(LocalStore::default());
    local.insert("project:1", Arc::new(vec![1]), Duration::from_secs(60));

    InvalidationListener {
        redis_url: settings.url.clone(),
        channel: channel.clone(),
        local: Arc::clone(&local),
        origin: Uuid::new_v4(),
        shutdown: shutdown.clone(),
    }
    .start();

    let bus = RedisInvalidationBus::new(connect(&settings).await.unwrap(), channel);
    let event = InvalidationEvent {
        origin: Uuid::new_v4(),
        keys: vec!["project:1".into()],
        tags: vec![],
    };

    // The subscription is established asynchronously; publish until it lands.
    for _ in 0..50 {
        bus.publish(&event).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !local.contains("project:1") {
            break;
        }
    }

    assert!(!local.contains("project:1"));
    shutdown.cancel();
}
