//! Cross-process L1 invalidation over Redis Pub/Sub.
//!
//! ```text
//! Process A: invalidation coordinator purges its L1 + L2
//!   ↓
//! PUBLISH pms:cache:invalidate {"origin":A,"keys":[..],"tags":[..]}
//!   ↓
//! Process B: listener purges keys and tag members from its L1
//! Process A: listener ignores its own event
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::CacheError;
use crate::local::LocalStore;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Message broadcast after a successful invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Identity of the publishing process.
    pub origin: Uuid,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl InvalidationEvent {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.tags.is_empty()
    }
}

/// Outbound side of the broadcast.
#[async_trait]
pub trait InvalidationBus: Send + Sync {
    async fn publish(&self, event: &InvalidationEvent) -> Result<(), CacheError>;
}

pub struct RedisInvalidationBus {
    pool: Pool,
    channel: String,
}

impl RedisInvalidationBus {
    pub fn new(pool: Pool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl InvalidationBus for RedisInvalidationBus {
    async fn publish(&self, event: &InvalidationEvent) -> Result<(), CacheError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| CacheError::serialization(e.to_string()))?;
        let mut conn = self.pool.get().await?;
        conn.publish::<_, _, ()>(&self.channel, payload).await?;
        tracing::debug!(
            channel = %self.channel,
            keys = event.keys.len(),
            tags = event.tags.len(),
            "published cache invalidation"
        );
        Ok(())
    }
}

/// Subscribes to the invalidation channel and purges the local L1 store.
///
/// Reconnects with exponential backoff (1s doubling up to 5 minutes) until
/// the shutdown token fires.
pub struct InvalidationListener {
    pub redis_url: String,
    pub channel: String,
    pub local: Arc<LocalStore>,
    /// Events carrying this origin were already applied locally.
    pub origin: Uuid,
    pub shutdown: CancellationToken,
}

impl InvalidationListener {
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = INITIAL_BACKOFF;
            loop {
                let outcome = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => {
                        tracing::debug!("cache invalidation listener stopped");
                        return;
                    }
                    outcome = self.run() => outcome,
                };

                match outcome {
                    Ok(()) => backoff = INITIAL_BACKOFF,
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            backoff_secs = backoff.as_secs(),
                            "cache invalidation listener error, reconnecting"
                        );
                        tokio::select! {
                            _ = self.shutdown.cancelled() => return,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        })
    }

    async fn run(&self) -> Result<(), CacheError> {
        use futures_util::StreamExt;

        let client = redis::Client::open(self.redis_url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        tracing::info!(channel = %self.channel, "subscribed to cache invalidation channel");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            match msg.get_payload::<String>() {
                Ok(payload) => {
                    self.apply(&payload);
                }
                Err(e) => tracing::warn!(error = %e, "unreadable invalidation payload"),
            }
        }
        Err(CacheError::unavailable("pub/sub connection closed"))
    }

    /// Applies one raw message. Returns the number of L1 entries removed.
    pub fn apply(&self, payload: &str) -> usize {
        let event: InvalidationEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "malformed invalidation event");
                return 0;
            }
        };
        if event.origin == self.origin {
            return 0;
        }
        let removed = self.local.purge(&event.keys, &event.tags);
        tracing::debug!(
            origin = %event.origin,
            removed,
            "applied remote cache invalidation"
        );
        removed
    }
}
