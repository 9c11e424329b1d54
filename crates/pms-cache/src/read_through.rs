//! Read-through stage for cacheable requests.
//!
//! ```text
//! request → L1 → L2 → handler
//!            ↓     ↓       ↓
//!          return promote  store in L1 + L2
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::codec::{decode, encode};
use crate::descriptor::Cacheable;
use crate::error::DispatchError;
use crate::store::{Payload, Tier};
use crate::tiered::TieredCache;

pub struct ReadThroughCoordinator {
    cache: Arc<TieredCache>,
}

impl ReadThroughCoordinator {
    pub fn new(cache: Arc<TieredCache>) -> Self {
        Self { cache }
    }

    /// Serves `descriptor` from cache, or awaits `next` and caches its result.
    ///
    /// `next` is only polled on a miss. Handler errors propagate unchanged and
    /// are never cached. Cache failures are logged and treated as misses.
    pub async fn run<T, E, F>(
        &self,
        descriptor: &dyn Cacheable,
        cancel: &CancellationToken,
        next: F,
    ) -> Result<T, DispatchError<E>>
    where
        T: Serialize + DeserializeOwned + Send,
        F: Future<Output = Result<T, DispatchError<E>>> + Send,
    {
        let key = descriptor.cache_key();
        let ttl = match descriptor.cache_duration().as_ttl() {
            Some(ttl) if !key.is_empty() && self.cache.is_enabled() => ttl,
            _ => {
                self.cache.stats().record_bypass();
                tracing::trace!(key = %key, "cache bypassed");
                return next.await;
            }
        };
        let stats = self.cache.stats();

        if let Some(payload) = self.cache.l1().get_entry(&key) {
            match decode::<T>(&payload) {
                Ok(value) => {
                    tracing::debug!(key = %key, "cache hit (L1)");
                    stats.record_hit(Tier::L1);
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "undecodable L1 entry, evicting");
                    self.cache.l1().remove_key(&key);
                }
            }
        }

        if let Some(l2) = self.cache.l2() {
            match cancellable(cancel, l2.get(&key)).await? {
                Ok(Some(payload)) => match decode::<T>(&payload) {
                    Ok(value) => {
                        tracing::debug!(key = %key, "cache hit (L2)");
                        stats.record_hit(Tier::L2);
                        self.promote(&key, descriptor, payload, ttl);
                        return Ok(value);
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "undecodable L2 entry, recomputing");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "L2 lookup failed, treating as miss");
                    stats.record_backend_error(Tier::L2);
                }
            }
        }

        tracing::debug!(key = %key, "cache miss");
        stats.record_miss();
        let value = next.await?;

        match encode(&value) {
            Ok(payload) => self.store(&key, descriptor, payload, ttl, cancel).await,
            Err(e) => tracing::warn!(key = %key, error = %e, "result not cacheable"),
        }
        Ok(value)
    }

    fn promote(&self, key: &str, descriptor: &dyn Cacheable, payload: Payload, ttl: Duration) {
        let l1 = self.cache.l1();
        for tag in descriptor.cache_tags() {
            l1.tag(&tag, key);
        }
        if l1.insert(key, payload, ttl) {
            self.cache.stats().record_promotion();
        }
    }

    /// Tags are registered before the entry is written. A tag invalidation
    /// that drains the tag between those two steps leaves the entry written
    /// but untagged, so it lives until its TTL expires.
    async fn store(
        &self,
        key: &str,
        descriptor: &dyn Cacheable,
        payload: Payload,
        ttl: Duration,
        cancel: &CancellationToken,
    ) {
        let tags = descriptor.cache_tags();
        let l1 = self.cache.l1();
        for tag in &tags {
            l1.tag(tag, key);
        }
        l1.insert(key, Arc::clone(&payload), ttl);

        let Some(l2) = self.cache.l2() else {
            return;
        };
        let stats = self.cache.stats();
        let write = async {
            for tag in &tags {
                if let Err(e) = l2.add_to_tag(tag, key, ttl).await {
                    tracing::warn!(key = %key, tag = %tag, error = %e, "L2 tag registration failed");
                    stats.record_backend_error(Tier::L2);
                    return;
                }
            }
            if let Err(e) = l2.set(key, payload, ttl).await {
                tracing::warn!(key = %key, error = %e, "L2 write failed");
                stats.record_backend_error(Tier::L2);
            }
        };
        if cancellable(cancel, write).await.is_err() {
            tracing::debug!(key = %key, "cancelled before L2 write");
        }
    }
}
