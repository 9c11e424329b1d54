//! Invalidate-on-write stage for mutating requests.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::descriptor::Invalidating;
use crate::error::DispatchError;
use crate::pubsub::InvalidationEvent;
use crate::store::{CacheStore, Tier};
use crate::tiered::TieredCache;

pub struct InvalidationCoordinator {
    cache: Arc<TieredCache>,
}

impl InvalidationCoordinator {
    pub fn new(cache: Arc<TieredCache>) -> Self {
        Self { cache }
    }

    /// Awaits `next` and, only if it succeeds, purges the declared keys and
    /// tags.
    ///
    /// Order: L2 keys, then L2 tags, then local L1, then the broadcast to
    /// other processes. Each removal is best-effort. A cancellation after the
    /// mutation committed abandons the remaining L2 removals and the broadcast
    /// but still purges L1 and returns the mutation's result; the skipped L2
    /// entries expire by TTL.
    pub async fn run<T, E, F>(
        &self,
        descriptor: &dyn Invalidating,
        cancel: &CancellationToken,
        next: F,
    ) -> Result<T, DispatchError<E>>
    where
        T: Send,
        F: Future<Output = Result<T, DispatchError<E>>> + Send,
    {
        let response = next.await?;

        if !self.cache.is_enabled() {
            return Ok(response);
        }
        let keys = descriptor.cache_keys();
        let tags = descriptor.cache_tags();
        if keys.is_empty() && tags.is_empty() {
            return Ok(response);
        }

        let mut cancelled = false;
        if let Some(l2) = self.cache.l2() {
            let purge = purge_shared(l2.as_ref(), &self.cache, &keys, &tags);
            if cancellable(cancel, purge).await.is_err() {
                tracing::warn!(
                    keys = ?keys,
                    tags = ?tags,
                    "cancelled during L2 invalidation, stale entries expire by TTL"
                );
                cancelled = true;
            }
        }

        // L1 last: reads during the L2 purge may have promoted stale L2 values.
        let removed = self.cache.l1().purge(&keys, &tags);
        self.cache.stats().record_invalidation(removed);
        tracing::debug!(
            keys = ?keys,
            tags = ?tags,
            removed,
            "cache invalidated (L1)"
        );
        if cancelled {
            return Ok(response);
        }

        if let Some(bus) = self.cache.bus() {
            let event = InvalidationEvent {
                origin: self.cache.origin(),
                keys,
                tags,
            };
            match cancellable(cancel, bus.publish(&event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "failed to publish cache invalidation"),
                Err(_) => tracing::debug!("cancelled before invalidation broadcast"),
            }
        }

        Ok(response)
    }
}

/// Keys first, then tags. Each tag's members are removed, followed by the
/// tag slot itself in case the tag name is also a cached key.
async fn purge_shared(l2: &dyn CacheStore, cache: &TieredCache, keys: &[String], tags: &[String]) {
    let stats = cache.stats();

    for key in keys {
        if let Err(e) = l2.remove(key).await {
            tracing::warn!(key = %key, error = %e, "L2 key invalidation failed");
            stats.record_backend_error(Tier::L2);
        }
    }

    for tag in tags {
        match l2.take_tag_members(tag).await {
            Ok(members) => {
                for member in &members {
                    if let Err(e) = l2.remove(member).await {
                        tracing::warn!(key = %member, tag = %tag, error = %e, "L2 tag member invalidation failed");
                        stats.record_backend_error(Tier::L2);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(tag = %tag, error = %e, "L2 tag lookup failed");
                stats.record_backend_error(Tier::L2);
            }
        }
        if let Err(e) = l2.remove(tag).await {
            tracing::warn!(tag = %tag, error = %e, "L2 tag invalidation failed");
            stats.record_backend_error(Tier::L2);
        }
    }

    tracing::debug!(keys = keys.len(), tags = tags.len(), "cache invalidated (L2)");
}
