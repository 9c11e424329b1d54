//! Process-local cache tier backed by DashMap.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::CacheError;
use crate::store::{CacheStore, Payload, Tier};

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// A cached entry with TTL support.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Payload,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: Payload, ttl: Duration) -> Self {
        Self {
            data,
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// L1 store. All operations are synchronous map accesses, so they never
/// suspend the calling task and never fail.
pub struct LocalStore {
    entries: DashMap<String, CachedEntry>,
    tags: DashMap<String, HashSet<String>>,
    max_entries: usize,
    evictions: AtomicU64,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl LocalStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            tags: DashMap::new(),
            max_entries: max_entries.max(1),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the live payload for `key`, dropping it if expired.
    pub fn get_entry(&self, key: &str) -> Option<Payload> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Some(Arc::clone(&entry.data));
            }
            drop(entry);
            self.evict_if_expired(key);
        }
        None
    }

    /// Removes `key` only if the entry currently stored is expired, so an
    /// entry written since the caller's check survives.
    fn evict_if_expired(&self, key: &str) -> bool {
        self.entries.remove_if(key, |_, entry| entry.is_expired()).is_some()
    }

    /// Inserts or overwrites `key`. Returns `false` when the store is full of
    /// live entries and the insert was skipped.
    pub fn insert(&self, key: &str, value: Payload, ttl: Duration) -> bool {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            let removed = self.cleanup_expired();
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);

            if self.entries.len() >= self.max_entries {
                tracing::warn!(
                    max_entries = self.max_entries,
                    key = %key,
                    "L1 cache at capacity, skipping insertion"
                );
                return false;
            }
        }

        self.entries
            .insert(key.to_string(), CachedEntry::new(value, ttl));
        true
    }

    /// Removes `key`, returning whether an entry was present.
    pub fn remove_key(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn tag(&self, tag: &str, key: &str) {
        self.tags
            .entry(tag.to_string())
            .or_default()
            .insert(key.to_string());
    }

    /// Removes the index for `tag` and returns its member keys.
    pub fn drain_tag(&self, tag: &str) -> Vec<String> {
        self.tags
            .remove(tag)
            .map(|(_, members)| members.into_iter().collect())
            .unwrap_or_default()
    }

    /// Removes every key in `keys`, every member of every tag in `tags`, and
    /// the tag slots themselves. Returns the number of entries dropped.
    pub fn purge(&self, keys: &[String], tags: &[String]) -> usize {
        let mut removed = keys.iter().filter(|key| self.remove_key(key)).count();
        for tag in tags {
            for member in self.drain_tag(tag) {
                if self.remove_key(&member) {
                    removed += 1;
                }
            }
            if self.remove_key(tag) {
                removed += 1;
            }
        }
        removed
    }

    /// Sweeps expired entries and prunes tag members that no longer exist.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());

        self.tags.retain(|_, members| {
            members.retain(|key| self.entries.contains_key(key));
            !members.is_empty()
        });
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.tags.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get_entry(key).is_some()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CacheStore for LocalStore {
    fn tier(&self) -> Tier {
        Tier::L1
    }

    async fn get(&self, key: &str) -> Result<Option<Payload>, CacheError> {
        Ok(self.get_entry(key))
    }

    async fn set(&self, key: &str, value: Payload, ttl: Duration) -> Result<(), CacheError> {
        self.insert(key, value, ttl);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.remove_key(key);
        Ok(())
    }

    async fn add_to_tag(&self, tag: &str, key: &str, _ttl: Duration) -> Result<(), CacheError> {
        self.tag(tag, key);
        Ok(())
    }

    async fn take_tag_members(&self, tag: &str) -> Result<Vec<String>, CacheError> {
        Ok(self.drain_tag(tag))
    }
}
