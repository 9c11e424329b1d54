//! Cache counters.
//!
//! Every event is counted twice: in process-local atomics, which back the
//! `/api/cache/stats` snapshot, and through the `metrics` facade for the
//! Prometheus exporter.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use serde::Serialize;

use crate::store::Tier;

pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "pms_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "pms_cache_misses_total";
    pub const CACHE_BYPASSES_TOTAL: &str = "pms_cache_bypasses_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "pms_cache_invalidations_total";
    pub const CACHE_BACKEND_ERRORS_TOTAL: &str = "pms_cache_backend_errors_total";
}

#[derive(Debug, Default)]
pub struct CacheStats {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    promotions: AtomicU64,
    bypasses: AtomicU64,
    invalidated_keys: AtomicU64,
    backend_errors: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, tier: Tier) {
        match tier {
            Tier::L1 => self.l1_hits.fetch_add(1, Ordering::Relaxed),
            Tier::L2 => self.l2_hits.fetch_add(1, Ordering::Relaxed),
        };
        counter!(names::CACHE_HITS_TOTAL, "tier" => tier.as_str()).increment(1);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(names::CACHE_MISSES_TOTAL).increment(1);
    }

    /// An L2 hit copied into L1.
    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bypass(&self) {
        self.bypasses.fetch_add(1, Ordering::Relaxed);
        counter!(names::CACHE_BYPASSES_TOTAL).increment(1);
    }

    pub fn record_invalidation(&self, keys: usize) {
        self.invalidated_keys
            .fetch_add(keys as u64, Ordering::Relaxed);
        counter!(names::CACHE_INVALIDATIONS_TOTAL).increment(keys as u64);
    }

    pub fn record_backend_error(&self, tier: Tier) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
        counter!(names::CACHE_BACKEND_ERRORS_TOTAL, "tier" => tier.as_str()).increment(1);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let l1_hits = self.l1_hits.load(Ordering::Relaxed);
        let l2_hits = self.l2_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStatsSnapshot {
            l1_hits,
            l2_hits,
            misses,
            promotions: self.promotions.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            invalidated_keys: self.invalidated_keys.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            hit_rate: hit_rate(l1_hits + l2_hits, misses),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsSnapshot {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub promotions: u64,
    pub bypasses: u64,
    pub invalidated_keys: u64,
    pub backend_errors: u64,
    /// Percentage of lookups served from either tier.
    pub hit_rate: f64,
}

impl CacheStatsSnapshot {
    pub fn hits(&self) -> u64 {
        self.l1_hits + self.l2_hits
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        (hits as f64 / total as f64) * 100.0
    }
}
