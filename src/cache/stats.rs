//! Hit/miss counters for diagnostics (`/cachestats`).
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    evicted: AtomicU64,
}

/// Point-in-time copy of a cache's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    /// Lookups that started a retrieval.
    pub misses: u64,
    /// Lookups that joined a retrieval already in flight.
    pub coalesced: u64,
    /// Entries dropped by the sweeper.
    pub evicted: u64,
}

impl CacheStats {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self, n: usize) {
        self.evicted.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

impl CacheStatsSnapshot {
    /// Share of lookups answered without a new retrieval, in percent.
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.coalesced;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 * 100.0 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_counts_coalesced_lookups_as_served() {
        let snap = CacheStatsSnapshot {
            hits: 2,
            misses: 1,
            coalesced: 1,
            evicted: 0,
        };
        assert!((snap.hit_rate() - 75.0).abs() < f64::EPSILON);
        assert_eq!(CacheStatsSnapshot::default().hit_rate(), 0.0);
    }
}
