//! Statistics for the two-tier cache

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of cache activity
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered by the memory tier
    pub memory_hits: u64,

    /// Reads answered by the disk tier
    pub disk_hits: u64,

    /// Reads that found nothing in either tier
    pub misses: u64,

    /// Disk hits copied back into the memory tier
    pub promotions: u64,

    /// Disk operations that reported an error
    pub disk_failures: u64,
}

impl CacheStats {
    /// Total number of cache hits across both tiers
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.disk_hits
    }

    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits() as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ memory_hits: {}, disk_hits: {}, misses: {}, hit_rate: {:.2}%, promotions: {}, disk_failures: {} }}",
            self.memory_hits,
            self.disk_hits,
            self.misses,
            self.hit_rate(),
            self.promotions,
            self.disk_failures
        )
    }
}

/// Live counters behind [`CacheStats`]
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub memory_hits: AtomicU64,
    pub disk_hits: AtomicU64,
    pub misses: AtomicU64,
    pub promotions: AtomicU64,
    pub disk_failures: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            disk_failures: self.disk_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            memory_hits: 60,
            disk_hits: 20,
            misses: 20,
            ..Default::default()
        };

        assert_eq!(stats.hits(), 80);
        assert_eq!(stats.hit_rate(), 80.0);
        assert_eq!(stats.miss_rate(), 20.0);
    }

    #[test]
    fn test_cache_stats_zero_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 100.0);
    }

    #[test]
    fn test_cache_stats_display() {
        let stats = CacheStats {
            memory_hits: 100,
            misses: 50,
            ..Default::default()
        };

        let display = format!("{}", stats);
        assert!(display.contains("memory_hits: 100"));
        assert!(display.contains("misses: 50"));
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = StatsCounters::default();
        StatsCounters::bump(&counters.misses);
        StatsCounters::bump(&counters.misses);
        StatsCounters::bump(&counters.promotions);

        let stats = counters.snapshot();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.promotions, 1);
        assert_eq!(stats.memory_hits, 0);
    }
}
