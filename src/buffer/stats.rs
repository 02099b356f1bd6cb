//! Buffer pool statistics: plain counters, since the engine is
//! single-threaded cooperative and atomics buy nothing here. Used to
//! instrument index-accelerated scans against full scans (spec §8 scenario
//! 4: a range query using an index must fetch fewer pages than a full
//! table scan).

use std::cell::Cell;
use std::fmt;

#[derive(Debug, Default)]
pub struct BufferPoolStats {
    pub cache_hits: Cell<u64>,
    pub cache_misses: Cell<u64>,
    pub evictions: Cell<u64>,
}

impl BufferPoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.cache_hits.set(self.cache_hits.get() + 1);
    }

    pub fn record_miss(&self) {
        self.cache_misses.set(self.cache_misses.get() + 1);
    }

    pub fn record_eviction(&self) {
        self.evictions.set(self.evictions.get() + 1);
    }

    /// Total page fetches (hits + misses), the quantity scenario 4's
    /// "fewer page fetches than a full scan" check instruments.
    pub fn fetches(&self) -> u64 {
        self.cache_hits.get() + self.cache_misses.get()
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.fetches();
        if total == 0 {
            0.0
        } else {
            self.cache_hits.get() as f64 / total as f64
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.get(),
            cache_misses: self.cache_misses.get(),
            evictions: self.evictions.get(),
        }
    }

    pub fn reset(&self) {
        self.cache_hits.set(0);
        self.cache_misses.set(0);
        self.evictions.set(0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
}

impl StatsSnapshot {
    pub fn fetches(&self) -> u64 {
        self.cache_hits + self.cache_misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.fetches();
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ hits: {}, misses: {}, evictions: {}, hit_rate: {:.2}% }}",
            self.cache_hits,
            self.cache_misses,
            self.evictions,
            self.hit_rate() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_tracks_ratio() {
        let stats = BufferPoolStats::new();
        for _ in 0..7 {
            stats.record_hit();
        }
        for _ in 0..3 {
            stats.record_miss();
        }
        assert_eq!(stats.fetches(), 10);
        assert_eq!(stats.hit_rate(), 0.7);
    }

    #[test]
    fn snapshot_and_reset() {
        let stats = BufferPoolStats::new();
        stats.record_hit();
        stats.record_eviction();
        let snap = stats.snapshot();
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.evictions, 1);

        stats.reset();
        assert_eq!(stats.fetches(), 0);
    }

    #[test]
    fn display_contains_percentage() {
        let stats = BufferPoolStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        let display = format!("{}", stats.snapshot());
        assert!(display.contains("hits: 2"));
        assert!(display.contains("misses: 1"));
    }
}
