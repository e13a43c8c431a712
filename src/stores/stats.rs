//! Engine Statistics Module
//!
//! Tracks memory engine metrics: hits, misses, evictions and expirations.

use std::ops::AddAssign;

use serde::Serialize;

// == Engine Stats ==
/// Counters kept by the in-memory engine, per collection or aggregated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStats {
    /// Reads that found a live entry
    pub hits: u64,
    /// Reads that found nothing or an expired entry
    pub misses: u64,
    /// Live entries dropped to make room
    pub evictions: u64,
    /// Expired entries removed (on read, on insert or by cull)
    pub expirations: u64,
    /// Entries currently held, expired or not
    pub total_entries: usize,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}

impl AddAssign<&EngineStats> for EngineStats {
    fn add_assign(&mut self, other: &EngineStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.evictions += other.evictions;
        self.expirations += other.expirations;
        self.total_entries += other.total_entries;
    }
}
