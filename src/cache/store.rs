//! Cache Store Module
//!
//! Per-shard cache engine combining a hash index with an index-based LRU
//! list, byte-budget accounting and TTL expiration.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::cache::{CacheEntry, CacheStats, LruList};
use crate::error::{CacheError, Result};

/// Progress of one bounded sweep step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepStep {
    /// Entries removed in this step
    pub removed: usize,
    /// Slot to resume from, or None once the whole slot array was visited
    pub next: Option<usize>,
}

// == Cache Store ==
/// One shard's partition of the keyspace.
///
/// Exactly one core owns a store; it is never shared across threads.
#[derive(Debug)]
pub struct CacheStore {
    shard_id: usize,
    /// Key -> slot in `lru`
    index: FxHashMap<Vec<u8>, usize>,
    lru: LruList<CacheEntry>,
    stats: CacheStats,
    memory_used: usize,
    memory_budget: usize,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store holding at most `memory_budget` value bytes.
    pub fn new(shard_id: usize, memory_budget: usize) -> Self {
        Self {
            shard_id,
            index: FxHashMap::default(),
            lru: LruList::new(),
            stats: CacheStats::new(memory_budget),
            memory_used: 0,
            memory_budget,
        }
    }

    // == Put ==
    /// Stores a key-value pair with optional TTL.
    ///
    /// An existing key is updated in place, its TTL reset, and moved to the
    /// most recent position. Afterwards least recently used entries are
    /// evicted until the shard fits its budget again. A value larger than
    /// the whole budget is rejected without touching the shard.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.put_at(key, value, ttl, Instant::now())
    }

    pub fn put_at(
        &mut self,
        key: Vec<u8>,
        value: Vec<u8>,
        ttl: Option<Duration>,
        now: Instant,
    ) -> Result<()> {
        if value.len() > self.memory_budget {
            return Err(CacheError::ValueTooLarge {
                size: value.len(),
                budget: self.memory_budget,
            });
        }

        let size = value.len();
        match self.index.get(&key).copied() {
            Some(idx) => {
                if let Some(entry) = self.lru.get_mut(idx) {
                    let previous = entry.replace(value, ttl, now);
                    self.memory_used = self.memory_used - previous + size;
                }
                self.lru.move_to_front(idx);
            }
            None => {
                let entry = CacheEntry::new(self.shard_id, key.clone(), value, ttl, now);
                let idx = self.lru.push_front(entry);
                self.index.insert(key, idx);
                self.memory_used += size;
            }
        }

        self.evict_to_budget();
        Ok(())
    }

    fn evict_to_budget(&mut self) {
        // The newest entry sits at the head and fits the budget alone,
        // so it is never the one popped here.
        while self.memory_used > self.memory_budget {
            match self.lru.pop_back() {
                Some(evicted) => {
                    self.index.remove(&evicted.key);
                    self.memory_used -= evicted.size_bytes;
                    self.stats.record_eviction();
                }
                None => break,
            }
        }
    }

    // == Get ==
    /// Retrieves a copy of the value and marks the key most recently used.
    ///
    /// An entry found expired is removed and reported as `NotFound`.
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&mut self, key: &[u8], now: Instant) -> Result<Vec<u8>> {
        let Some(idx) = self.index.get(key).copied() else {
            self.stats.record_miss();
            return Err(CacheError::NotFound);
        };

        let expired = self
            .lru
            .get(idx)
            .map_or(true, |entry| entry.is_expired_at(now));
        if expired {
            self.remove_slot(idx);
            self.stats.record_expiration();
            self.stats.record_miss();
            return Err(CacheError::NotFound);
        }

        self.lru.move_to_front(idx);
        self.stats.record_hit();
        self.lru
            .get(idx)
            .map(|entry| entry.value.clone())
            .ok_or(CacheError::NotFound)
    }

    // == Delete ==
    /// Removes an entry by key. Deleting an absent key reports `NotFound`
    /// and leaves the shard untouched.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        match self.index.get(key).copied() {
            Some(idx) => {
                self.remove_slot(idx);
                Ok(())
            }
            None => Err(CacheError::NotFound),
        }
    }

    fn remove_slot(&mut self, idx: usize) -> Option<CacheEntry> {
        let entry = self.lru.remove(idx)?;
        self.index.remove(&entry.key);
        self.memory_used -= entry.size_bytes;
        Some(entry)
    }

    // == Sweep Step ==
    /// Inspects at most `batch` slots starting at `cursor`, removing expired
    /// entries. Callers yield between steps and resume from `next`.
    pub fn sweep_step(&mut self, cursor: usize, batch: usize, now: Instant) -> SweepStep {
        let end = cursor.saturating_add(batch.max(1)).min(self.lru.slot_count());
        let mut removed = 0;

        for idx in cursor..end {
            let expired = self
                .lru
                .get(idx)
                .is_some_and(|entry| entry.is_expired_at(now));
            if expired && self.remove_slot(idx).is_some() {
                self.stats.record_expiration();
                removed += 1;
            }
        }

        SweepStep {
            removed,
            next: (end < self.lru.slot_count()).then_some(end),
        }
    }

    // == Cleanup Expired ==
    /// Removes all expired entries in one pass. Returns the number removed.
    pub fn cleanup_expired(&mut self, now: Instant) -> usize {
        let mut cursor = 0;
        let mut removed = 0;
        loop {
            let step = self.sweep_step(cursor, usize::MAX, now);
            removed += step.removed;
            match step.next {
                Some(next) => cursor = next,
                None => return removed,
            }
        }
    }

    // == Stats ==
    /// Returns current shard statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.total_entries = self.index.len();
        stats.memory_used = self.memory_used;
        stats
    }

    pub fn shard_id(&self) -> usize {
        self.shard_id
    }

    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    pub fn memory_budget(&self) -> usize {
        self.memory_budget
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<Vec<u8>> {
        self.lru.iter().map(|entry| entry.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
