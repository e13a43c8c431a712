//! Memory Store Module
//!
//! In-process bounded cache engine. Each collection holds at most
//! `max_entries` entries and evicts with a TTL-aware LRU policy (TLRU):
//!
//! - reads drop expired entries and mark live ones most recently used
//! - an insert that needs room first sweeps every expired entry of the
//!   collection, then evicts least recently used entries
//! - never-touched entries leave in insertion order
//!
//! Every operation runs inside one critical section per collection, so the
//! capacity check and the eviction of a put cannot interleave with another
//! operation on the same collection.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::contract::{
    page_limit, resolve_collection, Cull, DestroyCollection, DestroyStore, EnumerateCollections,
    EnumerateKeys, ManagedStore, StoreId, DEFAULT_COLLECTION,
};
use crate::entry::{Clock, ManagedEntry, SystemClock};
use crate::error::{KvError, Result};
use crate::stores::{EngineStats, LruTracker};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Capacity of each collection unless configured otherwise
pub const DEFAULT_MAX_ENTRIES_PER_COLLECTION: usize = 1000;

// == Memory Collection ==
/// One bounded, recency-ordered collection.
#[derive(Debug)]
pub struct MemoryCollection {
    /// Key-entry storage
    entries: HashMap<String, ManagedEntry>,
    /// Recency of every key in `entries`
    lru: LruTracker,
    /// Keys with an expiry, ordered by expiry
    expiry: BTreeSet<(DateTime<Utc>, String)>,
    /// Maximum number of entries
    max_entries: usize,
    stats: EngineStats,
    /// Set once the collection is dropped from its store
    retired: bool,
}

impl MemoryCollection {
    // == Constructor ==
    /// Creates an empty collection. A capacity of zero is raised to one.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            expiry: BTreeSet::new(),
            max_entries: max_entries.max(1),
            stats: EngineStats::new(),
            retired: false,
        }
    }

    // == Get ==
    /// Returns a live entry and marks it most recently used.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<ManagedEntry> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.remove(key);
            self.stats.record_expirations(1);
            self.stats.record_miss();
            return None;
        }

        self.lru.touch(key);
        self.stats.record_hit();
        self.entries.get(key).cloned()
    }

    // == Put ==
    /// Stores an entry, making room first if the collection is full.
    ///
    /// Never fails for lack of capacity.
    pub fn put(&mut self, key: &str, entry: ManagedEntry, now: DateTime<Utc>) {
        if self.remove(key).is_none() && self.entries.len() >= self.max_entries {
            self.make_room(now);
        }

        if let Some(expires_at) = entry.expires_at {
            self.expiry.insert((expires_at, key.to_string()));
        }
        self.entries.insert(key.to_string(), entry);
        self.lru.touch(key);
    }

    /// Frees one slot: expired entries go first, then the least recently used.
    fn make_room(&mut self, now: DateTime<Utc>) {
        let swept = self.remove_expired(now);
        if swept > 0 {
            debug!(swept, "Swept expired entries to make room");
        }

        while self.entries.len() >= self.max_entries {
            let Some(victim) = self.lru.evict_oldest() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&victim) {
                if let Some(expires_at) = entry.expires_at {
                    self.expiry.remove(&(expires_at, victim.clone()));
                }
            }
            self.stats.record_eviction();
            debug!(key = %victim, "Evicted least recently used entry");
        }
    }

    // == Delete ==
    /// Removes an entry. Returns true if it was live.
    pub fn delete(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        match self.remove(key) {
            Some(entry) if entry.is_expired(now) => {
                self.stats.record_expirations(1);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn remove(&mut self, key: &str) -> Option<ManagedEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        if let Some(expires_at) = entry.expires_at {
            self.expiry.remove(&(expires_at, key.to_string()));
        }
        Some(entry)
    }

    // == Remove Expired ==
    /// Removes every expired entry. Returns the number removed.
    pub fn remove_expired(&mut self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        while let Some((expires_at, _)) = self.expiry.first() {
            if *expires_at > now {
                break;
            }
            let Some((_, key)) = self.expiry.pop_first() else {
                break;
            };
            self.entries.remove(&key);
            self.lru.remove(&key);
            removed += 1;
        }
        self.stats.record_expirations(removed);
        removed
    }

    /// Live keys, least recently used first. Does not affect recency.
    pub fn keys(&self, limit: usize, now: DateTime<Utc>) -> Vec<String> {
        self.lru
            .iter_oldest_first()
            .filter(|k| self.entries.get(*k).is_some_and(|e| !e.is_expired(now)))
            .take(limit)
            .map(str::to_string)
            .collect()
    }

    /// Number of live entries.
    pub fn live_len(&self, now: DateTime<Utc>) -> usize {
        self.entries.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Number of held entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.lru.clear();
        self.expiry.clear();
        count
    }

    /// Clears the collection and marks it as no longer reachable from its store.
    pub fn retire(&mut self) -> usize {
        self.retired = true;
        self.clear()
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn stats(&self) -> EngineStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }
}

// == Memory Store ==
/// Bounded TLRU store keeping every collection in process memory.
#[derive(Debug)]
pub struct MemoryStore {
    id: StoreId,
    clock: Arc<dyn Clock>,
    default_collection: String,
    max_entries_per_collection: usize,
    collections: RwLock<HashMap<String, Arc<Mutex<MemoryCollection>>>>,
    /// Counters of destroyed collections and of reads on unknown collections
    retired_stats: Mutex<EngineStats>,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a store whose collections each hold at most `max_entries_per_collection`.
    pub fn new(max_entries_per_collection: usize) -> Self {
        Self {
            id: StoreId::next(),
            clock: Arc::new(SystemClock),
            default_collection: DEFAULT_COLLECTION.to_string(),
            max_entries_per_collection: max_entries_per_collection.max(1),
            collections: RwLock::new(HashMap::new()),
            retired_stats: Mutex::new(EngineStats::new()),
        }
    }

    /// Uses `clock` for entry creation and expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Uses `collection` when callers do not name one.
    pub fn with_default_collection(mut self, collection: impl Into<String>) -> Self {
        self.default_collection = collection.into();
        self
    }

    pub fn max_entries_per_collection(&self) -> usize {
        self.max_entries_per_collection
    }

    async fn collection(&self, name: &str) -> Arc<Mutex<MemoryCollection>> {
        if let Some(existing) = self.collections.read().await.get(name) {
            return existing.clone();
        }

        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(MemoryCollection::new(
                    self.max_entries_per_collection,
                )))
            })
            .clone()
    }

    async fn existing_collection(&self, name: &str) -> Option<Arc<Mutex<MemoryCollection>>> {
        self.collections.read().await.get(name).cloned()
    }

    /// Runs a write against the live collection named `name`, creating it if needed.
    ///
    /// A collection retired between lookup and lock is looked up again.
    async fn write_collection<R>(
        &self,
        name: &str,
        mut write: impl FnMut(&mut MemoryCollection, DateTime<Utc>) -> R,
    ) -> R {
        loop {
            let coll = self.collection(name).await;
            let mut coll = coll.lock().await;
            if coll.is_retired() {
                continue;
            }
            return write(&mut *coll, self.clock.now());
        }
    }

    async fn record_misses(&self, count: usize) {
        let mut retired = self.retired_stats.lock().await;
        for _ in 0..count {
            retired.record_miss();
        }
    }

    /// Drops collections from the map, keeping their counters.
    async fn retire_collections(&self, removed: Vec<Arc<Mutex<MemoryCollection>>>) -> usize {
        let mut cleared = 0;
        for coll in removed {
            let mut coll = coll.lock().await;
            cleared += coll.retire();
            *self.retired_stats.lock().await += &coll.stats();
        }
        cleared
    }

    #[cfg(test)]
    async fn collection_count(&self) -> usize {
        self.collections.read().await.len()
    }

    async fn all_collections(&self) -> Vec<(String, Arc<Mutex<MemoryCollection>>)> {
        let collections = self.collections.read().await;
        let mut all: Vec<_> = collections
            .iter()
            .map(|(name, coll)| (name.clone(), coll.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    // == Stats ==
    /// Returns engine statistics aggregated over every collection.
    pub async fn stats(&self) -> EngineStats {
        let mut total = self.retired_stats.lock().await.clone();
        for (_, coll) in self.all_collections().await {
            total += &coll.lock().await.stats();
        }
        total
    }

    /// Returns engine statistics of one collection.
    pub async fn collection_stats(&self, collection: &str) -> EngineStats {
        match self.existing_collection(collection).await {
            Some(coll) => coll.lock().await.stats(),
            None => EngineStats::new(),
        }
    }

    /// Number of entries held in a collection, expired or not.
    pub async fn len(&self, collection: &str) -> usize {
        match self.existing_collection(collection).await {
            Some(coll) => coll.lock().await.len(),
            None => 0,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES_PER_COLLECTION)
    }
}

fn check_key_length(key: &str) -> Result<()> {
    if key.len() > MAX_KEY_LENGTH {
        return Err(KvError::InvalidKey(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

#[async_trait]
impl ManagedStore for MemoryStore {
    fn store_id(&self) -> StoreId {
        self.id
    }

    fn store_name(&self) -> &'static str {
        "MemoryStore"
    }

    fn default_collection(&self) -> &str {
        &self.default_collection
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn get_entry(&self, collection: &str, key: &str) -> Result<Option<ManagedEntry>> {
        let Some(coll) = self.existing_collection(collection).await else {
            self.record_misses(1).await;
            return Ok(None);
        };
        let now = self.clock.now();
        let mut coll = coll.lock().await;
        Ok(coll.get(key, now))
    }

    async fn get_entries(
        &self,
        collection: &str,
        keys: &[String],
    ) -> Result<Vec<Option<ManagedEntry>>> {
        let Some(coll) = self.existing_collection(collection).await else {
            self.record_misses(keys.len()).await;
            return Ok(vec![None; keys.len()]);
        };
        let now = self.clock.now();
        let mut coll = coll.lock().await;
        Ok(keys.iter().map(|key| coll.get(key, now)).collect())
    }

    async fn put_entry(&self, collection: &str, key: &str, entry: ManagedEntry) -> Result<()> {
        check_key_length(key)?;

        let mut entry = Some(entry);
        self.write_collection(collection, |coll, now| {
            if let Some(entry) = entry.take() {
                coll.put(key, entry, now);
            }
        })
        .await;
        Ok(())
    }

    async fn put_entries(
        &self,
        collection: &str,
        keys: &[String],
        entries: Vec<ManagedEntry>,
    ) -> Result<()> {
        keys.iter().try_for_each(|k| check_key_length(k))?;

        let mut entries = Some(entries);
        self.write_collection(collection, |coll, now| {
            for (key, entry) in keys.iter().zip(entries.take().unwrap_or_default()) {
                coll.put(key, entry, now);
            }
        })
        .await;
        Ok(())
    }

    async fn delete_entry(&self, collection: &str, key: &str) -> Result<bool> {
        let Some(coll) = self.existing_collection(collection).await else {
            return Ok(false);
        };
        let now = self.clock.now();
        let deleted = coll.lock().await.delete(key, now);
        Ok(deleted)
    }

    async fn delete_entries(&self, collection: &str, keys: &[String]) -> Result<usize> {
        let Some(coll) = self.existing_collection(collection).await else {
            return Ok(0);
        };
        let now = self.clock.now();
        let mut coll = coll.lock().await;
        Ok(keys.iter().filter(|key| coll.delete(key, now)).count())
    }

    fn enumerate_keys_capability(&self) -> Option<&dyn EnumerateKeys> {
        Some(self)
    }

    fn enumerate_collections_capability(&self) -> Option<&dyn EnumerateCollections> {
        Some(self)
    }

    fn destroy_store_capability(&self) -> Option<&dyn DestroyStore> {
        Some(self)
    }

    fn destroy_collection_capability(&self) -> Option<&dyn DestroyCollection> {
        Some(self)
    }

    fn cull_capability(&self) -> Option<&dyn Cull> {
        Some(self)
    }
}

#[async_trait]
impl EnumerateKeys for MemoryStore {
    async fn keys(&self, collection: Option<&str>, limit: Option<usize>) -> Result<Vec<String>> {
        let collection = resolve_collection(&self.default_collection, collection)?;
        let Some(coll) = self.existing_collection(&collection).await else {
            return Ok(Vec::new());
        };
        let now = self.clock.now();
        let keys = coll.lock().await.keys(page_limit(limit), now);
        Ok(keys)
    }
}

#[async_trait]
impl EnumerateCollections for MemoryStore {
    /// Collections with at least one live entry, sorted by name.
    async fn collections(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let limit = page_limit(limit);
        let now = self.clock.now();
        let mut names = Vec::new();
        for (name, coll) in self.all_collections().await {
            if names.len() >= limit {
                break;
            }
            if coll.lock().await.live_len(now) > 0 {
                names.push(name);
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl DestroyCollection for MemoryStore {
    async fn destroy_collection(&self, collection: &str) -> Result<bool> {
        let collection = resolve_collection(&self.default_collection, Some(collection))?;
        let removed = self.collections.write().await.remove(&collection);
        match removed {
            Some(coll) => Ok(self.retire_collections(vec![coll]).await > 0),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl DestroyStore for MemoryStore {
    async fn destroy(&self) -> Result<bool> {
        let removed: Vec<_> = self
            .collections
            .write()
            .await
            .drain()
            .map(|(_, coll)| coll)
            .collect();
        self.retire_collections(removed).await;
        Ok(true)
    }
}

#[async_trait]
impl Cull for MemoryStore {
    async fn cull(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut removed = 0;
        for (name, coll) in self.all_collections().await {
            let count = coll.lock().await.remove_expired(now);
            if count > 0 {
                debug!(collection = %name, count, "Culled expired entries");
            }
            removed += count;
        }
        Ok(removed)
    }
}
