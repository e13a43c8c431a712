//! Simple Store Module
//!
//! Flat key-space backend. Every entry is persisted as its verbatim JSON
//! record under the compound key of its (collection, key) pair, the way a
//! document or string backend would store it. Expiration is lazy.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::compound::{
    collections_from_compound_keys, compound_key, keys_from_compound_keys, uncompound_key,
};
use crate::contract::{
    page_limit, resolve_collection, Cull, DestroyCollection, DestroyStore, EnumerateCollections,
    EnumerateKeys, ManagedStore, StoreId, DEFAULT_COLLECTION,
};
use crate::entry::{Clock, ManagedEntry, SystemClock};
use crate::error::Result;

/// Backend storing JSON records in a single flat map.
#[derive(Debug)]
pub struct SimpleStore {
    id: StoreId,
    clock: Arc<dyn Clock>,
    default_collection: String,
    /// Raise on undecodable records instead of treating them as a miss
    strict: bool,
    records: Mutex<BTreeMap<String, String>>,
}

impl SimpleStore {
    pub fn new() -> Self {
        Self {
            id: StoreId::next(),
            clock: Arc::new(SystemClock),
            default_collection: DEFAULT_COLLECTION.to_string(),
            strict: false,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_default_collection(mut self, collection: impl Into<String>) -> Self {
        self.default_collection = collection.into();
        self
    }

    /// Makes undecodable records raise [`crate::error::KvError::Deserialization`].
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Stores a raw record, bypassing entry encoding.
    pub async fn put_raw(&self, collection: &str, key: &str, record: impl Into<String>) {
        let mut records = self.records.lock().await;
        records.insert(compound_key(collection, key), record.into());
    }

    /// Returns the raw record stored for (collection, key).
    pub async fn get_raw(&self, collection: &str, key: &str) -> Option<String> {
        let records = self.records.lock().await;
        records.get(&compound_key(collection, key)).cloned()
    }

    fn decode(&self, compound: &str, record: &str) -> Result<Option<ManagedEntry>> {
        match ManagedEntry::from_json(record) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) if self.strict => Err(e.context(format!("record '{compound}'"))),
            Err(e) => {
                debug!(key = %compound, error = %e, "Ignoring undecodable record");
                Ok(None)
            }
        }
    }

    /// A record counts as live unless it decodes to an expired entry.
    fn is_live(record: &str, now: DateTime<Utc>) -> bool {
        ManagedEntry::from_json(record).map_or(true, |e| !e.is_expired(now))
    }
}

impl Default for SimpleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ManagedStore for SimpleStore {
    fn store_id(&self) -> StoreId {
        self.id
    }

    fn store_name(&self) -> &'static str {
        "SimpleStore"
    }

    fn default_collection(&self) -> &str {
        &self.default_collection
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn get_entry(&self, collection: &str, key: &str) -> Result<Option<ManagedEntry>> {
        let compound = compound_key(collection, key);
        let record = self.records.lock().await.get(&compound).cloned();

        match record {
            Some(record) => self.decode(&compound, &record),
            None => Ok(None),
        }
    }

    async fn put_entry(&self, collection: &str, key: &str, entry: ManagedEntry) -> Result<()> {
        let record = entry.to_json()?;
        let mut records = self.records.lock().await;
        records.insert(compound_key(collection, key), record);
        Ok(())
    }

    async fn delete_entry(&self, collection: &str, key: &str) -> Result<bool> {
        let removed = self
            .records
            .lock()
            .await
            .remove(&compound_key(collection, key));
        let now = self.clock.now();
        Ok(removed.is_some_and(|record| Self::is_live(&record, now)))
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
impl EnumerateKeys for SimpleStore {
    async fn keys(&self, collection: Option<&str>, limit: Option<usize>) -> Result<Vec<String>> {
        let collection = resolve_collection(&self.default_collection, collection)?;
        let now = self.clock.now();
        let records = self.records.lock().await;

        let live = records
            .iter()
            .filter(|(_, record)| Self::is_live(record, now))
            .map(|(k, _)| k.as_str());
        let mut keys = keys_from_compound_keys(live, &collection);
        keys.truncate(page_limit(limit));
        Ok(keys)
    }
}

#[async_trait]
impl EnumerateCollections for SimpleStore {
    async fn collections(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let now = self.clock.now();
        let records = self.records.lock().await;

        let live = records
            .iter()
            .filter(|(_, record)| Self::is_live(record, now))
            .map(|(k, _)| k.as_str());
        let mut collections = collections_from_compound_keys(live);
        collections.sort();
        collections.truncate(page_limit(limit));
        Ok(collections)
    }
}

#[async_trait]
impl DestroyCollection for SimpleStore {
    async fn destroy_collection(&self, collection: &str) -> Result<bool> {
        let collection = resolve_collection(&self.default_collection, Some(collection))?;
        let mut records = self.records.lock().await;

        let doomed: Vec<String> = records
            .keys()
            .filter(|k| uncompound_key(k).is_ok_and(|(c, _)| c == collection))
            .cloned()
            .collect();
        for key in &doomed {
            records.remove(key);
        }
        Ok(!doomed.is_empty())
    }
}

#[async_trait]
impl DestroyStore for SimpleStore {
    async fn destroy(&self) -> Result<bool> {
        self.records.lock().await.clear();
        Ok(true)
    }
}

#[async_trait]
impl Cull for SimpleStore {
    async fn cull(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| Self::is_live(record, now));
        Ok(before - records.len())
    }
}
