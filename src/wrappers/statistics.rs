//! Statistics Wrapper
//!
//! Counts operations per collection, with hit/miss outcomes for reads and
//! deletes. Purely observational: requests and responses pass through as is,
//! and failed calls are not counted.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::contract::{KeyValue, StoreId, TtlInfo, DEFAULT_COLLECTION};
use crate::entry::{BatchTtl, Document};
use crate::error::Result;

// == Statistics Types ==
/// Counters for one operation kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationStats {
    pub count: u64,
    pub hits: u64,
    pub misses: u64,
}

impl OperationStats {
    fn record(&mut self, n: usize) {
        self.count += n as u64;
    }

    fn record_outcomes(&mut self, hits: usize, misses: usize) {
        self.count += (hits + misses) as u64;
        self.hits += hits as u64;
        self.misses += misses as u64;
    }
}

/// Counters for one collection. `put` only tracks `count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionStatistics {
    pub get: OperationStats,
    pub ttl: OperationStats,
    pub put: OperationStats,
    pub delete: OperationStats,
}

/// Counters for every collection seen so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStatistics {
    pub collections: BTreeMap<String, CollectionStatistics>,
}

impl StoreStatistics {
    pub fn collection(&self, name: &str) -> Option<&CollectionStatistics> {
        self.collections.get(name)
    }
}

pub struct StatisticsWrapper {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    statistics: Mutex<StoreStatistics>,
    /// Label for calls that name no collection
    default_collection: String,
}

impl StatisticsWrapper {
    pub fn new(inner: Arc<dyn KeyValue>) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            statistics: Mutex::new(StoreStatistics::default()),
            default_collection: DEFAULT_COLLECTION.to_string(),
        }
    }

    /// Files calls without a collection under `collection`.
    ///
    /// Should match the default collection of the wrapped store.
    pub fn with_default_collection(mut self, collection: impl Into<String>) -> Self {
        self.default_collection = collection.into();
        self
    }

    /// Returns a snapshot of the counters.
    pub async fn statistics(&self) -> StoreStatistics {
        self.statistics.lock().await.clone()
    }

    async fn update<F>(&self, collection: Option<&str>, f: F)
    where
        F: FnOnce(&mut CollectionStatistics) + Send,
    {
        let name = collection.unwrap_or(&self.default_collection);
        let mut statistics = self.statistics.lock().await;
        f(statistics.collections.entry(name.to_string()).or_default());
    }
}

fn outcomes<T>(results: &[Option<T>]) -> (usize, usize) {
    let hits = results.iter().filter(|r| r.is_some()).count();
    (hits, results.len() - hits)
}

#[async_trait]
impl KeyValue for StatisticsWrapper {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        let value = self.inner.get(key, collection).await?;
        let hit = value.is_some() as usize;
        self.update(collection, |s| s.get.record_outcomes(hit, 1 - hit))
            .await;
        Ok(value)
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        let values = self.inner.get_many(keys, collection).await?;
        let (hits, misses) = outcomes(&values);
        self.update(collection, |s| s.get.record_outcomes(hits, misses))
            .await;
        Ok(values)
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        let info = self.inner.ttl(key, collection).await?;
        let hit = info.0.is_some() as usize;
        self.update(collection, |s| s.ttl.record_outcomes(hit, 1 - hit))
            .await;
        Ok(info)
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        let infos = self.inner.ttl_many(keys, collection).await?;
        let hits = infos.iter().filter(|(v, _)| v.is_some()).count();
        let misses = infos.len() - hits;
        self.update(collection, |s| s.ttl.record_outcomes(hits, misses))
            .await;
        Ok(infos)
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        self.inner.put(key, value, collection, ttl).await?;
        self.update(collection, |s| s.put.record(1)).await;
        Ok(())
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        self.inner.put_many(keys, values, collection, ttl).await?;
        let n = keys.len();
        self.update(collection, |s| s.put.record(n)).await;
        Ok(())
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        let deleted = self.inner.delete(key, collection).await?;
        let hit = deleted as usize;
        self.update(collection, |s| s.delete.record_outcomes(hit, 1 - hit))
            .await;
        Ok(deleted)
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        let deleted = self.inner.delete_many(keys, collection).await?;
        let misses = keys.len().saturating_sub(deleted);
        self.update(collection, |s| s.delete.record_outcomes(deleted, misses))
            .await;
        Ok(deleted)
    }

    wrapper_identity!("StatisticsWrapper", inner);
    forward_capabilities!(inner);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::wrappers::testing::{doc, keys, memory, FlakyStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_counts_per_collection() {
        let (store, _) = memory();
        let stats = StatisticsWrapper::new(store);

        stats.put("a", doc(json!({})), Some("users"), None).await.unwrap();
        stats.get("a", Some("users")).await.unwrap();
        stats.get("b", Some("users")).await.unwrap();
        stats.ttl("a", Some("users")).await.unwrap();
        stats.delete("a", Some("users")).await.unwrap();
        stats.delete("a", Some("users")).await.unwrap();
        stats.get("x", None).await.unwrap();

        let snapshot = stats.statistics().await;
        let users = snapshot.collection("users").unwrap();
        assert_eq!(users.get, OperationStats { count: 2, hits: 1, misses: 1 });
        assert_eq!(users.ttl, OperationStats { count: 1, hits: 1, misses: 0 });
        assert_eq!(users.put.count, 1);
        assert_eq!(users.delete, OperationStats { count: 2, hits: 1, misses: 1 });

        let default = snapshot.collection(DEFAULT_COLLECTION).unwrap();
        assert_eq!(default.get.misses, 1);
    }

    #[tokio::test]
    async fn test_bulk_counts() {
        let (store, _) = memory();
        let stats = StatisticsWrapper::new(store);

        stats
            .put_many(
                &keys(&["a", "b"]),
                vec![doc(json!({})), doc(json!({}))],
                None,
                BatchTtl::default(),
            )
            .await
            .unwrap();
        stats.get_many(&keys(&["a", "b", "c"]), None).await.unwrap();
        stats.ttl_many(&keys(&["c"]), None).await.unwrap();
        stats.delete_many(&keys(&["a", "c"]), None).await.unwrap();

        let snapshot = stats.statistics().await;
        let coll = snapshot.collection(DEFAULT_COLLECTION).unwrap();
        assert_eq!(coll.put.count, 2);
        assert_eq!(coll.get, OperationStats { count: 3, hits: 2, misses: 1 });
        assert_eq!(coll.ttl, OperationStats { count: 1, hits: 0, misses: 1 });
        assert_eq!(coll.delete, OperationStats { count: 2, hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn test_failures_not_counted_and_not_altered() {
        let stats = StatisticsWrapper::new(Arc::new(FlakyStore::broken()));

        assert!(stats.get("a", None).await.is_err());
        assert!(stats.statistics().await.collections.is_empty());
    }

    #[tokio::test]
    async fn test_custom_default_collection_label() {
        let store = Arc::new(MemoryStore::new(10).with_default_collection("tenant"));
        let stats = StatisticsWrapper::new(store.clone()).with_default_collection("tenant");

        stats.put("a", doc(json!({})), None, None).await.unwrap();
        stats.get("a", Some("tenant")).await.unwrap();

        assert!(store.get("a", Some("tenant")).await.unwrap().is_some());
        let snapshot = stats.statistics().await;
        assert!(snapshot.collection(DEFAULT_COLLECTION).is_none());
        let tenant = snapshot.collection("tenant").unwrap();
        assert_eq!(tenant.put.count, 1);
        assert_eq!(tenant.get.hits, 1);
    }
}
