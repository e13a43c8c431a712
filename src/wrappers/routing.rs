//! Collection Routing Wrapper
//!
//! Sends each call to the store mapped to its collection, or to the default
//! store for unmapped collections and calls without one. The collection name
//! is passed on unchanged, and several collections may share a store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::contract::{
    require_destroy_collection, require_enumerate_keys, DestroyCollection, EnumerateKeys,
    KeyValue, StoreId, TtlInfo,
};
use crate::entry::{BatchTtl, Document};
use crate::error::{KvError, Result};

pub struct CollectionRoutingWrapper {
    id: StoreId,
    routes: HashMap<String, Arc<dyn KeyValue>>,
    default_store: Arc<dyn KeyValue>,
}

impl CollectionRoutingWrapper {
    pub fn new(default_store: Arc<dyn KeyValue>) -> Self {
        Self {
            id: StoreId::next(),
            routes: HashMap::new(),
            default_store,
        }
    }

    /// Routes `collection` to `store`. A later route for the same collection
    /// replaces the earlier one.
    pub fn route(
        mut self,
        collection: impl Into<String>,
        store: Arc<dyn KeyValue>,
    ) -> Result<Self> {
        let collection = collection.into();
        if collection.is_empty() {
            return Err(KvError::InvalidCollection(
                "routed collection name cannot be empty".to_string(),
            ));
        }
        self.routes.insert(collection, store);
        Ok(self)
    }

    /// The store serving `collection`.
    pub fn store_for(&self, collection: Option<&str>) -> &Arc<dyn KeyValue> {
        collection
            .and_then(|c| self.routes.get(c))
            .unwrap_or(&self.default_store)
    }

    fn all_stores(&self) -> impl Iterator<Item = &Arc<dyn KeyValue>> {
        std::iter::once(&self.default_store).chain(self.routes.values())
    }
}

#[async_trait]
impl KeyValue for CollectionRoutingWrapper {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        self.store_for(collection).get(key, collection).await
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        self.store_for(collection).get_many(keys, collection).await
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        self.store_for(collection).ttl(key, collection).await
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        self.store_for(collection).ttl_many(keys, collection).await
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        self.store_for(collection)
            .put(key, value, collection, ttl)
            .await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        self.store_for(collection)
            .put_many(keys, values, collection, ttl)
            .await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.store_for(collection).delete(key, collection).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.store_for(collection)
            .delete_many(keys, collection)
            .await
    }

    fn store_id(&self) -> StoreId {
        self.id
    }

    fn store_name(&self) -> &'static str {
        "CollectionRoutingWrapper"
    }

    fn lineage(&self) -> Vec<StoreId> {
        let mut lineage = vec![self.id];
        for store in self.all_stores() {
            for id in store.lineage() {
                if !lineage.contains(&id) {
                    lineage.push(id);
                }
            }
        }
        lineage
    }

    // Per-collection capabilities are exposed only when every target has them.
    fn as_enumerate_keys(&self) -> Option<&dyn EnumerateKeys> {
        self.all_stores()
            .all(|s| s.as_enumerate_keys().is_some())
            .then_some(self as &dyn EnumerateKeys)
    }

    fn as_destroy_collection(&self) -> Option<&dyn DestroyCollection> {
        self.all_stores()
            .all(|s| s.as_destroy_collection().is_some())
            .then_some(self as &dyn DestroyCollection)
    }
}

#[async_trait]
impl EnumerateKeys for CollectionRoutingWrapper {
    async fn keys(&self, collection: Option<&str>, limit: Option<usize>) -> Result<Vec<String>> {
        require_enumerate_keys(self.store_for(collection).as_ref())?
            .keys(collection, limit)
            .await
    }
}

#[async_trait]
impl DestroyCollection for CollectionRoutingWrapper {
    async fn destroy_collection(&self, collection: &str) -> Result<bool> {
        require_destroy_collection(self.store_for(Some(collection)).as_ref())?
            .destroy_collection(collection)
            .await
    }
}
