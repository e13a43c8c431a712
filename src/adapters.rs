//! Adapters Module
//!
//! Alternative call surfaces over a [`KeyValue`] store. Unlike wrappers they do
//! not implement the protocol themselves, so they sit at the very outside of a
//! chain.

use std::sync::Arc;

use crate::contract::{KeyValue, DEFAULT_COLLECTION};
use crate::entry::{BatchTtl, Document};
use crate::error::{KvError, Result};

/// Reads fail with [`KvError::MissingKey`] instead of returning None.
///
/// Writes and deletes pass through unchanged.
#[derive(Clone)]
pub struct RaiseOnMissing {
    store: Arc<dyn KeyValue>,
}

impl RaiseOnMissing {
    pub fn new(store: Arc<dyn KeyValue>) -> Self {
        Self { store }
    }

    /// The wrapped store, for calls that should see misses as None.
    pub fn store(&self) -> &Arc<dyn KeyValue> {
        &self.store
    }

    pub async fn get(&self, key: &str, collection: Option<&str>) -> Result<Document> {
        self.store
            .get(key, collection)
            .await?
            .ok_or_else(|| missing("get", collection, key))
    }

    /// Fails on the first missing key, in input order.
    pub async fn get_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<Document>> {
        let values = self.store.get_many(keys, collection).await?;
        keys.iter()
            .zip(values)
            .map(|(key, value)| value.ok_or_else(|| missing("get_many", collection, key)))
            .collect()
    }

    pub async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<(Document, Option<f64>)> {
        match self.store.ttl(key, collection).await? {
            (Some(value), ttl) => Ok((value, ttl)),
            (None, _) => Err(missing("ttl", collection, key)),
        }
    }

    pub async fn ttl_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<(Document, Option<f64>)>> {
        let infos = self.store.ttl_many(keys, collection).await?;
        keys.iter()
            .zip(infos)
            .map(|(key, (value, ttl))| match value {
                Some(value) => Ok((value, ttl)),
                None => Err(missing("ttl_many", collection, key)),
            })
            .collect()
    }

    pub async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        self.store.put(key, value, collection, ttl).await
    }

    pub async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        self.store.put_many(keys, values, collection, ttl).await
    }

    pub async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.store.delete(key, collection).await
    }

    pub async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.store.delete_many(keys, collection).await
    }
}

fn missing(operation: &'static str, collection: Option<&str>, key: &str) -> KvError {
    KvError::MissingKey {
        operation,
        collection: collection.unwrap_or(DEFAULT_COLLECTION).to_string(),
        key: key.to_string(),
    }
}
