//! Read-Only Wrapper
//!
//! Lets reads and enumeration through and blocks every write. Blocked writes
//! fail with [`KvError::ReadOnly`], or are silently dropped when
//! `raise_on_write` is off. Destroy and cull capabilities are not exposed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::contract::{EnumerateCollections, EnumerateKeys, KeyValue, StoreId, TtlInfo};
use crate::entry::{BatchTtl, Document};
use crate::error::{KvError, Result};

pub struct ReadOnlyWrapper {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    raise_on_write: bool,
}

impl ReadOnlyWrapper {
    pub fn new(inner: Arc<dyn KeyValue>) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            raise_on_write: true,
        }
    }

    pub fn raise_on_write(mut self, raise: bool) -> Self {
        self.raise_on_write = raise;
        self
    }

    /// Err when writes raise, Ok(()) when they are dropped.
    fn reject(&self, operation: &'static str, collection: Option<&str>, key: &str) -> Result<()> {
        let collection = collection.unwrap_or_default().to_string();
        if self.raise_on_write {
            return Err(KvError::ReadOnly {
                operation,
                collection,
                key: key.to_string(),
            });
        }
        debug!(operation, %collection, key, "Dropping write to read-only store");
        Ok(())
    }
}

#[async_trait]
impl KeyValue for ReadOnlyWrapper {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        self.inner.get(key, collection).await
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        self.inner.get_many(keys, collection).await
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        self.inner.ttl(key, collection).await
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        self.inner.ttl_many(keys, collection).await
    }

    async fn put(
        &self,
        key: &str,
        _value: Document,
        collection: Option<&str>,
        _ttl: Option<f64>,
    ) -> Result<()> {
        self.reject("put", collection, key)
    }

    async fn put_many(
        &self,
        keys: &[String],
        _values: Vec<Document>,
        collection: Option<&str>,
        _ttl: BatchTtl,
    ) -> Result<()> {
        self.reject("put_many", collection, &keys.join(","))
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.reject("delete", collection, key).map(|_| false)
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.reject("delete_many", collection, &keys.join(","))
            .map(|_| 0)
    }

    wrapper_identity!("ReadOnlyWrapper", inner);

    fn as_enumerate_keys(&self) -> Option<&dyn EnumerateKeys> {
        self.inner.as_enumerate_keys()
    }

    fn as_enumerate_collections(&self) -> Option<&dyn EnumerateCollections> {
        self.inner.as_enumerate_collections()
    }
}
