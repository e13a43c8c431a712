//! Namespace Wrappers
//!
//! Remap the caller's (collection, key) namespace before delegating, and apply
//! the inverse mapping to enumeration results:
//!
//! - [`PrefixKeysWrapper`] stores `key` as `{prefix}__{key}`
//! - [`PrefixCollectionsWrapper`] stores `collection` as `{prefix}__{collection}`
//! - [`SingleCollectionWrapper`] stores every collection inside one inner
//!   collection, under the compound key of (collection, key)
//!
//! Enumeration asks the inner store for a full page and applies `limit` after
//! the inverse mapping, so foreign names never count against it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::compound::{
    collections_from_compound_keys, compound_key, keys_from_compound_keys, prefix_name,
    unprefix_name,
};
use crate::contract::{
    page_limit, require_destroy_collection, require_enumerate_collections,
    require_enumerate_keys, resolve_collection, validate_key, Cull, DestroyCollection, EnumerateCollections,
    EnumerateKeys, KeyValue, StoreId, TtlInfo, DEFAULT_COLLECTION, PAGE_LIMIT,
};
use crate::entry::{BatchTtl, Document};
use crate::error::Result;

// == Prefix Keys ==
pub struct PrefixKeysWrapper {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    prefix: String,
}

impl PrefixKeysWrapper {
    pub fn new(inner: Arc<dyn KeyValue>, prefix: impl Into<String>) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            prefix: prefix.into(),
        }
    }

    /// Empty keys are rejected before the prefix would hide them.
    fn map_key(&self, key: &str) -> Result<String> {
        validate_key(key)?;
        Ok(prefix_name(&self.prefix, key))
    }

    fn map_keys(&self, keys: &[String]) -> Result<Vec<String>> {
        keys.iter().map(|k| self.map_key(k)).collect()
    }
}

#[async_trait]
impl KeyValue for PrefixKeysWrapper {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        self.inner.get(&self.map_key(key)?, collection).await
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        self.inner.get_many(&self.map_keys(keys)?, collection).await
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        self.inner.ttl(&self.map_key(key)?, collection).await
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        self.inner.ttl_many(&self.map_keys(keys)?, collection).await
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        self.inner
            .put(&self.map_key(key)?, value, collection, ttl)
            .await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        self.inner
            .put_many(&self.map_keys(keys)?, values, collection, ttl)
            .await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.inner.delete(&self.map_key(key)?, collection).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.inner
            .delete_many(&self.map_keys(keys)?, collection)
            .await
    }

    wrapper_identity!("PrefixKeysWrapper", inner);

    fn as_enumerate_keys(&self) -> Option<&dyn EnumerateKeys> {
        self.inner.as_enumerate_keys().map(|_| self as &dyn EnumerateKeys)
    }

    fn as_enumerate_collections(&self) -> Option<&dyn EnumerateCollections> {
        self.inner.as_enumerate_collections()
    }

    fn as_cull(&self) -> Option<&dyn Cull> {
        self.inner.as_cull()
    }
}

#[async_trait]
impl EnumerateKeys for PrefixKeysWrapper {
    async fn keys(&self, collection: Option<&str>, limit: Option<usize>) -> Result<Vec<String>> {
        let inner_keys = require_enumerate_keys(self.inner.as_ref())?
            .keys(collection, Some(PAGE_LIMIT))
            .await?;

        Ok(inner_keys
            .iter()
            .filter_map(|k| unprefix_name(&self.prefix, k))
            .map(str::to_string)
            .take(page_limit(limit))
            .collect())
    }
}

// == Prefix Collections ==
pub struct PrefixCollectionsWrapper {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    prefix: String,
    default_collection: String,
}

impl PrefixCollectionsWrapper {
    pub fn new(inner: Arc<dyn KeyValue>, prefix: impl Into<String>) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            prefix: prefix.into(),
            default_collection: DEFAULT_COLLECTION.to_string(),
        }
    }

    /// Sets the collection used when a call names none. It is prefixed like any other.
    pub fn with_default_collection(mut self, collection: impl Into<String>) -> Self {
        self.default_collection = collection.into();
        self
    }

    fn map_collection(&self, collection: Option<&str>) -> Result<String> {
        let collection = resolve_collection(&self.default_collection, collection)?;
        Ok(prefix_name(&self.prefix, &collection))
    }
}

#[async_trait]
impl KeyValue for PrefixCollectionsWrapper {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        let collection = self.map_collection(collection)?;
        self.inner.get(key, Some(&collection)).await
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        let collection = self.map_collection(collection)?;
        self.inner.get_many(keys, Some(&collection)).await
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        let collection = self.map_collection(collection)?;
        self.inner.ttl(key, Some(&collection)).await
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        let collection = self.map_collection(collection)?;
        self.inner.ttl_many(keys, Some(&collection)).await
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        let collection = self.map_collection(collection)?;
        self.inner.put(key, value, Some(&collection), ttl).await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        let collection = self.map_collection(collection)?;
        self.inner
            .put_many(keys, values, Some(&collection), ttl)
            .await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        let collection = self.map_collection(collection)?;
        self.inner.delete(key, Some(&collection)).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        let collection = self.map_collection(collection)?;
        self.inner.delete_many(keys, Some(&collection)).await
    }

    wrapper_identity!("PrefixCollectionsWrapper", inner);

    fn as_enumerate_keys(&self) -> Option<&dyn EnumerateKeys> {
        self.inner.as_enumerate_keys().map(|_| self as &dyn EnumerateKeys)
    }

    fn as_enumerate_collections(&self) -> Option<&dyn EnumerateCollections> {
        self.inner
            .as_enumerate_collections()
            .map(|_| self as &dyn EnumerateCollections)
    }

    fn as_destroy_collection(&self) -> Option<&dyn DestroyCollection> {
        self.inner
            .as_destroy_collection()
            .map(|_| self as &dyn DestroyCollection)
    }

    fn as_cull(&self) -> Option<&dyn Cull> {
        self.inner.as_cull()
    }
}

#[async_trait]
impl EnumerateKeys for PrefixCollectionsWrapper {
    async fn keys(&self, collection: Option<&str>, limit: Option<usize>) -> Result<Vec<String>> {
        let collection = self.map_collection(collection)?;
        require_enumerate_keys(self.inner.as_ref())?
            .keys(Some(&collection), limit)
            .await
    }
}

#[async_trait]
impl EnumerateCollections for PrefixCollectionsWrapper {
    async fn collections(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let inner_collections = require_enumerate_collections(self.inner.as_ref())?
            .collections(Some(PAGE_LIMIT))
            .await?;

        Ok(inner_collections
            .iter()
            .filter_map(|c| unprefix_name(&self.prefix, c))
            .map(str::to_string)
            .take(page_limit(limit))
            .collect())
    }
}

#[async_trait]
impl DestroyCollection for PrefixCollectionsWrapper {
    async fn destroy_collection(&self, collection: &str) -> Result<bool> {
        let collection = self.map_collection(Some(collection))?;
        require_destroy_collection(self.inner.as_ref())?
            .destroy_collection(&collection)
            .await
    }
}

// == Single Collection ==
pub struct SingleCollectionWrapper {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    single_collection: String,
    default_collection: String,
}

impl SingleCollectionWrapper {
    /// # Arguments
    /// * `inner` - The store receiving every entry
    /// * `single_collection` - The inner collection all entries are written to
    pub fn new(inner: Arc<dyn KeyValue>, single_collection: impl Into<String>) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            single_collection: single_collection.into(),
            default_collection: DEFAULT_COLLECTION.to_string(),
        }
    }

    pub fn with_default_collection(mut self, collection: impl Into<String>) -> Self {
        self.default_collection = collection.into();
        self
    }

    fn map_key(&self, key: &str, collection: Option<&str>) -> Result<String> {
        validate_key(key)?;
        let collection = resolve_collection(&self.default_collection, collection)?;
        Ok(compound_key(&collection, key))
    }

    fn map_keys(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<String>> {
        keys.iter().map(|k| self.map_key(k, collection)).collect()
    }

    fn target(&self) -> Option<&str> {
        Some(&self.single_collection)
    }

    async fn all_inner_keys(&self) -> Result<Vec<String>> {
        require_enumerate_keys(self.inner.as_ref())?
            .keys(self.target(), Some(PAGE_LIMIT))
            .await
    }
}

#[async_trait]
impl KeyValue for SingleCollectionWrapper {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        let key = self.map_key(key, collection)?;
        self.inner.get(&key, self.target()).await
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        let keys = self.map_keys(keys, collection)?;
        self.inner.get_many(&keys, self.target()).await
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        let key = self.map_key(key, collection)?;
        self.inner.ttl(&key, self.target()).await
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        let keys = self.map_keys(keys, collection)?;
        self.inner.ttl_many(&keys, self.target()).await
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        let key = self.map_key(key, collection)?;
        self.inner.put(&key, value, self.target(), ttl).await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        let keys = self.map_keys(keys, collection)?;
        self.inner
            .put_many(&keys, values, self.target(), ttl)
            .await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        let key = self.map_key(key, collection)?;
        self.inner.delete(&key, self.target()).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        let keys = self.map_keys(keys, collection)?;
        self.inner.delete_many(&keys, self.target()).await
    }

    wrapper_identity!("SingleCollectionWrapper", inner);

    fn as_enumerate_keys(&self) -> Option<&dyn EnumerateKeys> {
        self.inner.as_enumerate_keys().map(|_| self as &dyn EnumerateKeys)
    }

    fn as_enumerate_collections(&self) -> Option<&dyn EnumerateCollections> {
        self.inner
            .as_enumerate_keys()
            .map(|_| self as &dyn EnumerateCollections)
    }

    fn as_cull(&self) -> Option<&dyn Cull> {
        self.inner.as_cull()
    }
}

#[async_trait]
impl EnumerateKeys for SingleCollectionWrapper {
    async fn keys(&self, collection: Option<&str>, limit: Option<usize>) -> Result<Vec<String>> {
        let collection = resolve_collection(&self.default_collection, collection)?;
        let inner_keys = self.all_inner_keys().await?;

        let mut keys = keys_from_compound_keys(inner_keys.iter().map(String::as_str), &collection);
        keys.truncate(page_limit(limit));
        Ok(keys)
    }
}

#[async_trait]
impl EnumerateCollections for SingleCollectionWrapper {
    async fn collections(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let inner_keys = self.all_inner_keys().await?;

        let mut collections =
            collections_from_compound_keys(inner_keys.iter().map(String::as_str));
        collections.sort();
        collections.truncate(page_limit(limit));
        Ok(collections)
    }
}
