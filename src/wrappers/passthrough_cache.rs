//! Passthrough Cache Wrapper
//!
//! Two-tier store: a fast cache in front of a slower primary. Reads try the
//! cache first and populate it from the primary on a miss. Writes and deletes
//! drop the cached copy, then apply to the primary.
//!
//! Cache writes go through a [`TtlClampWrapper`], so a cached copy never
//! outlives `max_ttl` and entries without a TTL are cached for `missing_ttl`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::contract::{check_composition, KeyValue, StoreId, TtlInfo};
use crate::entry::{prepare_ttl, BatchTtl, Document};
use crate::error::Result;
use crate::wrappers::TtlClampWrapper;

/// Longest lifetime of a cached copy, and the lifetime of cached entries without a TTL
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

pub struct PassthroughCacheWrapper {
    id: StoreId,
    primary: Arc<dyn KeyValue>,
    cache: TtlClampWrapper,
}

impl PassthroughCacheWrapper {
    pub fn new(primary: Arc<dyn KeyValue>, cache: Arc<dyn KeyValue>) -> Result<Self> {
        let ttl = DEFAULT_CACHE_TTL.as_secs_f64();
        Self::with_ttls(primary, cache, ttl, ttl)
    }

    /// # Arguments
    /// * `max_ttl` - Upper bound in seconds for cached copies
    /// * `missing_ttl` - Lifetime in seconds of cached copies of entries without a TTL
    pub fn with_ttls(
        primary: Arc<dyn KeyValue>,
        cache: Arc<dyn KeyValue>,
        max_ttl: f64,
        missing_ttl: f64,
    ) -> Result<Self> {
        let id = StoreId::next();
        check_composition(id, &[primary.as_ref(), cache.as_ref()])?;

        let cache = TtlClampWrapper::new(cache, 0.0, Some(max_ttl))?.with_missing_ttl(missing_ttl)?;
        Ok(Self { id, primary, cache })
    }

    /// Fills misses in `found` from the primary and caches what it returns.
    async fn fill_from_primary(
        &self,
        keys: &[String],
        collection: Option<&str>,
        found: &mut [TtlInfo],
    ) -> Result<()> {
        let missing: Vec<usize> = (0..keys.len()).filter(|&i| found[i].0.is_none()).collect();
        if missing.is_empty() {
            return Ok(());
        }

        let missing_keys: Vec<String> = missing.iter().map(|&i| keys[i].clone()).collect();
        let fetched = self.primary.ttl_many(&missing_keys, collection).await?;

        let mut cache_keys = Vec::new();
        let mut cache_values = Vec::new();
        let mut cache_ttls = Vec::new();
        for (&i, (value, ttl)) in missing.iter().zip(fetched) {
            if let Some(value) = &value {
                if cacheable(ttl) {
                    cache_keys.push(keys[i].clone());
                    cache_values.push(value.clone());
                    cache_ttls.push(ttl);
                }
            }
            found[i] = (value, ttl);
        }

        if !cache_keys.is_empty() {
            self.cache
                .put_many(&cache_keys, cache_values, collection, BatchTtl::PerKey(cache_ttls))
                .await?;
        }
        Ok(())
    }
}

/// A remaining lifetime too short to be stored again is not cached.
fn cacheable(ttl: Option<f64>) -> bool {
    prepare_ttl(ttl).is_ok()
}

#[async_trait]
impl KeyValue for PassthroughCacheWrapper {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        if let Some(value) = self.cache.get(key, collection).await? {
            return Ok(Some(value));
        }

        let (value, ttl) = self.primary.ttl(key, collection).await?;
        if let Some(value) = &value {
            if cacheable(ttl) {
                self.cache.put(key, value.clone(), collection, ttl).await?;
            }
        }
        Ok(value)
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        let mut found: Vec<TtlInfo> = self
            .cache
            .get_many(keys, collection)
            .await?
            .into_iter()
            .map(|value| (value, None))
            .collect();

        self.fill_from_primary(keys, collection, &mut found).await?;
        Ok(found.into_iter().map(|(value, _)| value).collect())
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        let (cached, ttl) = self.cache.ttl(key, collection).await?;
        if cached.is_some() {
            return Ok((cached, ttl));
        }

        let (value, ttl) = self.primary.ttl(key, collection).await?;
        let Some(value) = value else {
            return Ok((None, None));
        };
        if cacheable(ttl) {
            self.cache.put(key, value.clone(), collection, ttl).await?;
        }
        Ok((Some(value), ttl))
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        let mut found = self.cache.ttl_many(keys, collection).await?;
        self.fill_from_primary(keys, collection, &mut found).await?;
        Ok(found)
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        self.cache.delete(key, collection).await?;
        self.primary.put(key, value, collection, ttl).await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        self.cache.delete_many(keys, collection).await?;
        self.primary.put_many(keys, values, collection, ttl).await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.cache.delete(key, collection).await?;
        self.primary.delete(key, collection).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.cache.delete_many(keys, collection).await?;
        self.primary.delete_many(keys, collection).await
    }

    fn store_id(&self) -> StoreId {
        self.id
    }

    fn store_name(&self) -> &'static str {
        "PassthroughCacheWrapper"
    }

    fn lineage(&self) -> Vec<StoreId> {
        let mut lineage = vec![self.id];
        lineage.extend(self.primary.lineage());
        lineage.extend(self.cache.lineage());
        lineage
    }

    fn as_enumerate_keys(&self) -> Option<&dyn crate::contract::EnumerateKeys> {
        self.primary.as_enumerate_keys()
    }

    fn as_enumerate_collections(&self) -> Option<&dyn crate::contract::EnumerateCollections> {
        self.primary.as_enumerate_collections()
    }
}
