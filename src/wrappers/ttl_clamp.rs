//! TTL Clamp Wrapper
//!
//! Forces every write's TTL into `[min_ttl, max_ttl]`. A write without a TTL
//! gets `missing_ttl` if set, else `max_ttl` if set, else stays unbounded.
//! Reads and deletes pass through untouched.

use std::sync::Arc;

use async_trait::async_trait;

use crate::contract::{KeyValue, StoreId, TtlInfo};
use crate::entry::{prepare_ttl, BatchTtl, Document};
use crate::error::{KvError, Result};

pub struct TtlClampWrapper {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    min_ttl: f64,
    max_ttl: Option<f64>,
    missing_ttl: Option<f64>,
}

impl TtlClampWrapper {
    // == Constructor ==
    /// Wraps `inner`, clamping TTLs into `[min_ttl, max_ttl]`.
    ///
    /// # Arguments
    /// * `inner` - Store receiving the clamped writes
    /// * `min_ttl` - Lower bound in seconds, may be zero
    /// * `max_ttl` - Upper bound in seconds, None = unbounded
    pub fn new(inner: Arc<dyn KeyValue>, min_ttl: f64, max_ttl: Option<f64>) -> Result<Self> {
        if !min_ttl.is_finite() || min_ttl < 0.0 {
            return Err(KvError::InvalidTtl(format!(
                "min_ttl must be a non-negative number, got {min_ttl}"
            )));
        }
        if let Some(max) = max_ttl {
            prepare_ttl(Some(max))?;
            if max < min_ttl {
                return Err(KvError::InvalidTtl(format!(
                    "max_ttl {max} is below min_ttl {min_ttl}"
                )));
            }
        }

        Ok(Self {
            id: StoreId::next(),
            inner,
            min_ttl,
            max_ttl,
            missing_ttl: None,
        })
    }

    /// TTL applied to writes that carry none. Not clamped.
    pub fn with_missing_ttl(mut self, missing_ttl: f64) -> Result<Self> {
        self.missing_ttl = prepare_ttl(Some(missing_ttl))?;
        Ok(self)
    }

    // == Clamp ==
    /// Returns the TTL actually forwarded for a requested one.
    pub fn clamp(&self, ttl: Option<f64>) -> Result<Option<f64>> {
        let Some(ttl) = prepare_ttl(ttl)? else {
            return Ok(self.missing_ttl.or(self.max_ttl));
        };

        let mut clamped = ttl.max(self.min_ttl);
        if let Some(max) = self.max_ttl {
            clamped = clamped.min(max);
        }
        Ok(Some(clamped))
    }
}

#[async_trait]
impl KeyValue for TtlClampWrapper {
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
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        let ttl = self.clamp(ttl)?;
        self.inner.put(key, value, collection, ttl).await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        let ttl = ttl.map(|t| self.clamp(t))?;
        self.inner.put_many(keys, values, collection, ttl).await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.inner.delete(key, collection).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.inner.delete_many(keys, collection).await
    }

    wrapper_identity!("TtlClampWrapper", inner);
    forward_capabilities!(inner);
}
