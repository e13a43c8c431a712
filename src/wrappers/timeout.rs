//! Timeout Wrapper
//!
//! Bounds every inner call with a deadline. An elapsed deadline fails with
//! [`KvError::Timeout`], which is transient, so an outer Retry or Fallback
//! can react to it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::contract::{KeyValue, StoreId, TtlInfo};
use crate::entry::{BatchTtl, Document};
use crate::error::{KvError, Result};

/// Deadline used by [`TimeoutWrapper::with_default_timeout`]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TimeoutWrapper {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    timeout: Duration,
}

impl TimeoutWrapper {
    pub fn new(inner: Arc<dyn KeyValue>, timeout: Duration) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            timeout,
        }
    }

    pub fn with_default_timeout(inner: Arc<dyn KeyValue>) -> Self {
        Self::new(inner, DEFAULT_TIMEOUT)
    }

    async fn run<T, Fut>(&self, operation: &'static str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(KvError::Timeout(format!(
                "{operation} did not complete within {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl KeyValue for TimeoutWrapper {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        self.run("get", self.inner.get(key, collection)).await
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        self.run("get_many", self.inner.get_many(keys, collection))
            .await
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        self.run("ttl", self.inner.ttl(key, collection)).await
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        self.run("ttl_many", self.inner.ttl_many(keys, collection))
            .await
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        self.run("put", self.inner.put(key, value, collection, ttl))
            .await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        self.run(
            "put_many",
            self.inner.put_many(keys, values, collection, ttl),
        )
        .await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.run("delete", self.inner.delete(key, collection)).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.run("delete_many", self.inner.delete_many(keys, collection))
            .await
    }

    wrapper_identity!("TimeoutWrapper", inner);
    forward_capabilities!(inner);
}
