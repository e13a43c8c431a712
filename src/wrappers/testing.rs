//! Test doubles shared by the wrapper tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::contract::{KeyValue, StoreId, TtlInfo};
use crate::entry::{BatchTtl, Document, ManualClock};
use crate::error::{KvError, Result};
use crate::stores::MemoryStore;

pub fn doc(v: Value) -> Document {
    v.as_object().cloned().unwrap()
}

pub fn keys(ks: &[&str]) -> Vec<String> {
    ks.iter().map(|k| k.to_string()).collect()
}

pub fn memory() -> (Arc<MemoryStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryStore::new(100).with_clock(clock.clone()));
    (store, clock)
}

/// Store that fails its first `failures` calls, then delegates.
pub struct FlakyStore {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    remaining_failures: AtomicUsize,
    error: fn() -> KvError,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn KeyValue>, failures: usize, error: fn() -> KvError) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            remaining_failures: AtomicUsize::new(failures),
            error,
            calls: AtomicUsize::new(0),
        }
    }

    /// Store that always fails with a connection error.
    pub fn broken() -> Self {
        let (inner, _) = memory();
        Self::new(inner, usize::MAX, || KvError::Connection("down".into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err((self.error)())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValue for FlakyStore {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        self.check()?;
        self.inner.get(key, collection).await
    }

    async fn get_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<Option<Document>>> {
        self.check()?;
        self.inner.get_many(keys, collection).await
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        self.check()?;
        self.inner.ttl(key, collection).await
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        self.check()?;
        self.inner.ttl_many(keys, collection).await
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        self.check()?;
        self.inner.put(key, value, collection, ttl).await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        self.check()?;
        self.inner.put_many(keys, values, collection, ttl).await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.check()?;
        self.inner.delete(key, collection).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.check()?;
        self.inner.delete_many(keys, collection).await
    }

    wrapper_identity!("FlakyStore", inner);
}

/// Store that sleeps before every call.
pub struct SlowStore {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    delay: Duration,
}

impl SlowStore {
    pub fn new(inner: Arc<dyn KeyValue>, delay: Duration) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            delay,
        }
    }
}

#[async_trait]
impl KeyValue for SlowStore {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key, collection).await
    }

    async fn get_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<Option<Document>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_many(keys, collection).await
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        tokio::time::sleep(self.delay).await;
        self.inner.ttl(key, collection).await
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        tokio::time::sleep(self.delay).await;
        self.inner.ttl_many(keys, collection).await
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(key, value, collection, ttl).await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.put_many(keys, values, collection, ttl).await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(key, collection).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete_many(keys, collection).await
    }

    wrapper_identity!("SlowStore", inner);
}
