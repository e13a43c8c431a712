//! Limit Size Wrapper
//!
//! Refuses entries whose stored record would be larger than `max_size` bytes.
//! Oversized entries raise [`KvError::EntryTooLarge`] or, with
//! `raise_on_error` off, are dropped while the rest of a batch is written.
//! Keys and TTLs are validated first, so a dropped entry never hides a bad
//! argument.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::contract::{validate_key, validate_keys, KeyValue, StoreId, TtlInfo};
use crate::entry::{prepare_ttl, prepare_ttls, BatchTtl, Document, ManagedEntry};
use crate::error::{KvError, Result};

pub struct LimitSizeWrapper {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    max_size: usize,
    raise_on_error: bool,
}

impl LimitSizeWrapper {
    pub fn new(inner: Arc<dyn KeyValue>, max_size: usize) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            max_size,
            raise_on_error: true,
        }
    }

    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }

    /// Returns whether `value` fits, or the error when it does not and errors are raised.
    fn fits(&self, value: &Document, collection: Option<&str>, key: &str) -> Result<bool> {
        let record = ManagedEntry::new(value.clone(), None, Utc::now())?.to_json()?;
        let size = record.len();
        if size <= self.max_size {
            return Ok(true);
        }

        let collection = collection.unwrap_or_default().to_string();
        if self.raise_on_error {
            return Err(KvError::EntryTooLarge {
                size,
                max_size: self.max_size,
                collection,
                key: key.to_string(),
            });
        }
        debug!(key, %collection, size, max_size = self.max_size, "Dropping oversized entry");
        Ok(false)
    }
}

#[async_trait]
impl KeyValue for LimitSizeWrapper {
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
        validate_key(key)?;
        prepare_ttl(ttl)?;
        if self.fits(&value, collection, key)? {
            self.inner.put(key, value, collection, ttl).await?;
        }
        Ok(())
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        if keys.len() != values.len() {
            return Err(KvError::BatchLengthMismatch {
                what: "values",
                expected: keys.len(),
                actual: values.len(),
            });
        }
        validate_keys(keys)?;
        prepare_ttls(&ttl, keys.len())?;

        let mut kept_keys = Vec::with_capacity(keys.len());
        let mut kept_values = Vec::with_capacity(keys.len());
        let mut kept_ttls = Vec::new();
        for (i, (key, value)) in keys.iter().zip(values).enumerate() {
            if self.fits(&value, collection, key)? {
                kept_keys.push(key.clone());
                kept_values.push(value);
                if let BatchTtl::PerKey(ttls) = &ttl {
                    kept_ttls.push(ttls[i]);
                }
            }
        }
        if kept_keys.is_empty() {
            return Ok(());
        }

        let ttl = match ttl {
            BatchTtl::PerKey(_) => BatchTtl::PerKey(kept_ttls),
            uniform => uniform,
        };
        self.inner
            .put_many(&kept_keys, kept_values, collection, ttl)
            .await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.inner.delete(key, collection).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.inner.delete_many(keys, collection).await
    }

    wrapper_identity!("LimitSizeWrapper", inner);
    forward_capabilities!(inner);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrappers::testing::{doc, keys, memory};
    use serde_json::json;

    fn big() -> Document {
        doc(json!({ "blob": "x".repeat(500) }))
    }

    #[tokio::test]
    async fn test_small_entries_pass() {
        let (store, _) = memory();
        let wrapper = LimitSizeWrapper::new(store.clone(), 300);

        wrapper.put("k", doc(json!({"v": 1})), None, None).await.unwrap();
        assert!(store.get("k", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_oversized_entry_raises() {
        let (store, _) = memory();
        let wrapper = LimitSizeWrapper::new(store.clone(), 300);

        let result = wrapper.put("k", big(), Some("c"), None).await;
        match result {
            Err(KvError::EntryTooLarge {
                size,
                max_size,
                collection,
                key,
            }) => {
                assert!(size > 500);
                assert_eq!(max_size, 300);
                assert_eq!(collection, "c");
                assert_eq!(key, "k");
            }
            other => panic!("expected EntryTooLarge, got {other:?}"),
        }
        assert!(store.get("k", Some("c")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_many_filters_and_keeps_ttl_alignment() {
        let (store, _) = memory();
        let wrapper = LimitSizeWrapper::new(store.clone(), 300).raise_on_error(false);

        wrapper
            .put_many(
                &keys(&["a", "big", "c"]),
                vec![doc(json!({"v": "a"})), big(), doc(json!({"v": "c"}))],
                None,
                BatchTtl::PerKey(vec![Some(10.0), Some(20.0), Some(30.0)]),
            )
            .await
            .unwrap();

        let infos = store
            .ttl_many(&keys(&["a", "big", "c"]), None)
            .await
            .unwrap();
        assert_eq!(infos[0], (Some(doc(json!({"v": "a"}))), Some(10.0)));
        assert_eq!(infos[1], (None, None));
        assert_eq!(infos[2], (Some(doc(json!({"v": "c"}))), Some(30.0)));
    }

    #[tokio::test]
    async fn test_put_many_raises_before_writing() {
        let (store, _) = memory();
        let wrapper = LimitSizeWrapper::new(store.clone(), 300);

        let result = wrapper
            .put_many(
                &keys(&["a", "big"]),
                vec![doc(json!({})), big()],
                None,
                BatchTtl::default(),
            )
            .await;
        assert!(matches!(result, Err(KvError::EntryTooLarge { .. })));
        assert!(store.get("a", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dropped_entry_still_validates_ttl() {
        let (store, _) = memory();
        let wrapper = LimitSizeWrapper::new(store.clone(), 10).raise_on_error(false);

        for ttl in [0.0, -5.0, f64::NAN] {
            let result = wrapper.put("k", big(), None, Some(ttl)).await;
            assert!(matches!(result, Err(KvError::InvalidTtl(_))));
        }
        assert!(matches!(
            wrapper.put("", big(), None, None).await,
            Err(KvError::InvalidKey(_))
        ));

        let result = wrapper
            .put_many(
                &keys(&["a", "b"]),
                vec![big(), big()],
                None,
                BatchTtl::PerKey(vec![Some(10.0)]),
            )
            .await;
        assert!(matches!(result, Err(KvError::BatchLengthMismatch { .. })));

        let result = wrapper
            .put_many(
                &keys(&["a", "b"]),
                vec![big(), big()],
                None,
                BatchTtl::PerKey(vec![Some(10.0), Some(0.0)]),
            )
            .await;
        assert!(matches!(result, Err(KvError::InvalidTtl(_))));
        assert!(store.get("a", None).await.unwrap().is_none());
    }
}
