//! Default Value Wrapper
//!
//! Reads of missing or expired keys return a copy of a fixed default document
//! instead of `None`. A substituted `ttl` result carries no remaining lifetime.
//! Writes and deletes pass through.

use std::sync::Arc;

use async_trait::async_trait;

use crate::contract::{KeyValue, StoreId, TtlInfo};
use crate::entry::{BatchTtl, Document};
use crate::error::Result;

pub struct DefaultValueWrapper {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    default_value: Document,
}

impl DefaultValueWrapper {
    /// # Arguments
    /// * `inner` - The store to read from
    /// * `default_value` - Document returned for every missing key
    pub fn new(inner: Arc<dyn KeyValue>, default_value: Document) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            default_value,
        }
    }

    pub fn default_value(&self) -> &Document {
        &self.default_value
    }

    fn or_default(&self, value: Option<Document>) -> Document {
        value.unwrap_or_else(|| self.default_value.clone())
    }

    fn ttl_or_default(&self, info: TtlInfo) -> TtlInfo {
        match info {
            (Some(value), ttl) => (Some(value), ttl),
            (None, _) => (Some(self.default_value.clone()), None),
        }
    }
}

#[async_trait]
impl KeyValue for DefaultValueWrapper {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        let value = self.inner.get(key, collection).await?;
        Ok(Some(self.or_default(value)))
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        let values = self.inner.get_many(keys, collection).await?;
        Ok(values
            .into_iter()
            .map(|v| Some(self.or_default(v)))
            .collect())
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        let info = self.inner.ttl(key, collection).await?;
        Ok(self.ttl_or_default(info))
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        let infos = self.inner.ttl_many(keys, collection).await?;
        Ok(infos
            .into_iter()
            .map(|info| self.ttl_or_default(info))
            .collect())
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        self.inner.put(key, value, collection, ttl).await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        self.inner.put_many(keys, values, collection, ttl).await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.inner.delete(key, collection).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.inner.delete_many(keys, collection).await
    }

    wrapper_identity!("DefaultValueWrapper", inner);
    forward_capabilities!(inner);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrappers::testing::{doc, keys, memory};
    use serde_json::json;

    fn not_found() -> Document {
        doc(json!({"status": "not_found"}))
    }

    #[tokio::test]
    async fn test_missing_keys_read_as_default() {
        let (store, _) = memory();
        let wrapper = DefaultValueWrapper::new(store.clone(), not_found());

        wrapper
            .put("k", doc(json!({"v": 1})), Some("c"), Some(60.0))
            .await
            .unwrap();

        assert_eq!(
            wrapper.get("k", Some("c")).await.unwrap(),
            Some(doc(json!({"v": 1})))
        );
        assert_eq!(wrapper.get("absent", Some("c")).await.unwrap(), Some(not_found()));
        assert_eq!(
            wrapper.get_many(&keys(&["k", "absent"]), Some("c")).await.unwrap(),
            vec![Some(doc(json!({"v": 1}))), Some(not_found())]
        );
        assert!(store.get("absent", Some("c")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_ttl_is_none() {
        let (store, clock) = memory();
        let wrapper = DefaultValueWrapper::new(store, not_found());

        wrapper.put("k", doc(json!({"v": 1})), None, Some(10.0)).await.unwrap();
        assert_eq!(
            wrapper.ttl("k", None).await.unwrap(),
            (Some(doc(json!({"v": 1}))), Some(10.0))
        );

        clock.advance_secs(11.0);
        assert_eq!(wrapper.ttl("k", None).await.unwrap(), (Some(not_found()), None));
        assert_eq!(
            wrapper.ttl_many(&keys(&["k", "x"]), None).await.unwrap(),
            vec![(Some(not_found()), None), (Some(not_found()), None)]
        );
    }

    #[tokio::test]
    async fn test_delete_reports_inner_outcome() {
        let (store, _) = memory();
        let wrapper = DefaultValueWrapper::new(store, not_found());

        assert!(!wrapper.delete("absent", None).await.unwrap());
        wrapper.put("k", doc(json!({})), None, None).await.unwrap();
        assert!(wrapper.delete("k", None).await.unwrap());
    }
}
