//! Fallback Wrapper
//!
//! Sends every operation to a primary store and repeats it against a fallback
//! store when the primary fails. Results are never merged.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::contract::{check_composition, KeyValue, StoreId, TtlInfo};
use crate::entry::{BatchTtl, Document};
use crate::error::{KvError, Result};

/// Decides whether a primary error triggers the fallback.
pub type FallbackPredicate = Arc<dyn Fn(&KvError) -> bool + Send + Sync>;

pub struct FallbackWrapper {
    id: StoreId,
    primary: Arc<dyn KeyValue>,
    fallback: Arc<dyn KeyValue>,
    write_to_fallback: bool,
    fallback_on: FallbackPredicate,
}

impl FallbackWrapper {
    // == Constructor ==
    /// Creates a wrapper over two distinct stores.
    ///
    /// Fails with [`KvError::InvalidComposition`] if either store already
    /// contains the other, or both are the same instance.
    pub fn new(primary: Arc<dyn KeyValue>, fallback: Arc<dyn KeyValue>) -> Result<Self> {
        let id = StoreId::next();
        check_composition(id, &[primary.as_ref(), fallback.as_ref()])?;

        Ok(Self {
            id,
            primary,
            fallback,
            write_to_fallback: true,
            fallback_on: Arc::new(|_| true),
        })
    }

    /// When false, failed writes surface the primary error instead of
    /// being repeated on the fallback.
    pub fn write_to_fallback(mut self, enabled: bool) -> Self {
        self.write_to_fallback = enabled;
        self
    }

    /// Only primary errors matching `predicate` trigger the fallback.
    pub fn fallback_on<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&KvError) -> bool + Send + Sync + 'static,
    {
        self.fallback_on = Arc::new(predicate);
        self
    }

    async fn run<T, P, PF, F, FF>(
        &self,
        operation: &'static str,
        is_write: bool,
        primary: P,
        fallback: F,
    ) -> Result<T>
    where
        P: FnOnce() -> PF + Send,
        PF: Future<Output = Result<T>> + Send,
        F: FnOnce() -> FF + Send,
        FF: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let err = match primary().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !(self.fallback_on)(&err) || (is_write && !self.write_to_fallback) {
            return Err(err);
        }

        warn!(
            operation,
            primary = self.primary.store_name(),
            fallback = self.fallback.store_name(),
            error = %err,
            "Primary store failed, using fallback"
        );

        fallback().await.map_err(|e| {
            e.context(format!(
                "fallback store {} failed after primary error ({err})",
                self.fallback.store_name()
            ))
        })
    }
}

#[async_trait]
impl KeyValue for FallbackWrapper {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        self.run(
            "get",
            false,
            || self.primary.get(key, collection),
            || self.fallback.get(key, collection),
        )
        .await
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        self.run(
            "get_many",
            false,
            || self.primary.get_many(keys, collection),
            || self.fallback.get_many(keys, collection),
        )
        .await
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        self.run(
            "ttl",
            false,
            || self.primary.ttl(key, collection),
            || self.fallback.ttl(key, collection),
        )
        .await
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        self.run(
            "ttl_many",
            false,
            || self.primary.ttl_many(keys, collection),
            || self.fallback.ttl_many(keys, collection),
        )
        .await
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        let backup = value.clone();
        self.run(
            "put",
            true,
            || self.primary.put(key, value, collection, ttl),
            || self.fallback.put(key, backup, collection, ttl),
        )
        .await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        let (backup_values, backup_ttl) = (values.clone(), ttl.clone());
        self.run(
            "put_many",
            true,
            || self.primary.put_many(keys, values, collection, ttl),
            || {
                self.fallback
                    .put_many(keys, backup_values, collection, backup_ttl)
            },
        )
        .await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.run(
            "delete",
            true,
            || self.primary.delete(key, collection),
            || self.fallback.delete(key, collection),
        )
        .await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.run(
            "delete_many",
            true,
            || self.primary.delete_many(keys, collection),
            || self.fallback.delete_many(keys, collection),
        )
        .await
    }

    fn store_id(&self) -> StoreId {
        self.id
    }

    fn store_name(&self) -> &'static str {
        "FallbackWrapper"
    }

    fn lineage(&self) -> Vec<StoreId> {
        let mut lineage = vec![self.id];
        lineage.extend(self.primary.lineage());
        lineage.extend(self.fallback.lineage());
        lineage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::wrappers::testing::{doc, keys, memory, FlakyStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_primary_success_never_touches_fallback() {
        let (primary, _) = memory();
        let fallback = Arc::new(FlakyStore::broken());
        let wrapper = FallbackWrapper::new(primary.clone(), fallback.clone()).unwrap();

        wrapper.put("k", doc(json!({"v": 1})), None, None).await.unwrap();
        assert_eq!(
            wrapper.get("k", None).await.unwrap(),
            Some(doc(json!({"v": 1})))
        );
        assert!(wrapper.delete("k", None).await.unwrap());
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_broken_primary_matches_fallback() {
        let (secondary, _) = memory();
        secondary
            .put("k", doc(json!({"from": "secondary"})), None, None)
            .await
            .unwrap();
        let wrapper =
            FallbackWrapper::new(Arc::new(FlakyStore::broken()), secondary.clone()).unwrap();

        assert_eq!(
            wrapper.get("k", None).await.unwrap(),
            secondary.get("k", None).await.unwrap()
        );
        assert_eq!(
            wrapper.get_many(&keys(&["k", "x"]), None).await.unwrap(),
            secondary.get_many(&keys(&["k", "x"]), None).await.unwrap()
        );
        assert_eq!(
            wrapper.ttl("k", None).await.unwrap(),
            secondary.ttl("k", None).await.unwrap()
        );

        wrapper.put("n", doc(json!({})), None, None).await.unwrap();
        assert!(secondary.get("n", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_write_to_fallback_disabled() {
        let (secondary, _) = memory();
        let wrapper = FallbackWrapper::new(Arc::new(FlakyStore::broken()), secondary.clone())
            .unwrap()
            .write_to_fallback(false);

        let result = wrapper.put("k", doc(json!({})), None, None).await;
        assert!(matches!(result, Err(KvError::Connection(_))));
        assert!(secondary.get("k", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fallback_on_predicate() {
        let (secondary, _) = memory();
        let primary = Arc::new(FlakyStore::new(memory().0, 1, || {
            KvError::Backend("corrupt".into())
        }));
        let wrapper = FallbackWrapper::new(primary, secondary)
            .unwrap()
            .fallback_on(KvError::is_transient);

        assert!(matches!(
            wrapper.get("k", None).await,
            Err(KvError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_both_failing_keeps_category_and_context() {
        let wrapper = FallbackWrapper::new(
            Arc::new(FlakyStore::broken()),
            Arc::new(FlakyStore::broken()),
        )
        .unwrap();

        let err = wrapper.get("k", None).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert!(err.to_string().contains("fallback store FlakyStore failed"));
    }

    #[tokio::test]
    async fn test_rejects_shared_instances() {
        let (store, _) = memory();
        let shared: Arc<dyn KeyValue> = store;

        assert!(matches!(
            FallbackWrapper::new(shared.clone(), shared.clone()),
            Err(KvError::InvalidComposition(_))
        ));

        let clamp: Arc<dyn KeyValue> = Arc::new(
            crate::wrappers::TtlClampWrapper::new(shared.clone(), 1.0, None).unwrap(),
        );
        assert!(matches!(
            FallbackWrapper::new(clamp, shared),
            Err(KvError::InvalidComposition(_))
        ));
    }
}
