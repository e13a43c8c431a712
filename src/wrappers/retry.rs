//! Retry Wrapper
//!
//! Retries operations that fail with a transient error, backing off
//! exponentially between attempts. Any other error propagates immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::contract::{KeyValue, StoreId, TtlInfo};
use crate::entry::{BatchTtl, Document};
use crate::error::Result;

// == Retry Policy ==
/// Backoff settings. The delay before retry `n` (0-based) is
/// `initial_delay * exponential_base^n`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before retry number `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.exponential_base.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

pub struct RetryWrapper {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    policy: RetryPolicy,
}

impl RetryWrapper {
    pub fn new(inner: Arc<dyn KeyValue>, policy: RetryPolicy) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl KeyValue for RetryWrapper {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        self.run("get", || self.inner.get(key, collection)).await
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        self.run("get_many", || self.inner.get_many(keys, collection))
            .await
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        self.run("ttl", || self.inner.ttl(key, collection)).await
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        self.run("ttl_many", || self.inner.ttl_many(keys, collection))
            .await
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        let value = &value;
        self.run("put", || self.inner.put(key, value.clone(), collection, ttl))
            .await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        let (values, ttl) = (&values, &ttl);
        self.run("put_many", || {
            self.inner
                .put_many(keys, values.clone(), collection, ttl.clone())
        })
        .await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.run("delete", || self.inner.delete(key, collection)).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.run("delete_many", || self.inner.delete_many(keys, collection))
            .await
    }

    wrapper_identity!("RetryWrapper", inner);
    forward_capabilities!(inner);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KvError;
    use crate::wrappers::testing::{doc, memory, FlakyStore};
    use serde_json::json;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            exponential_base: 2.0,
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_secs(10));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_recovers_from_transient_failures() {
        let (store, _) = memory();
        store.put("k", doc(json!({"v": 1})), None, None).await.unwrap();
        let flaky = Arc::new(FlakyStore::new(store, 2, || {
            KvError::Connection("reset".into())
        }));
        let retry = RetryWrapper::new(flaky.clone(), fast_policy(3));

        let value = retry.get("k", None).await.unwrap();
        assert_eq!(value, Some(doc(json!({"v": 1}))));
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (store, _) = memory();
        let flaky = Arc::new(FlakyStore::new(store, 10, || {
            KvError::Timeout("slow".into())
        }));
        let retry = RetryWrapper::new(flaky.clone(), fast_policy(3));

        let result = retry.put("k", doc(json!({})), None, None).await;
        assert!(matches!(result, Err(KvError::Timeout(_))));
        assert_eq!(flaky.calls(), 4);
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let (store, _) = memory();
        let flaky = Arc::new(FlakyStore::new(store, 1, || {
            KvError::Backend("disk full".into())
        }));
        let retry = RetryWrapper::new(flaky.clone(), fast_policy(3));

        assert!(matches!(
            retry.delete("k", None).await,
            Err(KvError::Backend(_))
        ));
        assert_eq!(flaky.calls(), 1);
    }

    #[tokio::test]
    async fn test_validation_errors_are_not_retried() {
        let (store, _) = memory();
        let flaky = Arc::new(FlakyStore::new(store, 0, || {
            KvError::Connection("unused".into())
        }));
        let retry = RetryWrapper::new(flaky.clone(), fast_policy(3));

        let result = retry.put("k", doc(json!({})), None, Some(0.0)).await;
        assert!(matches!(result, Err(KvError::InvalidTtl(_))));
        assert_eq!(flaky.calls(), 1);
    }
}
