//! Circuit Breaker Wrapper
//!
//! Stops calling an unhealthy store. After `failure_threshold` consecutive
//! failures the circuit opens and every call fails fast with
//! [`KvError::CircuitOpen`]. Once `recovery_timeout` has passed since the last
//! failure the circuit goes half-open and lets calls through again:
//! `success_threshold` consecutive successes close it, one failure reopens it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::contract::{KeyValue, StoreId, TtlInfo};
use crate::entry::{BatchTtl, Clock, Document, SystemClock};
use crate::error::{KvError, Result};

/// Consecutive failures that open the circuit by default
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Time an open circuit waits before trying again by default
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Consecutive half-open successes that close the circuit by default
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;

/// Decides whether an inner error counts as a failure.
pub type TripPredicate = Arc<dyn Fn(&KvError) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected without reaching the inner store
    Open,
    /// Calls pass through while recovery is being tested
    HalfOpen,
}

#[derive(Debug)]
struct Breaker {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<DateTime<Utc>>,
}

pub struct CircuitBreakerWrapper {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    failure_threshold: u32,
    recovery_timeout: Duration,
    success_threshold: u32,
    trip_on: TripPredicate,
    clock: Arc<dyn Clock>,
    breaker: Mutex<Breaker>,
}

impl CircuitBreakerWrapper {
    // == Constructor ==
    /// Wraps `inner` with the default thresholds. Every error counts as a failure.
    pub fn new(inner: Arc<dyn KeyValue>) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            trip_on: Arc::new(|_| true),
            clock: Arc::new(SystemClock),
            breaker: Mutex::new(Breaker {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
        }
    }

    /// A threshold of zero is raised to one.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// A threshold of zero is raised to one.
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    /// Only errors matching `predicate` count as failures. Others propagate
    /// without touching the circuit.
    pub fn trip_on<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&KvError) -> bool + Send + Sync + 'static,
    {
        self.trip_on = Arc::new(predicate);
        self
    }

    /// Uses `clock` to measure the recovery timeout.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn state(&self) -> CircuitState {
        self.breaker.lock().await.state
    }

    // == Circuit Logic ==
    /// Lets a call through, moving an open circuit to half-open once recovery is due.
    async fn admit(&self) -> Result<()> {
        let mut breaker = self.breaker.lock().await;
        if breaker.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = match breaker.last_failure {
            Some(at) => (self.clock.now() - at).to_std().unwrap_or(Duration::ZERO),
            None => self.recovery_timeout,
        };
        if elapsed < self.recovery_timeout {
            return Err(KvError::CircuitOpen {
                failure_count: breaker.failure_count,
                retry_in: (self.recovery_timeout - elapsed).as_secs_f64(),
            });
        }

        breaker.state = CircuitState::HalfOpen;
        breaker.success_count = 0;
        info!(store = self.inner.store_name(), "Circuit half-open, testing recovery");
        Ok(())
    }

    async fn on_success(&self) {
        let mut breaker = self.breaker.lock().await;
        match breaker.state {
            CircuitState::HalfOpen => {
                breaker.success_count += 1;
                if breaker.success_count >= self.success_threshold {
                    breaker.state = CircuitState::Closed;
                    breaker.failure_count = 0;
                    breaker.success_count = 0;
                    info!(store = self.inner.store_name(), "Circuit closed");
                }
            }
            CircuitState::Closed => breaker.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self, operation: &'static str, err: &KvError) {
        let mut breaker = self.breaker.lock().await;
        breaker.last_failure = Some(self.clock.now());
        match breaker.state {
            CircuitState::HalfOpen => {
                breaker.state = CircuitState::Open;
                breaker.success_count = 0;
                warn!(operation, error = %err, "Recovery attempt failed, circuit reopened");
            }
            CircuitState::Closed => {
                breaker.failure_count += 1;
                if breaker.failure_count >= self.failure_threshold {
                    breaker.state = CircuitState::Open;
                    warn!(
                        operation,
                        store = self.inner.store_name(),
                        failures = breaker.failure_count,
                        error = %err,
                        "Circuit opened"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn run<T, Fut>(&self, operation: &'static str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        self.admit().await?;
        match call.await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(e) => {
                if (self.trip_on)(&e) {
                    self.on_failure(operation, &e).await;
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl KeyValue for CircuitBreakerWrapper {
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

    wrapper_identity!("CircuitBreakerWrapper", inner);
    forward_capabilities!(inner);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ManualClock;
    use crate::error::ErrorCategory;
    use crate::wrappers::testing::{doc, memory, FlakyStore};
    use serde_json::json;

    fn breaker(
        failures: usize,
        error: fn() -> KvError,
    ) -> (CircuitBreakerWrapper, Arc<FlakyStore>, Arc<ManualClock>) {
        let (inner, _) = memory();
        let flaky = Arc::new(FlakyStore::new(inner, failures, error));
        let clock = Arc::new(ManualClock::new());
        let wrapper = CircuitBreakerWrapper::new(flaky.clone())
            .failure_threshold(3)
            .recovery_timeout(Duration::from_secs(30))
            .success_threshold(2)
            .with_clock(clock.clone());
        (wrapper, flaky, clock)
    }

    fn connection_error() -> KvError {
        KvError::Connection("reset".into())
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let (wrapper, flaky, _) = breaker(10, connection_error);

        for _ in 0..3 {
            let err = wrapper.get("k", None).await.unwrap_err();
            assert!(matches!(err, KvError::Connection(_)));
        }
        assert_eq!(wrapper.state().await, CircuitState::Open);

        let err = wrapper.get("k", None).await.unwrap_err();
        assert!(matches!(err, KvError::CircuitOpen { failure_count: 3, .. }));
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn test_half_open_closes_after_successes() {
        let (wrapper, flaky, clock) = breaker(3, connection_error);

        for _ in 0..3 {
            assert!(wrapper.put("k", doc(json!({})), None, None).await.is_err());
        }
        assert!(wrapper.get("k", None).await.is_err());

        clock.advance_secs(31.0);
        wrapper.put("k", doc(json!({"v": 1})), None, None).await.unwrap();
        assert_eq!(wrapper.state().await, CircuitState::HalfOpen);

        assert_eq!(
            wrapper.get("k", None).await.unwrap(),
            Some(doc(json!({"v": 1})))
        );
        assert_eq!(wrapper.state().await, CircuitState::Closed);
        assert_eq!(flaky.calls(), 5);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let (wrapper, flaky, clock) = breaker(4, connection_error);

        for _ in 0..3 {
            assert!(wrapper.get("k", None).await.is_err());
        }
        clock.advance_secs(30.0);

        let err = wrapper.get("k", None).await.unwrap_err();
        assert!(matches!(err, KvError::Connection(_)));
        assert_eq!(wrapper.state().await, CircuitState::Open);

        let err = wrapper.get("k", None).await.unwrap_err();
        assert!(matches!(err, KvError::CircuitOpen { .. }));
        assert_eq!(flaky.calls(), 4);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let (wrapper, _, _) = breaker(2, connection_error);

        assert!(wrapper.get("k", None).await.is_err());
        assert!(wrapper.get("k", None).await.is_err());
        assert!(wrapper.get("k", None).await.is_ok());
        assert_eq!(wrapper.breaker.lock().await.failure_count, 0);
        assert_eq!(wrapper.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_ignored_errors_do_not_trip() {
        let (wrapper, flaky, _) = breaker(5, || KvError::InvalidKey("bad".into()));
        let wrapper = wrapper.trip_on(KvError::is_transient);

        for _ in 0..5 {
            let err = wrapper.get("k", None).await.unwrap_err();
            assert!(matches!(err, KvError::InvalidKey(_)));
        }
        assert_eq!(wrapper.state().await, CircuitState::Closed);
        assert_eq!(flaky.calls(), 5);
    }
}
