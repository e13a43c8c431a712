//! Integration Tests for Decorator Chains
//!
//! Stacks wrappers over the bundled stores and checks the chain end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use layered_kv::contract::{require_enumerate_keys, StoreId, TtlInfo};
use layered_kv::entry::ManualClock;
use layered_kv::wrappers::{
    CircuitBreakerWrapper, CircuitState, CollectionRoutingWrapper, CompressionWrapper,
    DefaultValueWrapper, EncryptionWrapper, FallbackWrapper, PassthroughCacheWrapper,
    RetryPolicy, RetryWrapper, SingleCollectionWrapper, StatisticsWrapper, TimeoutWrapper,
    TtlClampWrapper,
};
use layered_kv::{
    BatchTtl, Document, ErrorCategory, KeyValue, KvError, ManagedEntry, MemoryStore, Result,
    SimpleStore,
};
use serde_json::{json, Value};

// == Helper Functions ==

fn doc(v: Value) -> Document {
    v.as_object().cloned().unwrap()
}

fn keys(ks: &[&str]) -> Vec<String> {
    ks.iter().map(|k| k.to_string()).collect()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        exponential_base: 2.0,
    }
}

/// Fails its first `failures` calls with a connection error, optionally
/// stalling before each call.
struct Unreliable {
    id: StoreId,
    inner: Arc<dyn KeyValue>,
    failures: AtomicUsize,
    calls: AtomicUsize,
    delay: Duration,
}

impl Unreliable {
    fn new(inner: Arc<dyn KeyValue>, failures: usize) -> Self {
        Self {
            id: StoreId::next(),
            inner,
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(_) => Err(KvError::Connection("connection reset".into())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl KeyValue for Unreliable {
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        self.check().await?;
        self.inner.get(key, collection).await
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        self.check().await?;
        self.inner.get_many(keys, collection).await
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        self.check().await?;
        self.inner.ttl(key, collection).await
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        self.check().await?;
        self.inner.ttl_many(keys, collection).await
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        self.check().await?;
        self.inner.put(key, value, collection, ttl).await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        self.check().await?;
        self.inner.put_many(keys, values, collection, ttl).await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        self.check().await?;
        self.inner.delete(key, collection).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        self.check().await?;
        self.inner.delete_many(keys, collection).await
    }

    fn store_id(&self) -> StoreId {
        self.id
    }

    fn store_name(&self) -> &'static str {
        "Unreliable"
    }

    fn lineage(&self) -> Vec<StoreId> {
        let mut lineage = vec![self.id];
        lineage.extend(self.inner.lineage());
        lineage
    }
}

// == Scenario Tests ==

#[tokio::test]
async fn test_ttl_scenario_through_full_chain() {
    let clock = Arc::new(ManualClock::new());
    let engine = Arc::new(MemoryStore::new(100).with_clock(clock.clone()));
    let compressed = Arc::new(CompressionWrapper::new(engine.clone()).with_threshold(16));
    let clamped = Arc::new(TtlClampWrapper::new(compressed, 1.0, Some(3600.0)).unwrap());
    let store = StatisticsWrapper::new(clamped);

    store
        .put("u1", doc(json!({"name": "A"})), Some("users"), Some(5.0))
        .await
        .unwrap();

    let (value, ttl) = store.ttl("u1", Some("users")).await.unwrap();
    assert_eq!(value, Some(doc(json!({"name": "A"}))));
    assert!((ttl.unwrap() - 5.0).abs() < 0.01);

    clock.advance_secs(6.0);
    assert_eq!(store.get("u1", Some("users")).await.unwrap(), None);

    let stats = store.statistics().await;
    let users = stats.collection("users").unwrap();
    assert_eq!(users.ttl.hits, 1);
    assert_eq!(users.get.misses, 1);
}

#[tokio::test]
async fn test_persisted_record_shape_on_flat_backend() {
    let backend = Arc::new(SimpleStore::new());
    backend
        .put("u1", doc(json!({"name": "A"})), Some("users"), Some(30.0))
        .await
        .unwrap();

    let raw = backend.get_raw("users", "u1").await.unwrap();
    let record: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(record["value"], json!({"name": "A"}));
    assert_eq!(record["ttl_seconds"], json!(30.0));
    assert!(record["created_at"].is_string());
    assert!(record["expires_at"].is_string());

    let entry = ManagedEntry::from_json(&raw).unwrap();
    assert_eq!(entry.ttl_seconds, Some(30.0));
}

#[tokio::test]
async fn test_encrypted_compressed_values_are_opaque_at_rest() {
    let backend = Arc::new(SimpleStore::new());
    let encrypted = Arc::new(
        EncryptionWrapper::new(backend.clone(), &EncryptionWrapper::generate_key()).unwrap(),
    );
    let store = CompressionWrapper::new(encrypted).with_threshold(10);

    let value = doc(json!({"card": "4111-1111-1111-1111", "padding": "p".repeat(100)}));
    store.put("k", value.clone(), None, None).await.unwrap();

    let raw = backend.get_raw("default_collection", "k").await.unwrap();
    assert!(!raw.contains("4111"));
    assert!(raw.contains("__encrypted_data__"));
    assert_eq!(store.get("k", None).await.unwrap(), Some(value));
}

// == Failure Handling Tests ==

#[tokio::test]
async fn test_retry_absorbs_transient_failures() {
    let engine = Arc::new(MemoryStore::new(10));
    let flaky = Arc::new(Unreliable::new(engine.clone(), 2));
    let store = RetryWrapper::new(flaky.clone(), fast_retry());

    store.put("k", doc(json!({"v": 1})), None, None).await.unwrap();
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        engine.get("k", None).await.unwrap(),
        Some(doc(json!({"v": 1})))
    );
}

#[tokio::test]
async fn test_retry_gives_up_after_max_retries() {
    let flaky = Arc::new(Unreliable::new(Arc::new(MemoryStore::new(10)), 10));
    let store = RetryWrapper::new(flaky.clone(), fast_retry());

    let err = store.get("k", None).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Transient);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_retry_does_not_retry_validation_errors() {
    let flaky = Arc::new(Unreliable::new(Arc::new(MemoryStore::new(10)), 0));
    let store = RetryWrapper::new(flaky.clone(), fast_retry());

    let err = store
        .put("k", doc(json!({})), None, Some(-1.0))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fallback_matches_secondary_when_primary_is_down() {
    let primary = Arc::new(Unreliable::new(Arc::new(MemoryStore::new(10)), usize::MAX));
    let secondary = Arc::new(MemoryStore::new(10));
    secondary
        .put("k", doc(json!({"from": "secondary"})), None, Some(60.0))
        .await
        .unwrap();
    let store = FallbackWrapper::new(primary, secondary.clone()).unwrap();

    assert_eq!(
        store.get_many(&keys(&["k", "x"]), None).await.unwrap(),
        secondary.get_many(&keys(&["k", "x"]), None).await.unwrap()
    );

    let err = store
        .put("k", doc(json!({})), None, Some(0.0))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
}

#[tokio::test]
async fn test_fallback_never_touches_secondary_when_primary_works() {
    let primary = Arc::new(MemoryStore::new(10));
    let secondary = Arc::new(Unreliable::new(Arc::new(MemoryStore::new(10)), 0));
    let store = FallbackWrapper::new(primary, secondary.clone()).unwrap();

    store.put("k", doc(json!({})), None, None).await.unwrap();
    store.get("k", None).await.unwrap();
    assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_timeout_feeds_fallback() {
    let stalled = Unreliable::new(Arc::new(MemoryStore::new(10)), 0)
        .with_delay(Duration::from_millis(200));
    let primary = Arc::new(TimeoutWrapper::new(
        Arc::new(stalled),
        Duration::from_millis(10),
    ));
    let secondary = Arc::new(MemoryStore::new(10));
    secondary
        .put("k", doc(json!({"v": 2})), None, None)
        .await
        .unwrap();
    let store = FallbackWrapper::new(primary, secondary).unwrap();

    assert_eq!(
        store.get("k", None).await.unwrap(),
        Some(doc(json!({"v": 2})))
    );
}

// == Composition Tests ==

#[tokio::test]
async fn test_passthrough_cache_over_flat_backend() {
    let backend = Arc::new(SimpleStore::new());
    let cache = Arc::new(MemoryStore::new(10));
    let store = PassthroughCacheWrapper::new(backend.clone(), cache.clone()).unwrap();

    backend
        .put("k", doc(json!({"v": 1})), None, Some(120.0))
        .await
        .unwrap();
    assert_eq!(
        store.get("k", None).await.unwrap(),
        Some(doc(json!({"v": 1})))
    );
    assert!(cache.get("k", None).await.unwrap().is_some());

    store.delete("k", None).await.unwrap();
    assert!(cache.get("k", None).await.unwrap().is_none());
    assert!(store.get("k", None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_single_collection_round_trip_over_flat_backend() {
    let backend = Arc::new(SimpleStore::new());
    let store = SingleCollectionWrapper::new(backend.clone(), "all");

    store
        .put_many(
            &keys(&["u1", "u2"]),
            vec![doc(json!({})), doc(json!({}))],
            Some("users"),
            BatchTtl::Uniform(Some(60.0)),
        )
        .await
        .unwrap();

    let mut listed = require_enumerate_keys(&store)
        .unwrap()
        .keys(Some("users"), None)
        .await
        .unwrap();
    listed.sort();
    assert_eq!(listed, keys(&["u1", "u2"]));
    assert!(backend.get_raw("all", "users::u1").await.is_some());
}

#[tokio::test]
async fn test_same_store_cannot_be_both_tiers() {
    let shared: Arc<dyn KeyValue> = Arc::new(MemoryStore::new(10));
    let wrapped: Arc<dyn KeyValue> = Arc::new(StatisticsWrapper::new(shared.clone()));

    assert!(matches!(
        FallbackWrapper::new(wrapped, shared),
        Err(KvError::InvalidComposition(_))
    ));
}

// == Circuit Breaker and Routing Chains ==

#[tokio::test]
async fn test_open_circuit_sends_reads_to_fallback() {
    let primary_engine = Arc::new(MemoryStore::new(100));
    let unreliable = Arc::new(Unreliable::new(primary_engine, usize::MAX));
    let breaker = Arc::new(CircuitBreakerWrapper::new(unreliable.clone()).failure_threshold(2));
    let secondary = Arc::new(MemoryStore::new(100));
    secondary
        .put("k", doc(json!({"from": "secondary"})), None, None)
        .await
        .unwrap();
    let chain = FallbackWrapper::new(breaker.clone(), secondary).unwrap();

    for _ in 0..5 {
        assert_eq!(
            chain.get("k", None).await.unwrap(),
            Some(doc(json!({"from": "secondary"})))
        );
    }

    assert_eq!(breaker.state().await, CircuitState::Open);
    assert_eq!(unreliable.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_default_value_over_routed_stores() {
    let sessions = Arc::new(MemoryStore::new(100));
    let everything_else = Arc::new(MemoryStore::new(100));
    let router = CollectionRoutingWrapper::new(everything_else.clone())
        .route("sessions", sessions.clone())
        .unwrap();
    let chain = DefaultValueWrapper::new(Arc::new(router), doc(json!({"anonymous": true})));

    chain
        .put("s1", doc(json!({"user": "ada"})), Some("sessions"), Some(60.0))
        .await
        .unwrap();

    assert!(sessions.get("s1", Some("sessions")).await.unwrap().is_some());
    assert!(everything_else
        .get("s1", Some("sessions"))
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        chain.get("s2", Some("sessions")).await.unwrap(),
        Some(doc(json!({"anonymous": true})))
    );
}
