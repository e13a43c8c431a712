//! Storage Contract Module
//!
//! [`KeyValue`] is the protocol every store and wrapper exposes. Backends only
//! implement the three [`ManagedStore`] primitives; the full protocol, with
//! validation, expiration checks and sequential bulk fallbacks, comes from the
//! blanket implementation below.
//!
//! Optional capabilities (enumeration, destruction, culling) are separate
//! narrow traits. Callers look them up with the `as_*` methods or the
//! `require_*` helpers instead of relying on runtime failures.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entry::{prepare_ttl, prepare_ttls, BatchTtl, Document, ManagedEntry};
use crate::error::{KvError, Result};

// == Public Constants ==
/// Collection used when a caller does not name one.
pub const DEFAULT_COLLECTION: &str = "default_collection";

/// Enumeration page size when no limit is given
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Hard cap on any enumeration page
pub const PAGE_LIMIT: usize = 10_000;

/// Result of a `ttl` lookup: the value and its remaining lifetime in seconds.
///
/// `(None, None)` = not found or expired, `(Some(v), None)` = never expires.
pub type TtlInfo = (Option<Document>, Option<f64>);

// == Store Identity ==
/// Identity of a store or wrapper instance, used for composition checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

impl StoreId {
    /// Allocates a fresh identity.
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        StoreId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Rejects compositions where `own` is reachable from one of `inners`, or
/// where two inners share an instance.
pub fn check_composition(own: StoreId, inners: &[&dyn KeyValue]) -> Result<()> {
    let mut seen: Vec<StoreId> = vec![own];

    for inner in inners {
        let lineage = inner.lineage();
        if lineage.contains(&own) {
            return Err(KvError::InvalidComposition(format!(
                "{} cannot wrap itself",
                inner.store_name()
            )));
        }
        if let Some(shared) = lineage.iter().find(|id| seen.contains(id)) {
            return Err(KvError::InvalidComposition(format!(
                "instance {:?} appears more than once in the chain",
                shared
            )));
        }
        seen.extend(lineage);
    }

    Ok(())
}

// == Key Value Protocol ==
/// The full key/value protocol.
///
/// `collection: None` selects the store's default collection. Missing and
/// expired keys are reported as `None`, never as errors.
#[async_trait]
pub trait KeyValue: Send + Sync {
    /// Returns the value stored under `key`, or None.
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>>;

    /// Returns one result per input key, in input order.
    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>>;

    /// Returns the value and its remaining lifetime in seconds.
    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo>;

    /// Returns one [`TtlInfo`] per input key, in input order.
    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>>;

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// Fails with [`KvError::InvalidTtl`] on a non-positive TTL.
    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()>;

    /// Stores `values[i]` under `keys[i]`.
    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()>;

    /// Removes `key`. Returns true if a live entry was removed.
    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool>;

    /// Removes every key and returns how many live entries were removed.
    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize>;

    /// Identity of this instance.
    fn store_id(&self) -> StoreId;

    /// Type name used in diagnostics.
    fn store_name(&self) -> &'static str;

    /// This instance followed by every instance it wraps, transitively.
    fn lineage(&self) -> Vec<StoreId> {
        vec![self.store_id()]
    }

    fn as_enumerate_keys(&self) -> Option<&dyn EnumerateKeys> {
        None
    }

    fn as_enumerate_collections(&self) -> Option<&dyn EnumerateCollections> {
        None
    }

    fn as_destroy_store(&self) -> Option<&dyn DestroyStore> {
        None
    }

    fn as_destroy_collection(&self) -> Option<&dyn DestroyCollection> {
        None
    }

    fn as_cull(&self) -> Option<&dyn Cull> {
        None
    }
}

// == Capability Segments ==
/// Lists the keys of a collection.
#[async_trait]
pub trait EnumerateKeys: Send + Sync {
    async fn keys(&self, collection: Option<&str>, limit: Option<usize>) -> Result<Vec<String>>;
}

/// Lists the collections holding data.
#[async_trait]
pub trait EnumerateCollections: Send + Sync {
    async fn collections(&self, limit: Option<usize>) -> Result<Vec<String>>;
}

/// Removes every collection and key.
#[async_trait]
pub trait DestroyStore: Send + Sync {
    async fn destroy(&self) -> Result<bool>;
}

/// Removes one collection and all of its keys.
#[async_trait]
pub trait DestroyCollection: Send + Sync {
    async fn destroy_collection(&self, collection: &str) -> Result<bool>;
}

/// Removes all expired entries and returns how many were removed.
#[async_trait]
pub trait Cull: Send + Sync {
    async fn cull(&self) -> Result<usize>;
}

fn unsupported(capability: &'static str, store: &dyn KeyValue) -> KvError {
    KvError::Unsupported {
        capability,
        store: store.store_name(),
    }
}

/// Returns the key enumeration capability or an Unsupported error.
pub fn require_enumerate_keys(store: &dyn KeyValue) -> Result<&dyn EnumerateKeys> {
    store
        .as_enumerate_keys()
        .ok_or_else(|| unsupported("keys", store))
}

/// Returns the collection enumeration capability or an Unsupported error.
pub fn require_enumerate_collections(store: &dyn KeyValue) -> Result<&dyn EnumerateCollections> {
    store
        .as_enumerate_collections()
        .ok_or_else(|| unsupported("collections", store))
}

/// Returns the destroy capability or an Unsupported error.
pub fn require_destroy_store(store: &dyn KeyValue) -> Result<&dyn DestroyStore> {
    store
        .as_destroy_store()
        .ok_or_else(|| unsupported("destroy", store))
}

/// Returns the destroy-collection capability or an Unsupported error.
pub fn require_destroy_collection(store: &dyn KeyValue) -> Result<&dyn DestroyCollection> {
    store
        .as_destroy_collection()
        .ok_or_else(|| unsupported("destroy_collection", store))
}

/// Returns the cull capability or an Unsupported error.
pub fn require_cull(store: &dyn KeyValue) -> Result<&dyn Cull> {
    store.as_cull().ok_or_else(|| unsupported("cull", store))
}

/// Clamps an enumeration limit to the page bounds.
pub fn page_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).min(PAGE_LIMIT)
}

// == Validation ==
/// Resolves an optional collection against a default, rejecting empty names.
pub fn resolve_collection(default: &str, collection: Option<&str>) -> Result<String> {
    match collection {
        None => Ok(default.to_string()),
        Some("") => Err(KvError::InvalidCollection(
            "collection name cannot be empty".to_string(),
        )),
        Some(name) => Ok(name.to_string()),
    }
}

/// Rejects empty keys.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(KvError::InvalidKey("key cannot be empty".to_string()));
    }
    Ok(())
}

/// Rejects the batch if any key is empty.
pub fn validate_keys(keys: &[String]) -> Result<()> {
    keys.iter().try_for_each(|k| validate_key(k))
}

// == Managed Store ==
/// The minimal contract a backend implements.
///
/// Primitives are scoped to a single (collection, key) and receive an already
/// resolved collection name. Bulk methods default to sequential loops over the
/// primitives; overrides must keep positional ordering and per-key
/// independence.
#[async_trait]
pub trait ManagedStore: Send + Sync {
    fn store_id(&self) -> StoreId;

    fn store_name(&self) -> &'static str;

    fn default_collection(&self) -> &str {
        DEFAULT_COLLECTION
    }

    /// Current time used for entry creation and expiry checks.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Fetches the stored entry, expired or not.
    async fn get_entry(&self, collection: &str, key: &str) -> Result<Option<ManagedEntry>>;

    /// Stores `entry`, replacing any previous one. Must be a single write.
    async fn put_entry(&self, collection: &str, key: &str, entry: ManagedEntry) -> Result<()>;

    /// Removes the entry. Returns true only if a live entry was removed.
    async fn delete_entry(&self, collection: &str, key: &str) -> Result<bool>;

    async fn get_entries(
        &self,
        collection: &str,
        keys: &[String],
    ) -> Result<Vec<Option<ManagedEntry>>> {
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            entries.push(self.get_entry(collection, key).await?);
        }
        Ok(entries)
    }

    async fn put_entries(
        &self,
        collection: &str,
        keys: &[String],
        entries: Vec<ManagedEntry>,
    ) -> Result<()> {
        for (key, entry) in keys.iter().zip(entries) {
            self.put_entry(collection, key, entry).await?;
        }
        Ok(())
    }

    async fn delete_entries(&self, collection: &str, keys: &[String]) -> Result<usize> {
        let mut deleted = 0;
        for key in keys {
            if self.delete_entry(collection, key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn enumerate_keys_capability(&self) -> Option<&dyn EnumerateKeys> {
        None
    }

    fn enumerate_collections_capability(&self) -> Option<&dyn EnumerateCollections> {
        None
    }

    fn destroy_store_capability(&self) -> Option<&dyn DestroyStore> {
        None
    }

    fn destroy_collection_capability(&self) -> Option<&dyn DestroyCollection> {
        None
    }

    fn cull_capability(&self) -> Option<&dyn Cull> {
        None
    }
}

fn live_value(entry: Option<ManagedEntry>, now: DateTime<Utc>) -> Option<Document> {
    entry
        .filter(|e| !e.is_expired(now))
        .map(|e| e.value)
}

fn live_ttl(entry: Option<ManagedEntry>, now: DateTime<Utc>) -> TtlInfo {
    match entry {
        Some(e) if !e.is_expired(now) => {
            let remaining = e.ttl_remaining(now);
            (Some(e.value), remaining)
        }
        _ => (None, None),
    }
}

#[async_trait]
impl<S> KeyValue for S
where
    S: ManagedStore,
{
    async fn get(&self, key: &str, collection: Option<&str>) -> Result<Option<Document>> {
        let collection = resolve_collection(self.default_collection(), collection)?;
        validate_key(key)?;

        let entry = self.get_entry(&collection, key).await?;
        Ok(live_value(entry, self.now()))
    }

    async fn get_many(
        &self,
        keys: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<Option<Document>>> {
        let collection = resolve_collection(self.default_collection(), collection)?;
        validate_keys(keys)?;

        let entries = self.get_entries(&collection, keys).await?;
        let now = self.now();
        Ok(entries.into_iter().map(|e| live_value(e, now)).collect())
    }

    async fn ttl(&self, key: &str, collection: Option<&str>) -> Result<TtlInfo> {
        let collection = resolve_collection(self.default_collection(), collection)?;
        validate_key(key)?;

        let entry = self.get_entry(&collection, key).await?;
        Ok(live_ttl(entry, self.now()))
    }

    async fn ttl_many(&self, keys: &[String], collection: Option<&str>) -> Result<Vec<TtlInfo>> {
        let collection = resolve_collection(self.default_collection(), collection)?;
        validate_keys(keys)?;

        let entries = self.get_entries(&collection, keys).await?;
        let now = self.now();
        Ok(entries.into_iter().map(|e| live_ttl(e, now)).collect())
    }

    async fn put(
        &self,
        key: &str,
        value: Document,
        collection: Option<&str>,
        ttl: Option<f64>,
    ) -> Result<()> {
        let collection = resolve_collection(self.default_collection(), collection)?;
        validate_key(key)?;
        let ttl = prepare_ttl(ttl)?;

        let entry = ManagedEntry::new(value, ttl, self.now())?;
        self.put_entry(&collection, key, entry).await
    }

    async fn put_many(
        &self,
        keys: &[String],
        values: Vec<Document>,
        collection: Option<&str>,
        ttl: BatchTtl,
    ) -> Result<()> {
        let collection = resolve_collection(self.default_collection(), collection)?;
        validate_keys(keys)?;
        if keys.len() != values.len() {
            return Err(KvError::BatchLengthMismatch {
                what: "values",
                expected: keys.len(),
                actual: values.len(),
            });
        }
        let ttls = prepare_ttls(&ttl, keys.len())?;

        let now = self.now();
        let entries = values
            .into_iter()
            .zip(ttls)
            .map(|(value, ttl)| ManagedEntry::new(value, ttl, now))
            .collect::<Result<Vec<_>>>()?;

        self.put_entries(&collection, keys, entries).await
    }

    async fn delete(&self, key: &str, collection: Option<&str>) -> Result<bool> {
        let collection = resolve_collection(self.default_collection(), collection)?;
        validate_key(key)?;

        self.delete_entry(&collection, key).await
    }

    async fn delete_many(&self, keys: &[String], collection: Option<&str>) -> Result<usize> {
        let collection = resolve_collection(self.default_collection(), collection)?;
        validate_keys(keys)?;

        self.delete_entries(&collection, keys).await
    }

    fn store_id(&self) -> StoreId {
        ManagedStore::store_id(self)
    }

    fn store_name(&self) -> &'static str {
        ManagedStore::store_name(self)
    }

    fn as_enumerate_keys(&self) -> Option<&dyn EnumerateKeys> {
        self.enumerate_keys_capability()
    }

    fn as_enumerate_collections(&self) -> Option<&dyn EnumerateCollections> {
        self.enumerate_collections_capability()
    }

    fn as_destroy_store(&self) -> Option<&dyn DestroyStore> {
        self.destroy_store_capability()
    }

    fn as_destroy_collection(&self) -> Option<&dyn DestroyCollection> {
        self.destroy_collection_capability()
    }

    fn as_cull(&self) -> Option<&dyn Cull> {
        self.cull_capability()
    }
}
