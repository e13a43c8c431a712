//! Response DTOs for the key/value server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::entry::Document;
use crate::stores::EngineStats;
use crate::wrappers::{CollectionStatistics, StoreStatistics};

/// Response body for GET /kv/:collection/:key
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub collection: String,
    pub key: String,
    pub value: Document,
    /// Remaining lifetime in seconds, None when the entry never expires
    pub ttl: Option<f64>,
}

impl GetResponse {
    pub fn new(
        collection: impl Into<String>,
        key: impl Into<String>,
        value: Document,
        ttl: Option<f64>,
    ) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
            value,
            ttl,
        }
    }
}

/// Response body for PUT /kv/:collection/:key
#[derive(Debug, Clone, Serialize)]
pub struct PutResponse {
    /// Success message
    pub message: String,
    pub collection: String,
    pub key: String,
}

impl PutResponse {
    pub fn new(collection: impl Into<String>, key: impl Into<String>) -> Self {
        let collection = collection.into();
        let key = key.into();
        Self {
            message: format!("Key '{}' stored in '{}'", key, collection),
            collection,
            key,
        }
    }
}

/// Response body for DELETE /kv/:collection/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    pub collection: String,
    pub key: String,
}

impl DeleteResponse {
    pub fn new(collection: impl Into<String>, key: impl Into<String>) -> Self {
        let collection = collection.into();
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted from '{}'", key, collection),
            collection,
            key,
        }
    }
}

/// Response body for GET /kv/:collection
#[derive(Debug, Clone, Serialize)]
pub struct KeysResponse {
    pub collection: String,
    pub keys: Vec<String>,
}

/// Response body for GET /collections
#[derive(Debug, Clone, Serialize)]
pub struct CollectionsResponse {
    pub collections: Vec<String>,
}

/// Response body for POST /cull
#[derive(Debug, Clone, Serialize)]
pub struct CullResponse {
    /// Number of expired entries removed
    pub removed: usize,
}

/// Response body for the stats endpoint (GET /stats)
///
/// Engine counters come from the memory engine; `collections` holds the
/// per-operation counters of the statistics wrapper.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of engine reads that found a live entry
    pub hits: u64,
    /// Number of engine reads that found nothing
    pub misses: u64,
    /// Number of live entries evicted for capacity
    pub evictions: u64,
    /// Number of expired entries removed
    pub expirations: u64,
    /// Current number of entries held by the engine
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    pub collections: BTreeMap<String, CollectionStatistics>,
}

impl StatsResponse {
    pub fn new(engine: &EngineStats, operations: Option<StoreStatistics>) -> Self {
        Self {
            hits: engine.hits,
            misses: engine.misses,
            evictions: engine.evictions,
            expirations: engine.expirations,
            total_entries: engine.total_entries,
            hit_rate: engine.hit_rate(),
            collections: operations.map(|s| s.collections).unwrap_or_default(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
