//! API Handlers
//!
//! HTTP request handlers exposing the key/value protocol over JSON.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::adapters::RaiseOnMissing;
use crate::config::Config;
use crate::contract::{require_cull, require_enumerate_collections, require_enumerate_keys, KeyValue};
use crate::error::{KvError, Result};
use crate::models::{
    CollectionsResponse, CullResponse, DeleteResponse, GetResponse, HealthResponse, KeysResponse,
    ListQuery, PutRequest, PutResponse, StatsResponse,
};
use crate::stores::{EngineStats, MemoryStore};
use crate::wrappers::{CompressionWrapper, LimitSizeWrapper, StatisticsWrapper, TtlClampWrapper};

/// Application state shared across all handlers.
///
/// `store` is the outermost layer of the chain; `engine` and `statistics`
/// are handles on layers inside it, kept for the stats endpoint.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyValue>,
    pub engine: Option<Arc<MemoryStore>>,
    pub statistics: Option<Arc<StatisticsWrapper>>,
}

impl AppState {
    /// Serves any store, without engine or operation statistics.
    pub fn new(store: Arc<dyn KeyValue>) -> Self {
        Self {
            store,
            engine: None,
            statistics: None,
        }
    }

    /// Builds the server chain from configuration.
    ///
    /// Write path, outermost first:
    /// statistics -> ttl clamp -> compression -> size limit -> memory engine
    pub fn from_config(config: &Config) -> Result<Self> {
        let engine = Arc::new(
            MemoryStore::new(config.max_entries_per_collection)
                .with_default_collection(config.default_collection.clone()),
        );
        let limited = Arc::new(LimitSizeWrapper::new(engine.clone(), config.max_entry_size));
        let compressed =
            Arc::new(CompressionWrapper::new(limited).with_threshold(config.compression_threshold));
        let clamped = Arc::new(TtlClampWrapper::new(
            compressed,
            config.min_ttl,
            config.max_ttl,
        )?);
        let statistics = Arc::new(
            StatisticsWrapper::new(clamped)
                .with_default_collection(config.default_collection.clone()),
        );

        Ok(Self {
            store: statistics.clone(),
            engine: Some(engine),
            statistics: Some(statistics),
        })
    }
}

/// Handler for PUT /kv/:collection/:key
pub async fn put_handler(
    State(state): State<AppState>,
    Path((collection, key)): Path<(String, String)>,
    Json(req): Json<PutRequest>,
) -> Result<Json<PutResponse>> {
    state
        .store
        .put(&key, req.value, Some(&collection), req.ttl)
        .await?;

    Ok(Json(PutResponse::new(collection, key)))
}

/// Handler for GET /kv/:collection/:key
///
/// Missing and expired keys answer 404.
pub async fn get_handler(
    State(state): State<AppState>,
    Path((collection, key)): Path<(String, String)>,
) -> Result<Json<GetResponse>> {
    let (value, ttl) = RaiseOnMissing::new(state.store.clone())
        .ttl(&key, Some(&collection))
        .await?;

    Ok(Json(GetResponse::new(collection, key, value, ttl)))
}

/// Handler for DELETE /kv/:collection/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path((collection, key)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>> {
    if !state.store.delete(&key, Some(&collection)).await? {
        return Err(KvError::MissingKey {
            operation: "delete",
            collection,
            key,
        });
    }

    Ok(Json(DeleteResponse::new(collection, key)))
}

/// Handler for GET /kv/:collection
pub async fn keys_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<KeysResponse>> {
    let keys = require_enumerate_keys(state.store.as_ref())?
        .keys(Some(&collection), query.limit)
        .await?;

    Ok(Json(KeysResponse { collection, keys }))
}

/// Handler for GET /collections
pub async fn collections_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<CollectionsResponse>> {
    let collections = require_enumerate_collections(state.store.as_ref())?
        .collections(query.limit)
        .await?;

    Ok(Json(CollectionsResponse { collections }))
}

/// Handler for POST /cull
pub async fn cull_handler(State(state): State<AppState>) -> Result<Json<CullResponse>> {
    let removed = require_cull(state.store.as_ref())?.cull().await?;

    Ok(Json(CullResponse { removed }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let engine = match &state.engine {
        Some(engine) => engine.stats().await,
        None => EngineStats::new(),
    };
    let operations = match &state.statistics {
        Some(statistics) => Some(statistics.statistics().await),
        None => None,
    };

    Json(StatsResponse::new(&engine, operations))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
