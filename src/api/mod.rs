//! API Module
//!
//! HTTP handlers and routing for the key/value server REST API.
//!
//! # Endpoints
//! - `PUT /kv/:collection/:key` - Store a JSON object, with optional TTL
//! - `GET /kv/:collection/:key` - Retrieve a value and its remaining TTL
//! - `DELETE /kv/:collection/:key` - Delete a key
//! - `GET /kv/:collection` - List keys of a collection
//! - `GET /collections` - List collections
//! - `POST /cull` - Remove expired entries
//! - `GET /stats` - Engine and per-collection operation statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
