//! Request DTOs for the key/value server API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;

use crate::entry::Document;

/// Request body for PUT /kv/:collection/:key
///
/// # Fields
/// - `value`: The JSON object to store
/// - `ttl`: Optional TTL in seconds (the entry never expires if not specified)
#[derive(Debug, Clone, Deserialize)]
pub struct PutRequest {
    pub value: Document,
    #[serde(default)]
    pub ttl: Option<f64>,
}

/// Query string of the enumeration endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}
