//! Layered KV - an async key/value storage contract
//!
//! Provides a collection-scoped key/value protocol with TTLs, a bounded
//! in-process TLRU engine, a flat key-space backend, and composable wrappers
//! (TTL clamping, retry, fallback, compression, encryption, caching,
//! statistics, read-only, size limits, namespacing, routing, timeouts,
//! circuit breaking, default values) that stack in any order over any store.

pub mod adapters;
pub mod api;
pub mod compound;
pub mod config;
pub mod contract;
pub mod entry;
pub mod error;
pub mod models;
pub mod stores;
pub mod tasks;
pub mod wrappers;

pub use adapters::RaiseOnMissing;
pub use api::AppState;
pub use config::Config;
pub use contract::{KeyValue, ManagedStore, DEFAULT_COLLECTION};
pub use entry::{BatchTtl, Document, ManagedEntry};
pub use error::{ErrorCategory, KvError, Result};
pub use stores::{MemoryStore, SimpleStore};
pub use tasks::spawn_cull_task;
