//! Stores Module
//!
//! Concrete backends implementing the managed-entry contract: the bounded
//! in-process TLRU engine and a flat key-space record store.

mod lru;
mod memory;
mod simple;
mod stats;


// Re-export public types
pub use lru::LruTracker;
pub use memory::{MemoryCollection, MemoryStore, DEFAULT_MAX_ENTRIES_PER_COLLECTION, MAX_KEY_LENGTH};
pub use simple::SimpleStore;
pub use stats::EngineStats;
