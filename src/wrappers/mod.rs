//! Wrappers Module
//!
//! Decorators that implement the full [`KeyValue`](crate::contract::KeyValue)
//! protocol by delegating to an inner store and adding one concern each.
//!
//! Write path: the outermost wrapper transforms first and the innermost store
//! writes last. Read path: the innermost store resolves first and each wrapper
//! transforms the result on the way out.

/// Implements `store_id` and `lineage` for a wrapper with an `id` field and
/// one inner store.
macro_rules! wrapper_identity {
    ($name:literal, $inner:ident) => {
        fn store_id(&self) -> $crate::contract::StoreId {
            self.id
        }

        fn store_name(&self) -> &'static str {
            $name
        }

        fn lineage(&self) -> Vec<$crate::contract::StoreId> {
            let mut lineage = vec![self.id];
            lineage.extend(self.$inner.lineage());
            lineage
        }
    };
}

/// Forwards every optional capability to the inner store unchanged.
macro_rules! forward_capabilities {
    ($inner:ident) => {
        fn as_enumerate_keys(&self) -> Option<&dyn $crate::contract::EnumerateKeys> {
            self.$inner.as_enumerate_keys()
        }

        fn as_enumerate_collections(&self) -> Option<&dyn $crate::contract::EnumerateCollections> {
            self.$inner.as_enumerate_collections()
        }

        fn as_destroy_store(&self) -> Option<&dyn $crate::contract::DestroyStore> {
            self.$inner.as_destroy_store()
        }

        fn as_destroy_collection(&self) -> Option<&dyn $crate::contract::DestroyCollection> {
            self.$inner.as_destroy_collection()
        }

        fn as_cull(&self) -> Option<&dyn $crate::contract::Cull> {
            self.$inner.as_cull()
        }
    };
}

mod circuit_breaker;
mod compression;
mod default_value;
mod encryption;
mod fallback;
mod limit_size;
mod passthrough_cache;
mod prefix;
mod read_only;
mod retry;
mod routing;
mod statistics;
mod timeout;
mod ttl_clamp;

#[cfg(test)]
pub(crate) mod testing;

pub use circuit_breaker::{
    CircuitBreakerWrapper, CircuitState, DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT,
    DEFAULT_SUCCESS_THRESHOLD,
};
pub use compression::{CompressionWrapper, DEFAULT_COMPRESSION_THRESHOLD};
pub use default_value::DefaultValueWrapper;
pub use encryption::{EncryptionWrapper, ENCRYPTION_KEY_SIZE};
pub use fallback::FallbackWrapper;
pub use limit_size::LimitSizeWrapper;
pub use passthrough_cache::{PassthroughCacheWrapper, DEFAULT_CACHE_TTL};
pub use prefix::{PrefixCollectionsWrapper, PrefixKeysWrapper, SingleCollectionWrapper};
pub use read_only::ReadOnlyWrapper;
pub use retry::{RetryPolicy, RetryWrapper};
pub use routing::CollectionRoutingWrapper;
pub use statistics::{CollectionStatistics, OperationStats, StatisticsWrapper, StoreStatistics};
pub use timeout::{TimeoutWrapper, DEFAULT_TIMEOUT};
pub use ttl_clamp::TtlClampWrapper;
