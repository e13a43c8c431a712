//! Cull Task
//!
//! Background task that periodically sweeps expired entries out of a store
//! exposing the cull capability.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::contract::{require_cull, KeyValue};

/// Spawns a background task that culls `store` every `interval`.
///
/// # Arguments
/// * `store` - The store to sweep; it must expose the cull capability
/// * `interval` - Time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown. The task ends on its own when the store cannot
/// cull.
///
/// # Example
/// ```ignore
/// let store = Arc::new(MemoryStore::new(1000));
/// let cull_handle = spawn_cull_task(store.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// cull_handle.abort();
/// ```
pub fn spawn_cull_task(store: Arc<dyn KeyValue>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        if store.as_cull().is_none() {
            warn!(store = store.store_name(), "Store cannot cull, cull task not started");
            return;
        }
        info!(interval_ms = interval.as_millis() as u64, "Starting cull task");

        loop {
            tokio::time::sleep(interval).await;

            let culled = match require_cull(store.as_ref()) {
                Ok(culler) => culler.cull().await,
                Err(e) => Err(e),
            };
            match culled {
                Ok(0) => debug!("Cull: no expired entries found"),
                Ok(removed) => info!(removed, "Cull: removed expired entries"),
                Err(e) => warn!(error = %e, "Cull sweep failed"),
            }
        }
    })
}
