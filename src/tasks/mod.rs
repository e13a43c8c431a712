//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Cull: removes expired entries from a store on a fixed interval

mod cull;

pub use cull::spawn_cull_task;
