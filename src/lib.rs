//! Synchronized entity cache for the BISO client: a remote data gateway, a
//! query cache, a device-local store and the client state stores built on them.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod local;
pub mod logging;
pub mod model;
pub mod query;
pub mod stores;

#[cfg(test)]
mod testing;

pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
