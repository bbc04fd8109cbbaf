//! Keyed query cache in front of the remote gateway.
//!
//! The cache maps `(kind, key)` to the last fetched value and provides:
//! - Stale-while-revalidate reads with per-kind stale times
//! - Single in-flight fetch per key, shared by concurrent readers
//! - Retry with exponential backoff for transient failures
//! - Explicit invalidation and write-back after successful mutations
//!
//! The cache is a disposable projection: dropping it loses no data.

mod key;
mod layer;
mod types;

pub use key::{EntityKind, QueryKey};
pub use layer::QueryCache;
pub use types::{CacheResult, CacheSource, FetchStatus};
