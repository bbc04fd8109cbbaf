//! Result and status types returned by the query cache.

use std::time::Duration;

/// Result from a cache lookup, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// Age of the data when it was returned (if from cache)
  pub age: Option<Duration>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      age: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, age: Duration, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      age: Some(age),
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      age: self.age,
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched by this call (or the in-flight fetch it joined)
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache past its stale time; a background refetch is running
  CacheStale,
}

/// Fetch status of a cache entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchStatus {
  #[default]
  Idle,
  Loading,
  Error,
}
