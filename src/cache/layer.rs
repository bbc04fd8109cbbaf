//! Query cache that orchestrates staleness, single-flight fetching and retries.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::config::CacheConfig;
use crate::error::{SyncError, SyncResult};

use super::key::{EntityKind, QueryKey};
use super::types::{CacheResult, FetchStatus};

type AnyData = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, SyncResult<AnyData>>>;

#[derive(Default)]
struct Entry {
  data: Option<AnyData>,
  fetched_at: Option<Instant>,
  status: FetchStatus,
  error: Option<SyncError>,
  invalidated: bool,
  /// Bumped whenever a fetch starts or the entry is overwritten; a fetch
  /// only writes back if its generation is still current.
  generation: u64,
  inflight: Option<SharedFetch>,
}

struct Inner {
  entries: Mutex<HashMap<QueryKey, Entry>>,
  config: CacheConfig,
}

impl Inner {
  fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
    // No entry invariant spans a panic point.
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn complete(&self, key: &QueryKey, generation: u64, result: &SyncResult<AnyData>) {
    let mut entries = self.lock();
    let Some(entry) = entries.get_mut(key) else {
      tracing::debug!(%key, "Discarding fetch result for cleared entry");
      return;
    };
    if entry.generation != generation {
      tracing::debug!(%key, "Discarding superseded fetch result");
      return;
    }

    entry.inflight = None;
    match result {
      Ok(data) => {
        entry.data = Some(Arc::clone(data));
        entry.fetched_at = Some(Instant::now());
        entry.status = FetchStatus::Idle;
        entry.error = None;
        entry.invalidated = false;
      }
      Err(e) => {
        entry.status = FetchStatus::Error;
        entry.error = Some(e.clone());
      }
    }
  }
}

/// Keyed cache of gateway results with stale-while-revalidate semantics.
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct QueryCache {
  inner: Arc<Inner>,
}

impl QueryCache {
  pub fn new(config: CacheConfig) -> Self {
    Self {
      inner: Arc::new(Inner {
        entries: Mutex::new(HashMap::new()),
        config,
      }),
    }
  }

  pub fn config(&self) -> &CacheConfig {
    &self.inner.config
  }

  /// Read through the cache.
  ///
  /// 1. Fresh entry: return it, no network
  /// 2. Entry aged past its stale time: return it immediately and refetch in
  ///    the background
  /// 3. Invalidated entry or no value yet: wait for the fetch (joining one
  ///    already in flight)
  ///
  /// Transient failures are retried with backoff before the error reaches
  /// the caller; `Unauthorized` and other permanent errors are not retried.
  pub async fn get<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> SyncResult<CacheResult<Arc<T>>>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SyncResult<T>> + Send + 'static,
  {
    let stale_time = self.inner.config.stale_time(key.kind);

    let (stale, fetch) = {
      let mut entries = self.inner.lock();
      let entry = entries.entry(key.clone()).or_default();

      if let (Some(data), Some(fetched_at)) = (&entry.data, entry.fetched_at) {
        let age = fetched_at.elapsed();
        if !entry.invalidated && age < stale_time {
          return downcast::<T>(&key, data).map(|d| CacheResult::from_cache(d, age, false));
        }
      }

      let fetch = match &entry.inflight {
        Some(fetch) => fetch.clone(),
        None => self.start_fetch(&key, entry, fetcher),
      };
      // An invalidated value is known to be outdated and is never served.
      let stale = if entry.invalidated {
        None
      } else {
        entry
          .data
          .clone()
          .map(|d| (d, entry.fetched_at.map(|t| t.elapsed()).unwrap_or_default()))
      };
      (stale, fetch)
    };

    match stale {
      Some((data, age)) => {
        tracing::debug!(%key, "Serving stale data while revalidating");
        downcast::<T>(&key, &data).map(|d| CacheResult::from_cache(d, age, true))
      }
      None => {
        let data = fetch.await?;
        downcast::<T>(&key, &data).map(CacheResult::from_network)
      }
    }
  }

  /// Start a fetch for `key` and register it as the entry's in-flight fetch.
  ///
  /// The fetch is driven by its own task, so it completes and writes back
  /// even if every caller awaiting it goes away.
  fn start_fetch<T, F, Fut>(&self, key: &QueryKey, entry: &mut Entry, fetcher: F) -> SharedFetch
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SyncResult<T>> + Send + 'static,
  {
    entry.generation += 1;
    entry.status = FetchStatus::Loading;
    let generation = entry.generation;

    let inner = Arc::clone(&self.inner);
    let key = key.clone();
    let fetch = async move {
      let result = fetch_with_retry(&inner.config, &key, &fetcher)
        .await
        .map(|value| Arc::new(value) as AnyData);
      inner.complete(&key, generation, &result);
      result
    }
    .boxed()
    .shared();

    entry.inflight = Some(fetch.clone());
    tokio::spawn(fetch.clone());
    fetch
  }

  /// Mark an entry stale so the next `get` refetches even inside the stale window.
  pub fn invalidate(&self, key: &QueryKey) {
    let mut entries = self.inner.lock();
    if let Some(entry) = entries.get_mut(key) {
      entry.invalidated = true;
      entry.generation += 1;
      entry.inflight = None;
      if entry.status == FetchStatus::Loading {
        entry.status = FetchStatus::Idle;
      }
      tracing::debug!(%key, "Invalidated");
    }
  }

  /// Invalidate every entry of one kind.
  pub fn invalidate_kind(&self, kind: EntityKind) {
    let keys: Vec<QueryKey> = self
      .inner
      .lock()
      .keys()
      .filter(|k| k.kind == kind)
      .cloned()
      .collect();
    for key in keys {
      self.invalidate(&key);
    }
  }

  /// Write an authoritative value (e.g. a server response after a mutation).
  pub fn set<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) -> Arc<T> {
    let value = Arc::new(value);
    let mut entries = self.inner.lock();
    let entry = entries.entry(key).or_default();
    entry.generation += 1;
    entry.inflight = None;
    entry.data = Some(Arc::clone(&value) as AnyData);
    entry.fetched_at = Some(Instant::now());
    entry.status = FetchStatus::Idle;
    entry.error = None;
    entry.invalidated = false;
    value
  }

  /// Last known value without triggering a fetch.
  pub fn peek<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
    let entries = self.inner.lock();
    entries
      .get(key)
      .and_then(|e| e.data.as_ref())
      .and_then(|d| Arc::clone(d).downcast::<T>().ok())
  }

  pub fn status(&self, key: &QueryKey) -> FetchStatus {
    self
      .inner
      .lock()
      .get(key)
      .map(|e| e.status)
      .unwrap_or_default()
  }

  pub fn last_error(&self, key: &QueryKey) -> Option<SyncError> {
    self.inner.lock().get(key).and_then(|e| e.error.clone())
  }

  /// Drop a single entry. In-flight fetches for it will not write back.
  pub fn remove(&self, key: &QueryKey) {
    self.inner.lock().remove(key);
  }

  /// Drop everything (sign-out). In-flight fetches will not write back.
  pub fn clear(&self) {
    self.inner.lock().clear();
  }
}

fn downcast<T: Send + Sync + 'static>(key: &QueryKey, data: &AnyData) -> SyncResult<Arc<T>> {
  Arc::clone(data).downcast::<T>().map_err(|_| SyncError::Decode {
    what: "cache entry",
    message: format!("type mismatch for {}", key),
  })
}

async fn fetch_with_retry<T, F, Fut>(config: &CacheConfig, key: &QueryKey, fetcher: &F) -> SyncResult<T>
where
  F: Fn() -> Fut,
  Fut: Future<Output = SyncResult<T>>,
{
  let mut attempt = 0;
  loop {
    match fetcher().await {
      Ok(value) => return Ok(value),
      Err(e) if e.is_retryable() && attempt < config.retries => {
        let delay = config.retry_delay(attempt);
        tracing::warn!(%key, attempt = attempt + 1, ?delay, "Fetch failed, retrying: {}", e);
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
      Err(e) => {
        tracing::warn!(%key, "Fetch failed: {}", e);
        return Err(e);
      }
    }
  }
}

impl std::fmt::Debug for QueryCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryCache")
      .field("entries", &self.inner.lock().len())
      .finish_non_exhaustive()
  }
}
