//! Query observer for consumers that poll from an event loop.
//!
//! A `Query<T>` binds one cache key and fetcher to a consumer (a screen, a
//! CLI command). Fetches go through the shared [`QueryCache`], so several
//! observers of the same key still cause a single gateway call. Results are
//! delivered over a channel owned by the observer: once the observer is
//! cancelled or dropped, late results are discarded instead of being applied
//! to state that no longer exists.
//!
//! # Example
//!
//! ```ignore
//! let gateway = engine.gateway();
//! let mut query = Query::new(engine.cache().clone(), QueryKey::campuses(), move || {
//!     let gateway = gateway.clone();
//!     async move { gateway.list_campuses().await }
//! });
//!
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, re-render
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc;

use crate::cache::{CacheSource, QueryCache, QueryKey};
use crate::error::SyncResult;

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type FetcherFn<T> = Arc<dyn Fn() -> BoxFuture<'static, SyncResult<T>> + Send + Sync>;
type FetchOutcome<T> = SyncResult<(Arc<T>, CacheSource)>;

/// Cache-backed query with polled state.
pub struct Query<T> {
  state: QueryState<Arc<T>>,
  cache: QueryCache,
  key: QueryKey,
  fetcher: FetcherFn<T>,
  receiver: Option<mpsc::UnboundedReceiver<FetchOutcome<T>>>,
  source: Option<CacheSource>,
  fetched_at: Option<Instant>,
  stale_time: Duration,
}

impl<T: Send + Sync + 'static> Query<T> {
  /// Create a new query for `key`.
  ///
  /// The fetcher is called by the cache whenever the key needs (re)fetching.
  pub fn new<F, Fut>(cache: QueryCache, key: QueryKey, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SyncResult<T>> + Send + 'static,
  {
    let stale_time = cache.config().stale_time(key.kind);
    Self {
      state: QueryState::Idle,
      cache,
      key,
      fetcher: Arc::new(move || fetcher().boxed()),
      receiver: None,
      source: None,
      fetched_at: None,
      stale_time,
    }
  }

  /// Override the stale time used by `is_stale()`.
  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_time = duration;
    self
  }

  pub fn state(&self) -> &QueryState<Arc<T>> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data().map(|d| d.as_ref())
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  /// Where the last delivered data came from.
  pub fn source(&self) -> Option<CacheSource> {
    self.source
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&str> {
    self.state.error()
  }

  /// Check if the delivered data is older than the stale time.
  pub fn is_stale(&self) -> bool {
    match &self.state {
      QueryState::Success(_) => self
        .fetched_at
        .map(|t| t.elapsed() > self.stale_time)
        .unwrap_or(true),
      _ => false,
    }
  }

  /// Start fetching if not already loading.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Invalidate the key and fetch again, discarding any pending result.
  pub fn refetch(&mut self) {
    self.receiver = None;
    self.cache.invalidate(&self.key);
    self.start_fetch();
  }

  /// Stop listening. A pending result will never be applied.
  pub fn cancel(&mut self) {
    self.receiver = None;
    if self.state.is_loading() {
      self.state = QueryState::Idle;
    }
  }

  /// Poll for results from a pending fetch.
  ///
  /// Returns `true` if the state changed (data arrived or error occurred).
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok((data, source))) => {
        self.state = QueryState::Success(data);
        self.source = Some(source);
        self.fetched_at = Some(Instant::now());
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(error.to_string());
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.state = QueryState::Error("Query was cancelled".to_string());
        self.receiver = None;
        true
      }
    }
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = QueryState::Loading;

    let cache = self.cache.clone();
    let key = self.key.clone();
    let fetcher = Arc::clone(&self.fetcher);
    tokio::spawn(async move {
      let result = cache
        .get(key, move || fetcher())
        .await
        .map(|r| (r.data, r.source));
      // Receiver may have been dropped by cancel() or teardown
      let _ = tx.send(result);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("state", &self.state)
      .field("fetched_at", &self.fetched_at)
      .field("stale_time", &self.stale_time)
      .finish_non_exhaustive()
  }
}
