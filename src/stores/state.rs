//! Observable store state and the machinery shared by every store.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, watch, Mutex, MutexGuard};

use crate::error::{SyncError, SyncResult};

/// Lifecycle of a store.
///
/// `Uninitialized → Loading → Ready`; any mutation goes `Ready → Loading →
/// Ready`. A failed first load ends in `Error`, from which `load` retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreStatus {
  #[default]
  Uninitialized,
  Loading,
  Ready,
  Error,
}

/// Snapshot published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreState<T> {
  pub status: StoreStatus,
  pub data: Option<T>,
  /// Message for the UI; cleared on the next success or by `clear_error`
  pub error: Option<String>,
}

impl<T> Default for StoreState<T> {
  fn default() -> Self {
    Self {
      status: StoreStatus::Uninitialized,
      data: None,
      error: None,
    }
  }
}

impl<T> StoreState<T> {
  pub fn ready(data: Option<T>) -> Self {
    Self {
      status: StoreStatus::Ready,
      data,
      error: None,
    }
  }

  pub fn is_ready(&self) -> bool {
    self.status == StoreStatus::Ready
  }
}

/// Session-level events shared by all stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
  SignedIn(String),
  SignedOut,
  /// A backend call was rejected because the session is no longer valid
  Unauthorized,
}

#[derive(Debug, Clone)]
pub struct SessionEvents {
  tx: broadcast::Sender<SessionEvent>,
}

impl Default for SessionEvents {
  fn default() -> Self {
    Self::new()
  }
}

impl SessionEvents {
  pub fn new() -> Self {
    let (tx, _) = broadcast::channel(16);
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
    self.tx.subscribe()
  }

  pub fn emit(&self, event: SessionEvent) {
    // No subscribers is fine
    let _ = self.tx.send(event);
  }

  /// Escalate `Unauthorized` so the session can be torn down.
  pub fn report(&self, err: &SyncError) {
    if err.is_unauthorized() {
      tracing::warn!("Session rejected by backend: {}", err);
      self.emit(SessionEvent::Unauthorized);
    }
  }
}

/// Holder of one store's state.
///
/// State is published through a watch channel; mutations are serialized in
/// call order by a FIFO lock, so each one applies on top of the latest state.
///
/// `reset` starts a new epoch without waiting for the lock; loads and
/// mutations begun in an earlier epoch never write their outcome back.
pub struct StateCell<T> {
  tx: watch::Sender<StoreState<T>>,
  mutations: Mutex<()>,
  epoch: AtomicU64,
  events: SessionEvents,
}

impl<T: Clone + Send + Sync + 'static> StateCell<T> {
  pub fn new(events: SessionEvents) -> Self {
    Self::with_state(StoreState::default(), events)
  }

  pub fn with_state(state: StoreState<T>, events: SessionEvents) -> Self {
    let (tx, _) = watch::channel(state);
    Self {
      tx,
      mutations: Mutex::new(()),
      epoch: AtomicU64::new(0),
      events,
    }
  }

  pub fn snapshot(&self) -> StoreState<T> {
    self.tx.borrow().clone()
  }

  pub fn data(&self) -> Option<T> {
    self.tx.borrow().data.clone()
  }

  pub fn status(&self) -> StoreStatus {
    self.tx.borrow().status
  }

  pub fn subscribe(&self) -> watch::Receiver<StoreState<T>> {
    self.tx.subscribe()
  }

  pub fn clear_error(&self) {
    self.tx.send_if_modified(|s| s.error.take().is_some());
  }

  pub fn update(&self, f: impl FnOnce(&mut StoreState<T>)) {
    self.tx.send_modify(f);
  }

  /// Replace the whole state (reset on sign-out, synchronous local writes).
  pub fn replace(&self, state: StoreState<T>) {
    self.tx.send_replace(state);
  }

  /// Drop all state (sign-out). Work still in flight is discarded when it lands.
  pub fn reset(&self) {
    self.reset_to(StoreState::default());
  }

  /// Like `reset`, but publish `state` for the new epoch.
  pub fn reset_to(&self, state: StoreState<T>) {
    self.epoch.fetch_add(1, Ordering::SeqCst);
    self.tx.send_replace(state);
  }

  pub(crate) fn epoch(&self) -> u64 {
    self.epoch.load(Ordering::SeqCst)
  }

  /// Apply `f` only if no reset happened since `epoch`. Returns whether it ran.
  pub(crate) fn update_in_epoch(&self, epoch: u64, f: impl FnOnce(&mut StoreState<T>)) -> bool {
    self.tx.send_if_modified(|s| {
      if self.epoch() != epoch {
        return false;
      }
      f(s);
      true
    })
  }

  pub(crate) fn events(&self) -> &SessionEvents {
    &self.events
  }

  pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
    self.mutations.lock().await
  }

  /// Record a failure: keep last-good data if there is any.
  pub(crate) fn fail(&self, err: &SyncError) {
    self.events.report(err);
    self.update(|s| record_failure(s, err));
  }

  /// Run a load: `Loading`, then `Ready` with the result or a failure state.
  ///
  /// Serialized with mutations so a load never lands on top of an
  /// in-flight optimistic change.
  pub async fn load_with<Fut>(&self, fetch: Fut) -> SyncResult<T>
  where
    Fut: Future<Output = SyncResult<T>>,
  {
    let _guard = self.lock().await;
    let epoch = self.epoch();
    self.update(|s| s.status = StoreStatus::Loading);

    match fetch.await {
      Ok(data) => {
        let published = self.update_in_epoch(epoch, |s| *s = StoreState::ready(Some(data.clone())));
        if !published {
          tracing::debug!("Store was reset during load, discarding result");
          return Err(SyncError::NoSession);
        }
        Ok(data)
      }
      Err(e) => {
        self.events.report(&e);
        self.update_in_epoch(epoch, |s| record_failure(s, &e));
        Err(e)
      }
    }
  }
}

fn record_failure<T>(state: &mut StoreState<T>, err: &SyncError) {
  state.status = if state.data.is_some() {
    StoreStatus::Ready
  } else {
    StoreStatus::Error
  };
  state.error = Some(err.to_string());
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::time::Duration;

  #[tokio::test]
  async fn test_load_success() {
    let cell: StateCell<u32> = StateCell::new(SessionEvents::new());
    assert_eq!(cell.status(), StoreStatus::Uninitialized);

    let value = cell.load_with(async { Ok(5) }).await.unwrap();
    assert_eq!(value, 5);
    assert_eq!(cell.snapshot(), StoreState::ready(Some(5)));
  }

  #[tokio::test]
  async fn test_first_load_failure_is_error_state() {
    let cell: StateCell<u32> = StateCell::new(SessionEvents::new());
    let result = cell
      .load_with(async { Err(SyncError::Network("down".into())) })
      .await;

    assert!(result.is_err());
    let state = cell.snapshot();
    assert_eq!(state.status, StoreStatus::Error);
    assert!(state.error.is_some());

    // Retry goes back through Loading to Ready
    cell.load_with(async { Ok(1) }).await.unwrap();
    assert_eq!(cell.snapshot(), StoreState::ready(Some(1)));
  }

  #[tokio::test]
  async fn test_failed_reload_keeps_last_good_data() {
    let cell: StateCell<u32> = StateCell::new(SessionEvents::new());
    cell.load_with(async { Ok(3) }).await.unwrap();
    let _ = cell
      .load_with(async { Err(SyncError::from_status(500, "boom")) })
      .await;

    let state = cell.snapshot();
    assert_eq!(state.status, StoreStatus::Ready);
    assert_eq!(state.data, Some(3));
    assert!(state.error.is_some());

    cell.clear_error();
    assert_eq!(cell.snapshot().error, None);
  }

  #[tokio::test]
  async fn test_unauthorized_is_broadcast() {
    let events = SessionEvents::new();
    let mut rx = events.subscribe();
    let cell: StateCell<u32> = StateCell::new(events);

    let _ = cell
      .load_with(async { Err(SyncError::Unauthorized("expired".into())) })
      .await;

    assert_eq!(rx.recv().await.unwrap(), SessionEvent::Unauthorized);
  }

  #[tokio::test]
  async fn test_reset_discards_load_in_flight() {
    let cell: Arc<StateCell<u32>> = Arc::new(StateCell::new(SessionEvents::new()));
    let pending = {
      let cell = Arc::clone(&cell);
      tokio::spawn(async move {
        cell
          .load_with(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(9)
          })
          .await
      })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    cell.reset();

    assert_eq!(pending.await.unwrap(), Err(SyncError::NoSession));
    assert_eq!(cell.snapshot(), StoreState::default());

    // The next epoch loads normally
    cell.load_with(async { Ok(1) }).await.unwrap();
    assert_eq!(cell.data(), Some(1));
  }
}
