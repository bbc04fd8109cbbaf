//! Optimistic mutation: apply locally, write through, reconcile or roll back.

use std::future::Future;

use crate::error::{SyncError, SyncResult};

use super::state::{StateCell, StoreStatus};

/// What happens to the optimistic local change when the remote write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackPolicy {
  /// Restore the pre-mutation snapshot
  Revert,
  /// Keep the local change; only surface the error
  KeepLocal,
}

/// Run one optimistic mutation against `cell`.
///
/// 1. Wait for earlier mutations on the same store (call order)
/// 2. `apply` the change to a copy of the latest data and publish it
/// 3. `commit` the new data remotely
/// 4. On success, `reconcile` with the server response (server wins)
/// 5. On failure, apply the rollback `policy` and record the error
///
/// The store is never left in `Loading`: every path ends in `Ready`.
/// If the store is reset while the write is in flight, neither step 4 nor
/// step 5 runs; a successful write then reports `NoSession` so callers skip
/// any follow-up for the ended session.
pub async fn run<T, R, A, C, Fut, Rc>(
  cell: &StateCell<T>,
  policy: RollbackPolicy,
  apply: A,
  commit: C,
  reconcile: Rc,
) -> SyncResult<R>
where
  T: Clone + Send + Sync + 'static,
  A: FnOnce(&mut T),
  C: FnOnce(T) -> Fut,
  Fut: Future<Output = SyncResult<R>>,
  Rc: FnOnce(&mut T, &R),
{
  let _guard = cell.lock().await;
  let epoch = cell.epoch();

  let before = cell.snapshot();
  let Some(mut next) = before.data.clone() else {
    return Err(SyncError::NoSession);
  };

  apply(&mut next);
  let published = cell.update_in_epoch(epoch, |s| {
    s.status = StoreStatus::Loading;
    s.data = Some(next.clone());
    s.error = None;
  });
  if !published {
    return Err(SyncError::NoSession);
  }

  match commit(next).await {
    Ok(response) => {
      let reconciled = cell.update_in_epoch(epoch, |s| {
        if let Some(data) = s.data.as_mut() {
          reconcile(data, &response);
        }
        s.status = StoreStatus::Ready;
        s.error = None;
      });
      if !reconciled {
        tracing::debug!("Store was reset during mutation, leaving it untouched");
        return Err(SyncError::NoSession);
      }
      Ok(response)
    }
    Err(e) => {
      cell.events().report(&e);
      let message = e.to_string();
      let recorded = cell.update_in_epoch(epoch, |s| {
        if policy == RollbackPolicy::Revert {
          s.status = before.status;
          s.data = before.data;
        } else {
          s.status = StoreStatus::Ready;
        }
        s.error = Some(message);
      });
      match (recorded, policy) {
        (false, _) => tracing::debug!("Store was reset during mutation, leaving it untouched"),
        (true, RollbackPolicy::Revert) => tracing::warn!("Rolling back optimistic change: {}", e),
        (true, RollbackPolicy::KeepLocal) => {
          tracing::warn!("Remote write failed, keeping local change: {}", e)
        }
      }
      Err(e)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::stores::state::{SessionEvents, StoreState};
  use std::sync::Arc;
  use std::time::Duration;

  fn ready_cell(value: Vec<u32>) -> StateCell<Vec<u32>> {
    StateCell::with_state(StoreState::ready(Some(value)), SessionEvents::new())
  }

  #[tokio::test]
  async fn test_success_reconciles_with_server_value() {
    let cell = ready_cell(vec![1]);

    let result = run(
      &cell,
      RollbackPolicy::Revert,
      |v| v.push(2),
      |_next| async { Ok(vec![1, 2, 99]) },
      |data, server| *data = server.clone(),
    )
    .await;

    assert_eq!(result.unwrap(), vec![1, 2, 99]);
    assert_eq!(cell.snapshot(), StoreState::ready(Some(vec![1, 2, 99])));
  }

  #[tokio::test]
  async fn test_failure_reverts_to_previous_state() {
    let cell = ready_cell(vec![1]);
    let before = cell.snapshot();

    let result = run(
      &cell,
      RollbackPolicy::Revert,
      |v| v.push(2),
      |_next| async { Err::<(), _>(SyncError::Network("down".into())) },
      |_, _| {},
    )
    .await;

    assert!(result.is_err());
    let after = cell.snapshot();
    assert_eq!(after.status, before.status);
    assert_eq!(after.data, before.data);
    assert!(after.error.is_some());
  }

  #[tokio::test]
  async fn test_keep_local_policy_keeps_change() {
    let cell = ready_cell(vec![1]);

    let result = run(
      &cell,
      RollbackPolicy::KeepLocal,
      |v| v.push(2),
      |_next| async { Err::<(), _>(SyncError::from_status(500, "boom")) },
      |_, _| {},
    )
    .await;

    assert!(result.is_err());
    let after = cell.snapshot();
    assert_eq!(after.data, Some(vec![1, 2]));
    assert_eq!(after.status, StoreStatus::Ready);
  }

  #[tokio::test]
  async fn test_unloaded_store_is_rejected() {
    let cell: StateCell<Vec<u32>> = StateCell::new(SessionEvents::new());
    let result = run(
      &cell,
      RollbackPolicy::Revert,
      |v| v.push(1),
      |_next| async { Ok(()) },
      |_, _| {},
    )
    .await;
    assert_eq!(result, Err(SyncError::NoSession));
  }

  #[tokio::test]
  async fn test_mutations_apply_on_latest_snapshot() {
    let cell = Arc::new(ready_cell(vec![]));

    let slow = {
      let cell = Arc::clone(&cell);
      tokio::spawn(async move {
        run(
          &*cell,
          RollbackPolicy::Revert,
          |v| v.push(1),
          |next| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(next)
          },
          |data, server| *data = server.clone(),
        )
        .await
      })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    let second = run(
      &*cell,
      RollbackPolicy::Revert,
      |v| v.push(2),
      |next| async move { Ok(next) },
      |data, server| *data = server.clone(),
    )
    .await
    .unwrap();

    slow.await.unwrap().unwrap();
    assert_eq!(second, vec![1, 2]);
    assert_eq!(cell.data(), Some(vec![1, 2]));
  }

  #[tokio::test]
  async fn test_reset_during_failed_write_skips_rollback() {
    let cell = Arc::new(ready_cell(vec![1]));

    let pending = {
      let cell = Arc::clone(&cell);
      tokio::spawn(async move {
        run(
          &*cell,
          RollbackPolicy::Revert,
          |v| v.push(2),
          |_next| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<(), _>(SyncError::Network("down".into()))
          },
          |_, _| {},
        )
        .await
      })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    cell.reset();

    assert!(matches!(pending.await.unwrap(), Err(SyncError::Network(_))));
    assert_eq!(cell.snapshot(), StoreState::default());
  }

  #[tokio::test]
  async fn test_reset_during_successful_write_skips_reconcile() {
    let cell = Arc::new(ready_cell(vec![1]));

    let pending = {
      let cell = Arc::clone(&cell);
      tokio::spawn(async move {
        run(
          &*cell,
          RollbackPolicy::Revert,
          |v| v.push(2),
          |next| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(next)
          },
          |data, server| *data = server.clone(),
        )
        .await
      })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    cell.reset();

    assert_eq!(pending.await.unwrap(), Err(SyncError::NoSession));
    assert_eq!(cell.data(), None);
  }
}
