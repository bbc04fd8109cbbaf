use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cache::{QueryCache, QueryKey};
use crate::error::{SyncError, SyncResult};
use crate::gateway::Gateway;
use crate::model::FollowedDepartments;

use super::optimistic::{self, RollbackPolicy};
use super::state::{SessionEvents, StateCell};

/// Departments the user follows, stored remotely as one list document.
///
/// Toggling re-reads the remote list right before writing it back. This
/// narrows, but does not close, the window in which a write from another
/// device can be lost.
pub struct DepartmentFollowStore {
  cell: StateCell<FollowedDepartments>,
  gateway: Arc<dyn Gateway>,
  cache: QueryCache,
}

impl DepartmentFollowStore {
  pub fn new(gateway: Arc<dyn Gateway>, cache: QueryCache, events: SessionEvents) -> Self {
    Self {
      cell: StateCell::new(events),
      gateway,
      cache,
    }
  }

  pub fn state(&self) -> &StateCell<FollowedDepartments> {
    &self.cell
  }

  pub fn followed(&self) -> BTreeSet<String> {
    self
      .cell
      .data()
      .map(|f| f.department_ids)
      .unwrap_or_default()
  }

  pub fn is_following(&self, department_id: &str) -> bool {
    self
      .cell
      .snapshot()
      .data
      .is_some_and(|f| f.contains(department_id))
  }

  pub async fn load(&self, user_id: &str) -> SyncResult<FollowedDepartments> {
    let gateway = Arc::clone(&self.gateway);
    let uid = user_id.to_string();
    let fetch = self
      .cache
      .get(QueryKey::followed_departments(user_id), move || {
        let gateway = Arc::clone(&gateway);
        let uid = uid.clone();
        async move { fetch_remote(gateway.as_ref(), &uid).await }
      });
    self
      .cell
      .load_with(async { fetch.await.map(|r| (*r.data).clone()) })
      .await
  }

  /// Follow or unfollow `department_id`. Returns whether it is now followed.
  pub async fn toggle(&self, department_id: &str) -> SyncResult<bool> {
    let user_id = self
      .cell
      .data()
      .map(|f| f.user_id)
      .ok_or(SyncError::NoSession)?;

    let gateway = Arc::clone(&self.gateway);
    let cache = self.cache.clone();
    let key = QueryKey::followed_departments(&user_id);
    let department = department_id.to_string();
    let server = optimistic::run(
      &self.cell,
      RollbackPolicy::Revert,
      |f| {
        if !f.department_ids.remove(department_id) {
          f.department_ids.insert(department_id.to_string());
        }
      },
      move |next| async move {
        let follow = next.contains(&department);
        let mut latest = fetch_remote(gateway.as_ref(), &user_id).await?;
        if follow {
          latest.department_ids.insert(department);
        } else {
          latest.department_ids.remove(&department);
        }
        gateway.put_followed_departments(&latest).await
      },
      move |f, server| {
        *f = server.clone();
        cache.set(key, server.clone());
      },
    )
    .await?;

    let following = server.contains(department_id);
    tracing::debug!(department_id, following, "Department follow toggled");
    Ok(following)
  }

  pub fn reset(&self) {
    self.cell.reset();
  }
}

/// A user without a list document follows nothing.
async fn fetch_remote(gateway: &dyn Gateway, user_id: &str) -> SyncResult<FollowedDepartments> {
  match gateway.get_followed_departments(user_id).await {
    Err(e) if e.is_not_found() => Ok(FollowedDepartments::empty(user_id)),
    result => result,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{cache, FakeGateway};

  async fn loaded(gateway: &Arc<FakeGateway>) -> DepartmentFollowStore {
    let store = DepartmentFollowStore::new(gateway.clone(), cache(), SessionEvents::new());
    store.load("u1").await.unwrap();
    store
  }

  #[tokio::test]
  async fn test_missing_document_means_nothing_followed() {
    let gateway = Arc::new(FakeGateway::new());
    let store = loaded(&gateway).await;
    assert!(store.followed().is_empty());
  }

  #[tokio::test]
  async fn test_toggle_follows_then_unfollows() {
    let gateway = Arc::new(FakeGateway::new());
    let store = loaded(&gateway).await;

    assert!(store.toggle("d1").await.unwrap());
    assert!(store.is_following("d1"));
    assert!(gateway.followed("u1").contains("d1"));

    assert!(!store.toggle("d1").await.unwrap());
    assert!(!store.is_following("d1"));
    assert!(gateway.followed("u1").is_empty());
  }

  #[tokio::test]
  async fn test_toggle_keeps_changes_made_elsewhere() {
    let gateway = Arc::new(FakeGateway::new());
    let store = loaded(&gateway).await;

    // Another device follows d9 after our load
    gateway.set_followed("u1", &["d9"]);
    store.toggle("d1").await.unwrap();

    let remote = gateway.followed("u1");
    assert!(remote.contains("d1"));
    assert!(remote.contains("d9"));
    assert!(store.is_following("d9"));
    assert_eq!(gateway.calls("get_followed_departments"), 2);
  }

  #[tokio::test]
  async fn test_failed_toggle_reverts() {
    let gateway = Arc::new(FakeGateway::new());
    let store = loaded(&gateway).await;
    let before = store.state().snapshot();

    gateway.fail("put_followed_departments", SyncError::from_status(502, "bad gateway"));
    assert!(store.toggle("d1").await.is_err());

    let after = store.state().snapshot();
    assert_eq!(after.data, before.data);
    assert_eq!(after.status, before.status);
    assert!(!store.is_following("d1"));
  }

  #[tokio::test]
  async fn test_toggle_requires_loaded_store() {
    let gateway = Arc::new(FakeGateway::new());
    let store = DepartmentFollowStore::new(gateway.clone(), cache(), SessionEvents::new());
    assert_eq!(store.toggle("d1").await, Err(SyncError::NoSession));
  }
}
