use std::sync::Arc;

use crate::cache::{QueryCache, QueryKey};
use crate::error::{SyncError, SyncResult};
use crate::gateway::Gateway;
use crate::model::{Profile, ProfilePatch};

use super::optimistic::{self, RollbackPolicy};
use super::state::{SessionEvents, StateCell};

pub struct ProfileStore {
  cell: StateCell<Profile>,
  gateway: Arc<dyn Gateway>,
  cache: QueryCache,
}

impl ProfileStore {
  pub fn new(gateway: Arc<dyn Gateway>, cache: QueryCache, events: SessionEvents) -> Self {
    Self {
      cell: StateCell::new(events),
      gateway,
      cache,
    }
  }

  pub fn state(&self) -> &StateCell<Profile> {
    &self.cell
  }

  pub fn profile(&self) -> Option<Profile> {
    self.cell.data()
  }

  /// Load the profile for `user_id`, creating it on first sign-in.
  pub async fn load(&self, user_id: &str, display_name: &str) -> SyncResult<Profile> {
    let gateway = Arc::clone(&self.gateway);
    let uid = user_id.to_string();
    let name = display_name.to_string();
    let fetch = self.cache.get(QueryKey::profile(user_id), move || {
      let gateway = Arc::clone(&gateway);
      let uid = uid.clone();
      let name = name.clone();
      async move {
        match gateway.get_profile(&uid).await {
          Err(e) if e.is_not_found() => {
            tracing::info!(user_id = %uid, "Creating missing profile");
            gateway.create_profile(&uid, &name).await
          }
          result => result,
        }
      }
    });
    self
      .cell
      .load_with(async { fetch.await.map(|r| (*r.data).clone()) })
      .await
  }

  pub async fn update(&self, patch: ProfilePatch) -> SyncResult<Profile> {
    if let Err(e) = patch.validate() {
      self.cell.update(|s| s.error = Some(e.to_string()));
      return Err(e);
    }

    let user_id = self
      .cell
      .data()
      .map(|p| p.user_id)
      .ok_or(SyncError::NoSession)?;
    if patch.is_empty() {
      return self.cell.data().ok_or(SyncError::NoSession);
    }

    let gateway = Arc::clone(&self.gateway);
    let cache = self.cache.clone();
    let key = QueryKey::profile(&user_id);
    let optimistic_patch = patch.clone();
    optimistic::run(
      &self.cell,
      RollbackPolicy::Revert,
      |p| optimistic_patch.apply_to(p),
      move |_| async move { gateway.update_profile(&user_id, &patch).await },
      move |p, server| {
        *p = server.clone();
        cache.set(key, server.clone());
      },
    )
    .await
  }

  pub fn reset(&self) {
    self.cell.reset();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{cache, FakeGateway};
  use std::time::Duration;

  fn store(gateway: &Arc<FakeGateway>) -> ProfileStore {
    ProfileStore::new(gateway.clone(), cache(), SessionEvents::new())
  }

  #[tokio::test]
  async fn test_missing_profile_is_created() {
    let gateway = Arc::new(FakeGateway::new());
    let store = store(&gateway);

    let profile = store.load("u1", "Kari").await.unwrap();
    assert_eq!(profile.user_id, "u1");
    assert_eq!(gateway.calls("create_profile"), 1);
    assert!(gateway.profile("u1").is_some());
  }

  #[tokio::test]
  async fn test_load_is_served_from_cache_when_fresh() {
    let gateway = Arc::new(FakeGateway::new().with_profile(Profile {
      user_id: "u1".into(),
      ..Default::default()
    }));
    let store = store(&gateway);

    store.load("u1", "Kari").await.unwrap();
    store.load("u1", "Kari").await.unwrap();
    assert_eq!(gateway.calls("get_profile"), 1);
  }

  #[tokio::test]
  async fn test_update_reconciles_with_server() {
    let gateway = Arc::new(FakeGateway::new());
    let store = store(&gateway);
    store.load("u1", "Kari").await.unwrap();

    let profile = store
      .update(ProfilePatch {
        student_id: Some(" 12345 ".into()),
        ..Default::default()
      })
      .await
      .unwrap();

    assert_eq!(profile.student_id.as_deref(), Some("12345"));
    assert_eq!(store.profile(), Some(profile));
  }

  #[tokio::test]
  async fn test_invalid_patch_never_reaches_network() {
    let gateway = Arc::new(FakeGateway::new());
    let store = store(&gateway);
    store.load("u1", "Kari").await.unwrap();

    let result = store
      .update(ProfilePatch {
        student_id: Some("abc".into()),
        ..Default::default()
      })
      .await;

    assert!(matches!(result, Err(SyncError::Validation { .. })));
    assert_eq!(gateway.calls("update_profile"), 0);
  }

  #[tokio::test]
  async fn test_failed_update_restores_previous_state() {
    let gateway = Arc::new(FakeGateway::new());
    let store = store(&gateway);
    store.load("u1", "Kari").await.unwrap();
    let before = store.state().snapshot();

    gateway.fail("update_profile", SyncError::Network("offline".into()));
    let result = store
      .update(ProfilePatch {
        campus_id: Some("2".into()),
        ..Default::default()
      })
      .await;

    assert!(result.is_err());
    let after = store.state().snapshot();
    assert_eq!(after.status, before.status);
    assert_eq!(after.data, before.data);
    assert!(after.error.is_some());
  }

  #[tokio::test]
  async fn test_update_before_load_is_rejected() {
    let gateway = Arc::new(FakeGateway::new());
    let store = store(&gateway);

    let result = store
      .update(ProfilePatch {
        campus_id: Some("2".into()),
        ..Default::default()
      })
      .await;
    assert_eq!(result, Err(SyncError::NoSession));
  }

  #[tokio::test]
  async fn test_reset_during_failed_update_does_not_restore_profile() {
    let gateway = Arc::new(
      FakeGateway::new()
        .with_profile(Profile {
          user_id: "u1".into(),
          ..Default::default()
        })
        .with_latency(Duration::from_millis(20)),
    );
    let store = Arc::new(store(&gateway));
    store.load("u1", "Kari").await.unwrap();

    gateway.fail("update_profile", SyncError::Network("offline".into()));
    let pending = {
      let store = Arc::clone(&store);
      tokio::spawn(async move {
        store
          .update(ProfilePatch {
            campus_id: Some("2".into()),
            ..Default::default()
          })
          .await
      })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    store.reset();

    assert!(pending.await.unwrap().is_err());
    assert_eq!(store.profile(), None);
    assert_eq!(store.state().snapshot().error, None);
  }

  #[tokio::test]
  async fn test_reset_during_successful_update_leaves_cache_alone() {
    let gateway = Arc::new(
      FakeGateway::new()
        .with_profile(Profile {
          user_id: "u1".into(),
          ..Default::default()
        })
        .with_latency(Duration::from_millis(20)),
    );
    let shared = cache();
    let store = Arc::new(ProfileStore::new(gateway.clone(), shared.clone(), SessionEvents::new()));
    store.load("u1", "Kari").await.unwrap();

    let pending = {
      let store = Arc::clone(&store);
      tokio::spawn(async move {
        store
          .update(ProfilePatch {
            campus_id: Some("2".into()),
            ..Default::default()
          })
          .await
      })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    store.reset();
    shared.clear();

    assert_eq!(pending.await.unwrap(), Err(SyncError::NoSession));
    assert_eq!(store.profile(), None);
    assert!(shared.peek::<Profile>(&QueryKey::profile("u1")).is_none());
  }
}
