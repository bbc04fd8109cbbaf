use std::sync::Arc;

use crate::cache::{QueryCache, QueryKey};
use crate::error::{SyncError, SyncResult};
use crate::gateway::Gateway;
use crate::local::{keys, LocalStore};
use crate::model::{AccountPreferences, Session, ACCOUNT_PREFERENCES_VERSION};

use super::optimistic::{self, RollbackPolicy};
use super::state::{SessionEvent, SessionEvents, StateCell, StoreState};

const MAX_NAME_LEN: usize = 128;

/// The signed-in account. `Ready` with no data means signed out.
pub struct AuthStore {
  cell: StateCell<Session>,
  gateway: Arc<dyn Gateway>,
  cache: QueryCache,
  local: LocalStore,
}

impl AuthStore {
  pub fn new(
    gateway: Arc<dyn Gateway>,
    cache: QueryCache,
    local: LocalStore,
    events: SessionEvents,
  ) -> Self {
    Self {
      cell: StateCell::new(events),
      gateway,
      cache,
      local,
    }
  }

  pub fn state(&self) -> &StateCell<Session> {
    &self.cell
  }

  pub fn session(&self) -> Option<Session> {
    self.cell.data()
  }

  pub fn user_id(&self) -> Option<String> {
    self.cell.data().map(|s| s.user_id)
  }

  pub fn is_signed_in(&self) -> bool {
    self.cell.snapshot().data.is_some()
  }

  /// Resume the session whose token was stored on this device.
  ///
  /// A token the backend rejects is discarded. Any other failure keeps the
  /// token so a later `load` can retry.
  pub async fn restore(&self) -> SyncResult<Option<Session>> {
    let Some(token) = self.local.get::<String>(keys::SESSION) else {
      self.cell.replace(StoreState::ready(None));
      return Ok(None);
    };

    self.gateway.set_session_token(Some(token));
    match self.load().await {
      Ok(session) => {
        tracing::info!(user_id = %session.user_id, "Session restored");
        Ok(Some(session))
      }
      Err(e) if e.is_unauthorized() => {
        tracing::info!("Stored session is no longer valid");
        self.force_sign_out();
        Ok(None)
      }
      Err(e) => Err(e),
    }
  }

  pub async fn load(&self) -> SyncResult<Session> {
    let gateway = Arc::clone(&self.gateway);
    let fetch = self.cache.get(QueryKey::account(), move || {
      let gateway = Arc::clone(&gateway);
      async move { gateway.get_account().await }
    });
    self
      .cell
      .load_with(async { fetch.await.map(|r| (*r.data).clone()) })
      .await
  }

  pub async fn sign_in(&self, user_id: &str, secret: &str) -> SyncResult<Session> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
      return Err(SyncError::validation("user_id", "must not be empty"));
    }
    if secret.is_empty() {
      return Err(SyncError::validation("secret", "must not be empty"));
    }

    let token = match self.gateway.create_session(user_id, secret).await {
      Ok(token) => token,
      Err(e) => {
        self.cell.update(|s| s.error = Some(e.to_string()));
        return Err(e);
      }
    };

    // Nothing cached for a previous account may leak into this one
    self.cache.clear();
    self.local.set(keys::SESSION, &token);
    self.gateway.set_session_token(Some(token));

    let session = self.load().await?;
    tracing::info!(user_id = %session.user_id, "Signed in");
    self
      .cell
      .events()
      .emit(SessionEvent::SignedIn(session.user_id.clone()));
    Ok(session)
  }

  /// End the session on the backend, then locally. Local sign-out always happens.
  pub async fn sign_out(&self) {
    if let Err(e) = self.gateway.delete_session().await {
      tracing::warn!("Failed to delete remote session: {}", e);
    }
    self.force_sign_out();
  }

  /// Drop the session locally without talking to the backend.
  pub fn force_sign_out(&self) {
    let was_signed_in = self.is_signed_in();

    self.local.remove(keys::SESSION);
    self.gateway.set_session_token(None);
    self.cell.reset_to(StoreState::ready(None));
    self.cache.clear();

    if was_signed_in {
      tracing::info!("Signed out");
      self.cell.events().emit(SessionEvent::SignedOut);
    }
  }

  pub async fn update_name(&self, name: &str) -> SyncResult<Session> {
    let name = name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
      let err = SyncError::validation(
        "name",
        format!("must be between 1 and {} characters", MAX_NAME_LEN),
      );
      self.cell.update(|s| s.error = Some(err.to_string()));
      return Err(err);
    }

    let gateway = Arc::clone(&self.gateway);
    let optimistic_name = name.clone();
    optimistic::run(
      &self.cell,
      RollbackPolicy::Revert,
      |s| s.display_name = optimistic_name,
      move |_| async move { gateway.update_account_name(&name).await },
      reconcile_account(self.cache.clone()),
    )
    .await
  }

  pub async fn update_preferences(&self, mut prefs: AccountPreferences) -> SyncResult<Session> {
    prefs.version = ACCOUNT_PREFERENCES_VERSION;

    let gateway = Arc::clone(&self.gateway);
    let optimistic_prefs = prefs.clone();
    optimistic::run(
      &self.cell,
      RollbackPolicy::Revert,
      |s| s.preferences = optimistic_prefs,
      move |_| async move { gateway.update_account_preferences(&prefs).await },
      reconcile_account(self.cache.clone()),
    )
    .await
  }
}

/// The server's account wins, in the store and in the cache.
fn reconcile_account(cache: QueryCache) -> impl FnOnce(&mut Session, &Session) {
  move |s, server| {
    *s = server.clone();
    cache.set(QueryKey::account(), server.clone());
  }
}
