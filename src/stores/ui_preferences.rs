use serde_json::Value;

use crate::local::{keys, LocalStore};
use crate::model::UiPreferences;

use super::state::{SessionEvents, StateCell, StoreState};

/// Presentation preferences. Device-local, never synced, always `Ready`.
pub struct UiPreferencesStore {
  cell: StateCell<UiPreferences>,
  local: LocalStore,
}

impl UiPreferencesStore {
  pub fn new(local: LocalStore, events: SessionEvents) -> Self {
    let prefs = local
      .get::<Value>(keys::UI_PREFERENCES)
      .map(UiPreferences::from_stored)
      .unwrap_or_default();

    Self {
      cell: StateCell::with_state(StoreState::ready(Some(prefs)), events),
      local,
    }
  }

  pub fn state(&self) -> &StateCell<UiPreferences> {
    &self.cell
  }

  pub fn preferences(&self) -> UiPreferences {
    self.cell.data().unwrap_or_default()
  }

  pub fn update(&self, change: impl FnOnce(&mut UiPreferences)) -> UiPreferences {
    let mut prefs = self.preferences();
    change(&mut prefs);
    self.store(prefs.normalize())
  }

  pub fn reset(&self) -> UiPreferences {
    self.store(UiPreferences::default())
  }

  fn store(&self, prefs: UiPreferences) -> UiPreferences {
    self.local.set(keys::UI_PREFERENCES, &prefs);
    self.cell.replace(StoreState::ready(Some(prefs)));
    prefs
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::FontSize;
  use serde_json::json;

  #[test]
  fn test_update_is_normalized_and_persisted() {
    let local = LocalStore::in_memory();
    let store = UiPreferencesStore::new(local.clone(), SessionEvents::new());

    let prefs = store.update(|p| {
      p.font_size = FontSize::Large;
      p.notifications.enabled = false;
    });
    assert!(!prefs.notifications.sound);
    assert!(!prefs.notifications.vibration);

    let reopened = UiPreferencesStore::new(local, SessionEvents::new());
    assert_eq!(reopened.preferences(), prefs);
  }

  #[test]
  fn test_legacy_layout_is_upgraded_on_start() {
    let local = LocalStore::in_memory();
    local.set(
      keys::UI_PREFERENCES,
      &json!({"fontSize": 1.2, "reduceAnimations": true, "notificationsEnabled": true}),
    );
    let store = UiPreferencesStore::new(local, SessionEvents::new());

    let prefs = store.preferences();
    assert_eq!(prefs.font_size, FontSize::Large);
    assert!(prefs.reduce_motion);
  }

  #[test]
  fn test_reset_restores_defaults() {
    let local = LocalStore::in_memory();
    let store = UiPreferencesStore::new(local, SessionEvents::new());
    store.update(|p| p.reduce_motion = true);
    assert_eq!(store.reset(), UiPreferences::default());
  }
}
