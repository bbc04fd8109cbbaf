use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::migration::{coerce_bool, upgrade, Migration};

pub const ACCOUNT_PREFERENCES_VERSION: u32 = 2;

/// The signed-in account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
  pub user_id: String,
  pub display_name: String,
  pub email: String,
  pub preferences: AccountPreferences,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  #[default]
  System,
  Light,
  Dark,
}

/// Account preferences synced to the backend, closed schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountPreferences {
  pub version: u32,
  #[serde(default)]
  pub language: Option<String>,
  #[serde(default = "default_true")]
  pub notifications_enabled: bool,
  #[serde(default)]
  pub theme: Theme,
}

fn default_true() -> bool {
  true
}

impl Default for AccountPreferences {
  fn default() -> Self {
    Self {
      version: ACCOUNT_PREFERENCES_VERSION,
      language: None,
      notifications_enabled: true,
      theme: Theme::System,
    }
  }
}

impl AccountPreferences {
  /// Decode a raw server blob, upgrading legacy layouts first.
  pub fn from_raw(raw: Value) -> Self {
    let doc = upgrade(
      raw,
      &[&LegacyMapToV1, &RenameNotificationsV2],
      ACCOUNT_PREFERENCES_VERSION,
    );
    serde_json::from_value(Value::Object(doc)).unwrap_or_else(|e| {
      tracing::warn!("Discarding unreadable account preferences: {}", e);
      Self::default()
    })
  }

  pub fn to_raw(&self) -> Value {
    serde_json::to_value(self).unwrap_or(Value::Null)
  }
}

/// v0 was an untyped map; keep only the keys the client ever wrote.
struct LegacyMapToV1;

impl Migration for LegacyMapToV1 {
  fn from_version(&self) -> u32 {
    0
  }

  fn description(&self) -> &str {
    "keep language and notifications from the untyped preference map"
  }

  fn migrate(&self, doc: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    if let Some(lang) = doc.get("language").and_then(Value::as_str) {
      out.insert("language".to_string(), Value::from(lang.to_string()));
    }
    if let Some(enabled) = coerce_bool(doc.get("notifications")) {
      out.insert("notifications".to_string(), Value::Bool(enabled));
    }
    out
  }
}

struct RenameNotificationsV2;

impl Migration for RenameNotificationsV2 {
  fn from_version(&self) -> u32 {
    1
  }

  fn description(&self) -> &str {
    "rename notifications to notifications_enabled, add theme"
  }

  fn migrate(&self, mut doc: Map<String, Value>) -> Map<String, Value> {
    let enabled = doc.remove("notifications").unwrap_or(Value::Bool(true));
    doc.insert("notifications_enabled".to_string(), enabled);
    doc
      .entry("theme".to_string())
      .or_insert_with(|| Value::from("system"));
    doc
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_legacy_map_is_migrated() {
    let prefs = AccountPreferences::from_raw(json!({
      "language": "nb",
      "notifications": "false",
      "someOldFlag": 12
    }));
    assert_eq!(prefs.version, ACCOUNT_PREFERENCES_VERSION);
    assert_eq!(prefs.language.as_deref(), Some("nb"));
    assert!(!prefs.notifications_enabled);
    assert_eq!(prefs.theme, Theme::System);
  }

  #[test]
  fn test_empty_blob_gives_defaults() {
    let prefs = AccountPreferences::from_raw(json!({}));
    assert_eq!(prefs, AccountPreferences::default());
  }

  #[test]
  fn test_current_version_round_trips() {
    let prefs = AccountPreferences {
      language: Some("en".into()),
      theme: Theme::Dark,
      ..Default::default()
    };
    assert_eq!(AccountPreferences::from_raw(prefs.to_raw()), prefs);
  }
}
