use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::migration::{coerce_bool, upgrade, Migration};

pub const UI_PREFERENCES_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
  Small,
  #[default]
  Medium,
  Large,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutDensity {
  Compact,
  #[default]
  Comfortable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
  pub enabled: bool,
  pub sound: bool,
  pub vibration: bool,
}

impl Default for NotificationPreferences {
  fn default() -> Self {
    Self {
      enabled: true,
      sound: true,
      vibration: true,
    }
  }
}

/// Device-local presentation preferences. Never synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiPreferences {
  pub version: u32,
  #[serde(default)]
  pub font_size: FontSize,
  #[serde(default)]
  pub reduce_motion: bool,
  #[serde(default)]
  pub layout_density: LayoutDensity,
  #[serde(default)]
  pub notifications: NotificationPreferences,
}

impl Default for UiPreferences {
  fn default() -> Self {
    Self {
      version: UI_PREFERENCES_VERSION,
      font_size: FontSize::default(),
      reduce_motion: false,
      layout_density: LayoutDensity::default(),
      notifications: NotificationPreferences::default(),
    }
  }
}

impl UiPreferences {
  /// Disabled notifications force the sound and vibration flags off.
  pub fn normalize(mut self) -> Self {
    if !self.notifications.enabled {
      self.notifications.sound = false;
      self.notifications.vibration = false;
    }
    self
  }

  /// Decode a stored document, upgrading the legacy flat layout.
  pub fn from_stored(raw: Value) -> Self {
    let doc = upgrade(raw, &[&FlatToNestedV1], UI_PREFERENCES_VERSION);
    serde_json::from_value::<Self>(Value::Object(doc))
      .unwrap_or_else(|e| {
        tracing::warn!("Discarding unreadable ui preferences: {}", e);
        Self::default()
      })
      .normalize()
  }
}

/// v0 stored camelCase flat keys with a numeric font scale.
struct FlatToNestedV1;

impl Migration for FlatToNestedV1 {
  fn from_version(&self) -> u32 {
    0
  }

  fn description(&self) -> &str {
    "nest notification flags and map font scale to font size"
  }

  fn migrate(&self, doc: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();

    let font_size = match doc.get("fontSize").and_then(Value::as_f64) {
      Some(scale) if scale < 0.95 => "small",
      Some(scale) if scale > 1.05 => "large",
      _ => "medium",
    };
    out.insert("font_size".to_string(), Value::from(font_size));

    let reduce_motion = coerce_bool(doc.get("reduceAnimations")).unwrap_or(false);
    out.insert("reduce_motion".to_string(), Value::Bool(reduce_motion));

    let density = if coerce_bool(doc.get("compactLayout")).unwrap_or(false) {
      "compact"
    } else {
      "comfortable"
    };
    out.insert("layout_density".to_string(), Value::from(density));

    let notifications = serde_json::json!({
      "enabled": coerce_bool(doc.get("notificationsEnabled")).unwrap_or(true),
      "sound": coerce_bool(doc.get("notificationSound")).unwrap_or(true),
      "vibration": coerce_bool(doc.get("notificationVibration")).unwrap_or(true),
    });
    out.insert("notifications".to_string(), notifications);

    out
  }
}
