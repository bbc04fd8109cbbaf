use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::EntityKind;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub appwrite: AppwriteConfig,
  #[serde(default)]
  pub wordpress: WordpressConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppwriteConfig {
  pub endpoint: String,
  pub project_id: String,
  pub database_id: String,
  #[serde(default)]
  pub collections: Collections,
  /// Request timeout in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for AppwriteConfig {
  fn default() -> Self {
    Self {
      endpoint: "https://appwrite.biso.no/v1".to_string(),
      project_id: "biso".to_string(),
      database_id: "app".to_string(),
      collections: Collections::default(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  15
}

/// Collection ids in the document database.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Collections {
  pub profiles: String,
  pub campuses: String,
  pub departments: String,
  pub followed_departments: String,
  pub memberships: String,
  pub saved_jobs: String,
  pub chats: String,
  pub chat_reads: String,
  pub notifications: String,
}

impl Default for Collections {
  fn default() -> Self {
    Self {
      profiles: "user".to_string(),
      campuses: "campus".to_string(),
      departments: "departments".to_string(),
      followed_departments: "followed_departments".to_string(),
      memberships: "memberships".to_string(),
      saved_jobs: "saved_jobs".to_string(),
      chats: "chat_group".to_string(),
      chat_reads: "chat_reads".to_string(),
      notifications: "notifications".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WordpressConfig {
  pub base_url: String,
}

impl Default for WordpressConfig {
  fn default() -> Self {
    Self {
      base_url: "https://biso.no".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Stale time for kinds without an override, in seconds
  pub default_stale_secs: u64,
  /// Per-kind stale time overrides, in seconds
  pub stale_secs: BTreeMap<EntityKind, u64>,
  /// Extra attempts after a transient failure
  pub retries: u32,
  pub retry_base_delay_ms: u64,
  pub retry_max_delay_ms: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    let stale_secs = BTreeMap::from([
      (EntityKind::Campuses, 60 * 60),
      (EntityKind::Departments, 10 * 60),
      (EntityKind::FollowedDepartments, 60),
      (EntityKind::SavedJobs, 60),
      (EntityKind::Chats, 30),
      (EntityKind::Notifications, 30),
    ]);

    Self {
      default_stale_secs: 5 * 60,
      stale_secs,
      retries: 2,
      retry_base_delay_ms: 1000,
      retry_max_delay_ms: 30_000,
    }
  }
}

impl CacheConfig {
  pub fn stale_time(&self, kind: EntityKind) -> Duration {
    Duration::from_secs(
      self
        .stale_secs
        .get(&kind)
        .copied()
        .unwrap_or(self.default_stale_secs),
    )
  }

  /// Delay before retry number `attempt` (0-based), doubling each time.
  pub fn retry_delay(&self, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    let ms = self
      .retry_base_delay_ms
      .saturating_mul(factor)
      .min(self.retry_max_delay_ms);
    Duration::from_millis(ms)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// SQLite file for device-local state (default: $XDG_DATA_HOME/biso-sync/local.db)
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./biso-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/biso-sync/config.yaml
  ///
  /// Without an explicit path, a missing file means built-in defaults.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    Ok(config.with_env_overrides())
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("biso-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("biso-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// BISO_APPWRITE_ENDPOINT and BISO_APPWRITE_PROJECT win over the file.
  fn with_env_overrides(mut self) -> Self {
    if let Ok(endpoint) = std::env::var("BISO_APPWRITE_ENDPOINT") {
      self.appwrite.endpoint = endpoint;
    }
    if let Ok(project) = std::env::var("BISO_APPWRITE_PROJECT") {
      self.appwrite.project_id = project;
    }
    self
  }

  /// Directory for the local database and log files.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("biso-sync"))
  }

  pub fn storage_path(&self) -> Result<PathBuf> {
    match &self.storage.path {
      Some(p) => Ok(p.clone()),
      None => Ok(Self::data_dir()?.join("local.db")),
    }
  }
}
