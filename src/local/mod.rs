//! Device-local durable key-value store.
//!
//! Values are JSON-serialized. Each key is independently durable and has a
//! single writer store. Failures never reach callers: they are logged and
//! the operation degrades to a no-op (reads return `None`).

mod memory;
mod sqlite;

use std::sync::Arc;

use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// Keys written by the stores.
pub mod keys {
  /// Last selected campus (written by the campus store)
  pub const CAMPUS: &str = "campus";
  /// Saved jobs (written by the saved-jobs store)
  pub const SAVED_JOBS: &str = "@biso/saved_jobs";
  /// Presentation preferences (written by the ui-preferences store)
  pub const UI_PREFERENCES: &str = "ui-preferences";
  /// Session token (written by the auth store)
  pub const SESSION: &str = "@biso/session";
}

/// Storage backend for raw string values.
pub trait KeyValueBackend: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;
  fn set(&self, key: &str, value: &str) -> Result<()>;
  fn remove(&self, key: &str) -> Result<()>;
  fn clear(&self) -> Result<()>;
}

/// JSON façade over a backend. Writes complete before returning.
#[derive(Clone)]
pub struct LocalStore {
  backend: Arc<dyn KeyValueBackend>,
}

impl LocalStore {
  pub fn new(backend: impl KeyValueBackend + 'static) -> Self {
    Self {
      backend: Arc::new(backend),
    }
  }

  pub fn in_memory() -> Self {
    Self::new(MemoryBackend::new())
  }

  pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
    let json = match serde_json::to_string(value) {
      Ok(json) => json,
      Err(e) => {
        tracing::error!(key, "Failed to serialize local value: {}", e);
        return;
      }
    };
    if let Err(e) = self.backend.set(key, &json) {
      tracing::error!(key, "Failed to write local value: {}", e);
    }
  }

  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let raw = match self.backend.get(key) {
      Ok(raw) => raw?,
      Err(e) => {
        tracing::error!(key, "Failed to read local value: {}", e);
        return None;
      }
    };
    match serde_json::from_str(&raw) {
      Ok(value) => Some(value),
      Err(e) => {
        tracing::warn!(key, "Ignoring unreadable local value: {}", e);
        None
      }
    }
  }

  pub fn remove(&self, key: &str) {
    if let Err(e) = self.backend.remove(key) {
      tracing::error!(key, "Failed to remove local value: {}", e);
    }
  }

  pub fn clear(&self) {
    if let Err(e) = self.backend.clear() {
      tracing::error!("Failed to clear local store: {}", e);
    }
  }
}

impl std::fmt::Debug for LocalStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LocalStore").finish_non_exhaustive()
  }
}
