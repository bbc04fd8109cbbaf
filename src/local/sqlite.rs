use std::path::Path;
use std::sync::Mutex;

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::KeyValueBackend;

/// Schema for the local key-value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-backed durable storage. Each statement commits on its own.
pub struct SqliteBackend {
  conn: Mutex<Connection>,
}

impl SqliteBackend {
  /// Open or create the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open local database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// In-memory database, mostly for tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(KV_SCHEMA)
      .map_err(|e| eyre!("Failed to run local store migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl KeyValueBackend for SqliteBackend {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.conn()?;
    conn
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to read key {}: {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write key {}: {}", key, e))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute("DELETE FROM kv WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove key {}: {}", key, e))?;
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute("DELETE FROM kv", [])
      .map_err(|e| eyre!("Failed to clear local store: {}", e))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_set_get_remove() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    assert_eq!(backend.get("campus").unwrap(), None);

    backend.set("campus", r#"{"id":"2"}"#).unwrap();
    backend.set("campus", r#"{"id":"3"}"#).unwrap();
    assert_eq!(backend.get("campus").unwrap().as_deref(), Some(r#"{"id":"3"}"#));

    backend.remove("campus").unwrap();
    assert_eq!(backend.get("campus").unwrap(), None);
  }

  #[test]
  fn test_values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("local.db");

    {
      let backend = SqliteBackend::open(&path).unwrap();
      backend.set("@biso/session", "\"token\"").unwrap();
      backend.set("campus", "\"2\"").unwrap();
      backend.remove("campus").unwrap();
    }

    let backend = SqliteBackend::open(&path).unwrap();
    assert_eq!(
      backend.get("@biso/session").unwrap().as_deref(),
      Some("\"token\"")
    );
    assert_eq!(backend.get("campus").unwrap(), None);
  }

  #[test]
  fn test_clear() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    backend.set("a", "1").unwrap();
    backend.set("b", "2").unwrap();
    backend.clear().unwrap();
    assert_eq!(backend.get("a").unwrap(), None);
    assert_eq!(backend.get("b").unwrap(), None);
  }
}
