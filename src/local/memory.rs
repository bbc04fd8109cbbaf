use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use color_eyre::{eyre::eyre, Result};

use super::KeyValueBackend;

/// In-memory backend for tests and ephemeral sessions.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
  values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueBackend for MemoryBackend {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let values = self.values.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(values.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut values = self.values.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut values = self.values.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.remove(key);
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let mut values = self.values.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.clear();
    Ok(())
  }
}
