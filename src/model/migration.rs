//! Versioned JSON documents with explicit upgrade steps.
//!
//! Preference blobs are stored as JSON objects carrying a `version` field.
//! A document is upgraded one step at a time until it reaches the latest
//! version, then decoded into its closed Rust schema. Documents without a
//! `version` field are treated as version 0.

use serde_json::{Map, Value};

/// A single upgrade step from `from_version()` to `from_version() + 1`.
pub trait Migration: Send + Sync {
  /// Version this step applies to.
  fn from_version(&self) -> u32;

  /// Human-readable summary, used for logging.
  fn description(&self) -> &str;

  /// Transform the document. The `version` field is bumped by the caller.
  fn migrate(&self, doc: Map<String, Value>) -> Map<String, Value>;
}

/// Read the `version` field of a document (missing or malformed = 0).
pub fn document_version(doc: &Map<String, Value>) -> u32 {
  doc
    .get("version")
    .and_then(Value::as_u64)
    .and_then(|v| u32::try_from(v).ok())
    .unwrap_or(0)
}

/// Upgrade `raw` to `latest` by applying `steps` in order.
///
/// Non-object input is replaced by an empty document. Documents newer than
/// `latest` are returned untouched; unknown fields are dropped later by the
/// typed decode.
pub fn upgrade(raw: Value, steps: &[&dyn Migration], latest: u32) -> Map<String, Value> {
  let mut doc = match raw {
    Value::Object(map) => map,
    _ => Map::new(),
  };

  let mut version = document_version(&doc);
  while version < latest {
    let Some(step) = steps.iter().find(|s| s.from_version() == version) else {
      tracing::warn!(version, latest, "No migration step found, resetting document");
      return Map::new();
    };
    tracing::debug!(version, "Applying migration: {}", step.description());
    doc = step.migrate(doc);
    version += 1;
    doc.insert("version".to_string(), Value::from(version));
  }

  doc
}

/// Loose boolean coercion for legacy documents (`true`, `"true"`, `"1"`, `1`).
pub fn coerce_bool(value: Option<&Value>) -> Option<bool> {
  match value? {
    Value::Bool(b) => Some(*b),
    Value::Number(n) => n.as_i64().map(|n| n != 0),
    Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
      "true" | "1" | "yes" | "on" => Some(true),
      "false" | "0" | "no" | "off" => Some(false),
      _ => None,
    },
    _ => None,
  }
}
