use serde::{Deserialize, Serialize};

/// A BI campus. Reference data; ids are assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Campus {
  pub id: String,
  pub name: String,
}

impl Campus {
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
    }
  }
}

/// Built-in campus list used until the server list is known.
pub fn default_campuses() -> Vec<Campus> {
  vec![
    Campus::new("1", "Oslo"),
    Campus::new("2", "Bergen"),
    Campus::new("3", "Trondheim"),
    Campus::new("4", "Stavanger"),
    Campus::new("5", "National"),
  ]
}

/// Merge the built-in list with the server list.
///
/// Server entries win by case-insensitive name; server campuses that have no
/// built-in counterpart are appended in server order.
pub fn merge_campuses(defaults: &[Campus], server: &[Campus]) -> Vec<Campus> {
  let mut merged: Vec<Campus> = defaults
    .iter()
    .map(|d| {
      server
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(&d.name))
        .cloned()
        .unwrap_or_else(|| d.clone())
    })
    .collect();

  for campus in server {
    if !merged.iter().any(|m| m.id == campus.id) {
      merged.push(campus.clone());
    }
  }

  merged
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_server_ids_override_defaults() {
    let server = vec![Campus::new("abc", "bergen")];
    let merged = merge_campuses(&default_campuses(), &server);
    assert_eq!(merged.len(), 5);
    assert_eq!(merged[1], Campus::new("abc", "bergen"));
    assert_eq!(merged[0], Campus::new("1", "Oslo"));
  }

  #[test]
  fn test_unknown_server_campus_is_appended() {
    let server = vec![Campus::new("9", "Tromsø")];
    let merged = merge_campuses(&default_campuses(), &server);
    assert_eq!(merged.last(), Some(&Campus::new("9", "Tromsø")));
  }
}
