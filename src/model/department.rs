use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
  pub id: String,
  pub name: String,
  pub campus_id: Option<String>,
  pub logo: Option<String>,
}

/// The single per-user document listing followed departments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowedDepartments {
  pub user_id: String,
  pub department_ids: BTreeSet<String>,
}

impl FollowedDepartments {
  pub fn empty(user_id: impl Into<String>) -> Self {
    Self {
      user_id: user_id.into(),
      department_ids: BTreeSet::new(),
    }
  }

  pub fn contains(&self, department_id: &str) -> bool {
    self.department_ids.contains(department_id)
  }
}
