use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Server-owned profile document, one per account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
  pub user_id: String,
  pub student_id: Option<String>,
  pub address: Option<String>,
  pub campus_id: Option<String>,
  #[serde(default)]
  pub department_ids: BTreeSet<String>,
  pub avatar: Option<String>,
}

/// Partial profile update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfilePatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub student_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub campus_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub department_ids: Option<BTreeSet<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub avatar: Option<String>,
}

impl ProfilePatch {
  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }

  /// Reject malformed values before they reach the network.
  pub fn validate(&self) -> SyncResult<()> {
    if let Some(student_id) = &self.student_id {
      let trimmed = student_id.trim();
      if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(SyncError::validation(
          "student_id",
          "student number must contain digits only",
        ));
      }
    }
    if let Some(campus_id) = &self.campus_id {
      if campus_id.trim().is_empty() {
        return Err(SyncError::validation("campus_id", "must not be empty"));
      }
    }
    Ok(())
  }

  /// Apply the patch on top of a profile (optimistic local copy).
  pub fn apply_to(&self, profile: &mut Profile) {
    if let Some(v) = &self.student_id {
      profile.student_id = Some(v.trim().to_string());
    }
    if let Some(v) = &self.address {
      profile.address = Some(v.clone());
    }
    if let Some(v) = &self.campus_id {
      profile.campus_id = Some(v.clone());
    }
    if let Some(v) = &self.department_ids {
      profile.department_ids = v.clone();
    }
    if let Some(v) = &self.avatar {
      profile.avatar = Some(v.clone());
    }
  }
}
