//! Serde-deserializable types matching BaaS and WordPress responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::model::{
  AccountPreferences, Campus, ChatGroup, Department, FollowedDepartments, Job, Membership,
  Notification, Profile, SavedJob, Session,
};

// ============================================================================
// Envelopes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiDocumentList<T> {
  #[serde(default)]
  pub total: u64,
  #[serde(default = "Vec::new")]
  pub documents: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default)]
  pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiSessionToken {
  #[serde(rename = "$id")]
  pub id: String,
  #[serde(default)]
  pub secret: String,
}

// ============================================================================
// Account and profile
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiAccount {
  #[serde(rename = "$id")]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub prefs: Value,
}

impl From<ApiAccount> for Session {
  fn from(a: ApiAccount) -> Self {
    Session {
      user_id: a.id,
      display_name: a.name,
      email: a.email,
      preferences: AccountPreferences::from_raw(a.prefs),
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiProfile {
  #[serde(rename = "$id")]
  pub id: String,
  pub user_id: Option<String>,
  pub student_id: Option<String>,
  pub address: Option<String>,
  pub campus_id: Option<String>,
  #[serde(default)]
  pub departments: Vec<String>,
  pub avatar: Option<String>,
}

impl From<ApiProfile> for Profile {
  fn from(p: ApiProfile) -> Self {
    Profile {
      user_id: p.user_id.unwrap_or(p.id),
      student_id: p.student_id,
      address: p.address,
      campus_id: p.campus_id,
      department_ids: p.departments.into_iter().collect(),
      avatar: p.avatar,
    }
  }
}

// ============================================================================
// Reference data
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCampus {
  #[serde(rename = "$id")]
  pub id: String,
  pub name: String,
}

impl From<ApiCampus> for Campus {
  fn from(c: ApiCampus) -> Self {
    Campus::new(c.id, c.name)
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiDepartment {
  #[serde(rename = "$id")]
  pub id: String,
  #[serde(rename = "Name", alias = "name")]
  pub name: String,
  pub campus_id: Option<String>,
  pub logo: Option<String>,
}

impl From<ApiDepartment> for Department {
  fn from(d: ApiDepartment) -> Self {
    Department {
      id: d.id,
      name: d.name,
      campus_id: d.campus_id,
      logo: d.logo,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiFollowedDepartments {
  #[serde(rename = "$id")]
  pub id: String,
  pub user_id: Option<String>,
  #[serde(default)]
  pub department_ids: Vec<String>,
}

impl From<ApiFollowedDepartments> for FollowedDepartments {
  fn from(f: ApiFollowedDepartments) -> Self {
    FollowedDepartments {
      user_id: f.user_id.unwrap_or(f.id),
      department_ids: f.department_ids.into_iter().collect(),
    }
  }
}

// ============================================================================
// Membership
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiMembership {
  #[serde(rename = "membership_id", alias = "$id")]
  pub membership_id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub price: f64,
  #[serde(default)]
  pub category: String,
  #[serde(default)]
  pub status: bool,
  #[serde(rename = "expiryDate")]
  pub expiry_date: Option<String>,
}

impl From<ApiMembership> for Membership {
  fn from(m: ApiMembership) -> Self {
    Membership {
      membership_id: m.membership_id,
      name: m.name,
      price: m.price,
      category: m.category,
      status: m.status,
      expiry_date: m.expiry_date,
    }
  }
}

// ============================================================================
// Jobs (WordPress feed + saved job documents)
// ============================================================================

/// WordPress renders some text fields as `{ "rendered": "..." }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiText {
  Plain(String),
  Rendered { rendered: String },
}

impl ApiText {
  pub fn into_string(self) -> String {
    match self {
      ApiText::Plain(s) => s,
      ApiText::Rendered { rendered } => rendered,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiJob {
  pub id: u64,
  pub title: ApiText,
  pub campus: Option<String>,
  pub company: Option<String>,
  pub deadline: Option<String>,
  pub link: Option<String>,
}

impl From<ApiJob> for Job {
  fn from(j: ApiJob) -> Self {
    Job {
      id: j.id,
      title: j.title.into_string(),
      campus: j.campus,
      company: j.company,
      deadline: j.deadline,
      link: j.link,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiSavedJob {
  pub job_id: u64,
  pub saved_at: Option<DateTime<Utc>>,
  #[serde(rename = "$createdAt")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub title: String,
  pub campus: Option<String>,
}

impl From<ApiSavedJob> for SavedJob {
  fn from(s: ApiSavedJob) -> Self {
    SavedJob {
      job_id: s.job_id,
      saved_at: s.saved_at.or(s.created_at).unwrap_or_else(Utc::now),
      title: s.title,
      campus: s.campus,
    }
  }
}

// ============================================================================
// Chat and notifications
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiChatGroup {
  #[serde(rename = "$id")]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub unread_count: u32,
}

impl From<ApiChatGroup> for ChatGroup {
  fn from(c: ApiChatGroup) -> Self {
    ChatGroup {
      id: c.id,
      name: c.name,
      unread: c.unread_count,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiNotification {
  #[serde(rename = "$id")]
  pub id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub body: String,
  #[serde(default)]
  pub read: bool,
}

impl From<ApiNotification> for Notification {
  fn from(n: ApiNotification) -> Self {
    Notification {
      id: n.id,
      title: n.title,
      body: n.body,
      read: n.read,
    }
  }
}
