//! Cache keys: an entity kind plus a kind-specific key.

use std::fmt;

use serde::Deserialize;

use crate::model::JobQuery;

/// Kind of entity held by the query cache. Stale times are configured per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  Account,
  Profile,
  Campuses,
  Departments,
  FollowedDepartments,
  Membership,
  Jobs,
  Job,
  SavedJobs,
  Chats,
  Notifications,
}

impl EntityKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Account => "account",
      Self::Profile => "profile",
      Self::Campuses => "campuses",
      Self::Departments => "departments",
      Self::FollowedDepartments => "followed_departments",
      Self::Membership => "membership",
      Self::Jobs => "jobs",
      Self::Job => "job",
      Self::SavedJobs => "saved_jobs",
      Self::Chats => "chats",
      Self::Notifications => "notifications",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
  pub kind: EntityKind,
  pub key: String,
}

impl QueryKey {
  pub fn new(kind: EntityKind, key: impl Into<String>) -> Self {
    Self {
      kind,
      key: key.into(),
    }
  }

  /// The signed-in account lives under a fixed key.
  pub fn account() -> Self {
    Self::new(EntityKind::Account, "account")
  }

  pub fn profile(user_id: &str) -> Self {
    Self::new(EntityKind::Profile, user_id)
  }

  pub fn campuses() -> Self {
    Self::new(EntityKind::Campuses, "all")
  }

  pub fn departments(campus_id: Option<&str>) -> Self {
    Self::new(EntityKind::Departments, campus_id.unwrap_or("all"))
  }

  pub fn followed_departments(user_id: &str) -> Self {
    Self::new(EntityKind::FollowedDepartments, user_id)
  }

  pub fn membership(student_id: &str) -> Self {
    Self::new(EntityKind::Membership, student_id.trim())
  }

  pub fn jobs(query: &JobQuery) -> Self {
    Self::new(EntityKind::Jobs, query.cache_hash())
  }

  pub fn job(job_id: u64) -> Self {
    Self::new(EntityKind::Job, job_id.to_string())
  }

  pub fn saved_jobs(user_id: &str) -> Self {
    Self::new(EntityKind::SavedJobs, user_id)
  }

  pub fn chats(user_id: &str) -> Self {
    Self::new(EntityKind::Chats, user_id)
  }

  pub fn notifications(user_id: &str) -> Self {
    Self::new(EntityKind::Notifications, user_id)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind.as_str(), self.key)
  }
}
