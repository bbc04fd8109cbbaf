//! Remote data gateway: one async call per entity operation.
//!
//! The gateway is a passthrough. It performs no retries and keeps no state
//! beyond the session token; every failure is normalized into a
//! [`SyncError`](crate::error::SyncError) category.

pub mod api_types;
mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncResult;
use crate::model::{
  AccountPreferences, Campus, ChatGroup, Department, FollowedDepartments, Job, JobQuery,
  Membership, Notification, Profile, ProfilePatch, SavedJob, Session,
};

pub use http::HttpGateway;

/// Shape of a document request against the BaaS.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentRequest {
  pub collection: String,
  pub document_id: Option<String>,
  pub filters: Vec<Filter>,
  pub payload: Option<Value>,
}

impl DocumentRequest {
  pub fn collection(collection: impl Into<String>) -> Self {
    Self {
      collection: collection.into(),
      ..Default::default()
    }
  }

  pub fn document(mut self, id: impl Into<String>) -> Self {
    self.document_id = Some(id.into());
    self
  }

  pub fn filter(mut self, filter: Filter) -> Self {
    self.filters.push(filter);
    self
  }

  pub fn payload(mut self, payload: Value) -> Self {
    self.payload = Some(payload);
    self
  }
}

/// Query filter attached to a list request.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
  Equal(String, Value),
  Limit(u32),
  OrderDesc(String),
}

impl Filter {
  pub fn equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
    Self::Equal(attribute.into(), value.into())
  }

  /// Serialized query string as the document API expects it.
  pub fn to_query(&self) -> String {
    let json = match self {
      Self::Equal(attribute, value) => serde_json::json!({
        "method": "equal",
        "attribute": attribute,
        "values": [value],
      }),
      Self::Limit(n) => serde_json::json!({ "method": "limit", "values": [n] }),
      Self::OrderDesc(attribute) => serde_json::json!({
        "method": "orderDesc",
        "attribute": attribute,
      }),
    };
    json.to_string()
  }
}

/// Backend operations used by the stores and the query cache.
#[async_trait]
pub trait Gateway: Send + Sync {
  // Account
  async fn create_session(&self, user_id: &str, secret: &str) -> SyncResult<String>;
  fn set_session_token(&self, token: Option<String>);
  async fn delete_session(&self) -> SyncResult<()>;
  async fn get_account(&self) -> SyncResult<Session>;
  async fn update_account_name(&self, name: &str) -> SyncResult<Session>;
  async fn update_account_preferences(&self, prefs: &AccountPreferences) -> SyncResult<Session>;

  // Profile
  async fn get_profile(&self, user_id: &str) -> SyncResult<Profile>;
  async fn create_profile(&self, user_id: &str, name: &str) -> SyncResult<Profile>;
  async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> SyncResult<Profile>;

  // Reference data
  async fn list_campuses(&self) -> SyncResult<Vec<Campus>>;
  async fn list_departments(&self, campus_id: Option<&str>) -> SyncResult<Vec<Department>>;

  // Department follows
  async fn get_followed_departments(&self, user_id: &str) -> SyncResult<FollowedDepartments>;
  async fn put_followed_departments(
    &self,
    followed: &FollowedDepartments,
  ) -> SyncResult<FollowedDepartments>;

  // Membership
  async fn get_membership(&self, student_id: &str) -> SyncResult<Membership>;

  // Jobs
  async fn list_jobs(&self, query: &JobQuery) -> SyncResult<Vec<Job>>;
  async fn get_job(&self, job_id: u64) -> SyncResult<Job>;
  async fn list_saved_jobs(&self, user_id: &str) -> SyncResult<Vec<SavedJob>>;
  async fn save_job(&self, user_id: &str, job: &SavedJob) -> SyncResult<SavedJob>;
  async fn unsave_job(&self, user_id: &str, job_id: u64) -> SyncResult<()>;

  // Chat and notifications
  async fn list_chats(&self, user_id: &str) -> SyncResult<Vec<ChatGroup>>;
  async fn mark_chat_read(&self, user_id: &str, chat_id: &str) -> SyncResult<()>;
  async fn list_notifications(&self, user_id: &str) -> SyncResult<Vec<Notification>>;
}
