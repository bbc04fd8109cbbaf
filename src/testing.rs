//! In-memory `Gateway` for tests: call counters, injectable failures, latency.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{SyncError, SyncResult};
use crate::gateway::Gateway;
use crate::model::{
  AccountPreferences, Campus, ChatGroup, Department, FollowedDepartments, Job, JobQuery,
  Membership, Notification, Profile, ProfilePatch, SavedJob, Session,
};

#[derive(Default)]
struct FakeState {
  token: Option<String>,
  accounts: HashMap<String, Session>,
  profiles: HashMap<String, Profile>,
  campuses: Vec<Campus>,
  departments: Vec<Department>,
  followed: HashMap<String, BTreeSet<String>>,
  memberships: HashMap<String, Membership>,
  jobs: Vec<Job>,
  saved: HashMap<String, Vec<SavedJob>>,
  chats: HashMap<String, Vec<ChatGroup>>,
  notifications: HashMap<String, Vec<Notification>>,
  calls: HashMap<&'static str, usize>,
  failures: HashMap<&'static str, SyncError>,
  latency: Duration,
}

#[derive(Default)]
pub struct FakeGateway {
  state: Mutex<FakeState>,
}

impl FakeGateway {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an account that `create_session` accepts with `secret`.
  pub fn with_account(self, user_id: &str, name: &str) -> Self {
    self.state().accounts.insert(
      user_id.to_string(),
      Session {
        user_id: user_id.to_string(),
        display_name: name.to_string(),
        email: format!("{}@bi.no", user_id),
        preferences: AccountPreferences::default(),
      },
    );
    self
  }

  pub fn with_profile(self, profile: Profile) -> Self {
    self
      .state()
      .profiles
      .insert(profile.user_id.clone(), profile);
    self
  }

  pub fn with_campuses(self, campuses: Vec<Campus>) -> Self {
    self.state().campuses = campuses;
    self
  }

  pub fn with_departments(self, departments: Vec<Department>) -> Self {
    self.state().departments = departments;
    self
  }

  pub fn with_membership(self, student_id: &str, membership: Membership) -> Self {
    self
      .state()
      .memberships
      .insert(student_id.to_string(), membership);
    self
  }

  pub fn with_jobs(self, jobs: Vec<Job>) -> Self {
    self.state().jobs = jobs;
    self
  }

  pub fn with_chats(self, user_id: &str, chats: Vec<ChatGroup>) -> Self {
    self.state().chats.insert(user_id.to_string(), chats);
    self
  }

  pub fn with_latency(self, latency: Duration) -> Self {
    self.state().latency = latency;
    self
  }

  /// Make every call to `op` fail with `err` until `heal` is called.
  pub fn fail(&self, op: &'static str, err: SyncError) {
    self.state().failures.insert(op, err);
  }

  pub fn heal(&self, op: &'static str) {
    self.state().failures.remove(op);
  }

  pub fn calls(&self, op: &str) -> usize {
    self.state().calls.get(op).copied().unwrap_or(0)
  }

  pub fn token(&self) -> Option<String> {
    self.state().token.clone()
  }

  pub fn followed(&self, user_id: &str) -> BTreeSet<String> {
    self
      .state()
      .followed
      .get(user_id)
      .cloned()
      .unwrap_or_default()
  }

  /// Simulate another device writing the followed list.
  pub fn set_followed(&self, user_id: &str, ids: &[&str]) {
    self.state().followed.insert(
      user_id.to_string(),
      ids.iter().map(|s| s.to_string()).collect(),
    );
  }

  pub fn saved(&self, user_id: &str) -> Vec<SavedJob> {
    self.state().saved.get(user_id).cloned().unwrap_or_default()
  }

  pub fn insert_saved(&self, user_id: &str, job: SavedJob) {
    self
      .state()
      .saved
      .entry(user_id.to_string())
      .or_default()
      .push(job);
  }

  pub fn profile(&self, user_id: &str) -> Option<Profile> {
    self.state().profiles.get(user_id).cloned()
  }

  fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
    self.state.lock().unwrap()
  }

  /// Count the call, wait out the latency, then apply any injected failure.
  async fn enter(&self, op: &'static str) -> SyncResult<()> {
    let latency = {
      let mut state = self.state();
      *state.calls.entry(op).or_default() += 1;
      state.latency
    };
    if !latency.is_zero() {
      tokio::time::sleep(latency).await;
    }
    match self.state().failures.get(op) {
      Some(err) => Err(err.clone()),
      None => Ok(()),
    }
  }

  fn signed_in(&self) -> SyncResult<String> {
    self
      .state()
      .token
      .as_ref()
      .and_then(|t| t.strip_prefix("token-"))
      .map(str::to_string)
      .ok_or_else(|| SyncError::Unauthorized("no session".into()))
  }
}

#[async_trait]
impl Gateway for FakeGateway {
  async fn create_session(&self, user_id: &str, secret: &str) -> SyncResult<String> {
    self.enter("create_session").await?;
    if secret != "secret" || !self.state().accounts.contains_key(user_id) {
      return Err(SyncError::Unauthorized("invalid credentials".into()));
    }
    Ok(format!("token-{}", user_id))
  }

  fn set_session_token(&self, token: Option<String>) {
    self.state().token = token;
  }

  async fn delete_session(&self) -> SyncResult<()> {
    self.enter("delete_session").await?;
    Ok(())
  }

  async fn get_account(&self) -> SyncResult<Session> {
    self.enter("get_account").await?;
    let user_id = self.signed_in()?;
    self
      .state()
      .accounts
      .get(&user_id)
      .cloned()
      .ok_or_else(|| SyncError::Unauthorized("unknown account".into()))
  }

  async fn update_account_name(&self, name: &str) -> SyncResult<Session> {
    self.enter("update_account_name").await?;
    let user_id = self.signed_in()?;
    let mut state = self.state();
    let account = state
      .accounts
      .get_mut(&user_id)
      .ok_or_else(|| SyncError::not_found("account", &user_id))?;
    account.display_name = name.trim().to_string();
    Ok(account.clone())
  }

  async fn update_account_preferences(&self, prefs: &AccountPreferences) -> SyncResult<Session> {
    self.enter("update_account_preferences").await?;
    let user_id = self.signed_in()?;
    let mut state = self.state();
    let account = state
      .accounts
      .get_mut(&user_id)
      .ok_or_else(|| SyncError::not_found("account", &user_id))?;
    account.preferences = prefs.clone();
    Ok(account.clone())
  }

  async fn get_profile(&self, user_id: &str) -> SyncResult<Profile> {
    self.enter("get_profile").await?;
    self
      .state()
      .profiles
      .get(user_id)
      .cloned()
      .ok_or_else(|| SyncError::not_found("profile", user_id))
  }

  async fn create_profile(&self, user_id: &str, _name: &str) -> SyncResult<Profile> {
    self.enter("create_profile").await?;
    let profile = Profile {
      user_id: user_id.to_string(),
      ..Default::default()
    };
    self
      .state()
      .profiles
      .insert(user_id.to_string(), profile.clone());
    Ok(profile)
  }

  async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> SyncResult<Profile> {
    self.enter("update_profile").await?;
    let mut state = self.state();
    let profile = state
      .profiles
      .get_mut(user_id)
      .ok_or_else(|| SyncError::not_found("profile", user_id))?;
    patch.apply_to(profile);
    Ok(profile.clone())
  }

  async fn list_campuses(&self) -> SyncResult<Vec<Campus>> {
    self.enter("list_campuses").await?;
    Ok(self.state().campuses.clone())
  }

  async fn list_departments(&self, campus_id: Option<&str>) -> SyncResult<Vec<Department>> {
    self.enter("list_departments").await?;
    Ok(
      self
        .state()
        .departments
        .iter()
        .filter(|d| campus_id.is_none() || d.campus_id.as_deref() == campus_id)
        .cloned()
        .collect(),
    )
  }

  async fn get_followed_departments(&self, user_id: &str) -> SyncResult<FollowedDepartments> {
    self.enter("get_followed_departments").await?;
    self
      .state()
      .followed
      .get(user_id)
      .map(|ids| FollowedDepartments {
        user_id: user_id.to_string(),
        department_ids: ids.clone(),
      })
      .ok_or_else(|| SyncError::not_found("followed departments", user_id))
  }

  async fn put_followed_departments(
    &self,
    followed: &FollowedDepartments,
  ) -> SyncResult<FollowedDepartments> {
    self.enter("put_followed_departments").await?;
    self.state().followed.insert(
      followed.user_id.clone(),
      followed.department_ids.clone(),
    );
    Ok(followed.clone())
  }

  async fn get_membership(&self, student_id: &str) -> SyncResult<Membership> {
    self.enter("get_membership").await?;
    self
      .state()
      .memberships
      .get(student_id)
      .cloned()
      .ok_or_else(|| SyncError::not_found("membership", student_id))
  }

  async fn list_jobs(&self, query: &JobQuery) -> SyncResult<Vec<Job>> {
    self.enter("list_jobs").await?;
    Ok(
      self
        .state()
        .jobs
        .iter()
        .filter(|j| match &query.campus {
          Some(c) => j.campus.as_deref().is_some_and(|jc| jc.eq_ignore_ascii_case(c)),
          None => true,
        })
        .cloned()
        .collect(),
    )
  }

  async fn get_job(&self, job_id: u64) -> SyncResult<Job> {
    self.enter("get_job").await?;
    self
      .state()
      .jobs
      .iter()
      .find(|j| j.id == job_id)
      .cloned()
      .ok_or_else(|| SyncError::not_found("job", job_id.to_string()))
  }

  async fn list_saved_jobs(&self, user_id: &str) -> SyncResult<Vec<SavedJob>> {
    self.enter("list_saved_jobs").await?;
    Ok(self.saved(user_id))
  }

  async fn save_job(&self, user_id: &str, job: &SavedJob) -> SyncResult<SavedJob> {
    self.enter("save_job").await?;
    let mut state = self.state();
    let saved = state.saved.entry(user_id.to_string()).or_default();
    if !saved.iter().any(|s| s.job_id == job.job_id) {
      saved.push(job.clone());
    }
    Ok(job.clone())
  }

  async fn unsave_job(&self, user_id: &str, job_id: u64) -> SyncResult<()> {
    self.enter("unsave_job").await?;
    let mut state = self.state();
    let saved = state.saved.entry(user_id.to_string()).or_default();
    let before = saved.len();
    saved.retain(|s| s.job_id != job_id);
    if saved.len() == before {
      return Err(SyncError::not_found("saved job", job_id.to_string()));
    }
    Ok(())
  }

  async fn list_chats(&self, user_id: &str) -> SyncResult<Vec<ChatGroup>> {
    self.enter("list_chats").await?;
    Ok(self.state().chats.get(user_id).cloned().unwrap_or_default())
  }

  async fn mark_chat_read(&self, user_id: &str, chat_id: &str) -> SyncResult<()> {
    self.enter("mark_chat_read").await?;
    let mut state = self.state();
    if let Some(chat) = state
      .chats
      .get_mut(user_id)
      .and_then(|chats| chats.iter_mut().find(|c| c.id == chat_id))
    {
      chat.unread = 0;
    }
    Ok(())
  }

  async fn list_notifications(&self, user_id: &str) -> SyncResult<Vec<Notification>> {
    self.enter("list_notifications").await?;
    Ok(
      self
        .state()
        .notifications
        .get(user_id)
        .cloned()
        .unwrap_or_default(),
    )
  }
}

/// Cache without retry delays.
pub fn cache() -> crate::cache::QueryCache {
  crate::cache::QueryCache::new(crate::config::CacheConfig {
    retries: 0,
    ..Default::default()
  })
}
