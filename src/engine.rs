//! Wiring of gateway, cache, local store and client stores.
//!
//! A `SyncEngine` is built once at startup with its dependencies injected and
//! lives until the process exits.

use std::sync::{Arc, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::cache::{CacheResult, QueryCache, QueryKey};
use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::gateway::Gateway;
use crate::local::LocalStore;
use crate::model::{
  Campus, Department, Job, JobQuery, MembershipStatus, Notification, ProfilePatch, SavedJob,
  Session,
};
use crate::stores::{
  AuthStore, CampusStore, ChatStore, DepartmentFollowStore, MembershipStore, ProfileStore,
  SavedJobsStore, SessionEvent, SessionEvents, UiPreferencesStore,
};

pub struct SyncEngine {
  gateway: Arc<dyn Gateway>,
  cache: QueryCache,
  local: LocalStore,
  events: SessionEvents,
  auth: AuthStore,
  profile: ProfileStore,
  membership: MembershipStore,
  campus: CampusStore,
  departments: DepartmentFollowStore,
  saved_jobs: SavedJobsStore,
  ui_preferences: UiPreferencesStore,
  chats: ChatStore,
}

impl SyncEngine {
  pub fn new(config: &Config, gateway: Arc<dyn Gateway>, local: LocalStore) -> Self {
    let cache = QueryCache::new(config.cache.clone());
    let events = SessionEvents::new();

    Self {
      auth: AuthStore::new(
        Arc::clone(&gateway),
        cache.clone(),
        local.clone(),
        events.clone(),
      ),
      profile: ProfileStore::new(Arc::clone(&gateway), cache.clone(), events.clone()),
      membership: MembershipStore::new(Arc::clone(&gateway), cache.clone(), events.clone()),
      campus: CampusStore::new(
        Arc::clone(&gateway),
        cache.clone(),
        local.clone(),
        events.clone(),
      ),
      departments: DepartmentFollowStore::new(Arc::clone(&gateway), cache.clone(), events.clone()),
      saved_jobs: SavedJobsStore::new(
        Arc::clone(&gateway),
        cache.clone(),
        local.clone(),
        events.clone(),
      ),
      ui_preferences: UiPreferencesStore::new(local.clone(), events.clone()),
      chats: ChatStore::new(Arc::clone(&gateway), cache.clone(), events.clone()),
      gateway,
      cache,
      local,
      events,
    }
  }

  pub fn gateway(&self) -> Arc<dyn Gateway> {
    Arc::clone(&self.gateway)
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  pub fn local(&self) -> &LocalStore {
    &self.local
  }

  pub fn events(&self) -> &SessionEvents {
    &self.events
  }

  pub fn auth(&self) -> &AuthStore {
    &self.auth
  }

  pub fn profile(&self) -> &ProfileStore {
    &self.profile
  }

  pub fn membership(&self) -> &MembershipStore {
    &self.membership
  }

  pub fn campus(&self) -> &CampusStore {
    &self.campus
  }

  pub fn departments(&self) -> &DepartmentFollowStore {
    &self.departments
  }

  pub fn saved_jobs(&self) -> &SavedJobsStore {
    &self.saved_jobs
  }

  pub fn ui_preferences(&self) -> &UiPreferencesStore {
    &self.ui_preferences
  }

  pub fn chats(&self) -> &ChatStore {
    &self.chats
  }

  /// Restore the stored session and load every store that depends on it.
  ///
  /// Failures are recorded on the stores that hit them; bootstrap itself
  /// always completes.
  pub async fn bootstrap(&self) {
    let session = match self.auth.restore().await {
      Ok(session) => session,
      Err(e) => {
        tracing::warn!("Could not restore session: {}", e);
        None
      }
    };

    match session {
      Some(session) => self.load_session(&session).await,
      None => self.load_signed_out().await,
    }
  }

  pub async fn sign_in(&self, user_id: &str, secret: &str) -> SyncResult<Session> {
    let session = self.auth.sign_in(user_id, secret).await?;
    self.load_session(&session).await;
    Ok(session)
  }

  pub async fn sign_out(&self) {
    self.reset_session_stores();
    self.auth.sign_out().await;
    self.reload_device_stores().await;
  }

  /// Local sign-out after the backend rejected the session.
  pub async fn force_sign_out(&self) {
    self.reset_session_stores();
    self.auth.force_sign_out();
    self.reload_device_stores().await;
  }

  /// Select a campus, then record it on the profile when signed in.
  ///
  /// The local selection is kept even if the profile write fails.
  pub async fn change_campus(&self, campus_id: &str) -> SyncResult<Campus> {
    let campus = self.campus.change_campus(campus_id)?;

    if self.profile.profile().is_some() {
      self
        .profile
        .update(ProfilePatch {
          campus_id: Some(campus.id.clone()),
          ..Default::default()
        })
        .await?;
    }
    Ok(campus)
  }

  /// Change the student number and look the membership up again.
  pub async fn update_student_id(&self, student_id: &str) -> SyncResult<MembershipStatus> {
    let profile = self
      .profile
      .update(ProfilePatch {
        student_id: Some(student_id.to_string()),
        ..Default::default()
      })
      .await?;
    self.membership.load(profile.student_id.as_deref()).await
  }

  pub async fn toggle_department(&self, department_id: &str) -> SyncResult<bool> {
    self.departments.toggle(department_id).await
  }

  pub async fn save_job(&self, job: SavedJob) -> SyncResult<bool> {
    let user_id = self.auth.user_id();
    self.saved_jobs.save_job(job, user_id.as_deref()).await
  }

  pub async fn unsave_job(&self, job_id: u64) -> SyncResult<bool> {
    let user_id = self.auth.user_id();
    self.saved_jobs.unsave_job(job_id, user_id.as_deref()).await
  }

  pub async fn mark_chat_read(&self, chat_id: &str) -> SyncResult<()> {
    let user_id = self.auth.user_id().ok_or(SyncError::NoSession)?;
    self.chats.mark_read(&user_id, chat_id).await
  }

  pub async fn jobs(&self, query: &JobQuery) -> SyncResult<CacheResult<Arc<Vec<Job>>>> {
    let gateway = Arc::clone(&self.gateway);
    let query_owned = query.clone();
    let result = self
      .cache
      .get(QueryKey::jobs(query), move || {
        let gateway = Arc::clone(&gateway);
        let query = query_owned.clone();
        async move { gateway.list_jobs(&query).await }
      })
      .await;
    self.reported(result)
  }

  pub async fn job(&self, job_id: u64) -> SyncResult<CacheResult<Arc<Job>>> {
    let gateway = Arc::clone(&self.gateway);
    let result = self
      .cache
      .get(QueryKey::job(job_id), move || {
        let gateway = Arc::clone(&gateway);
        async move { gateway.get_job(job_id).await }
      })
      .await;
    self.reported(result)
  }

  pub async fn department_list(
    &self,
    campus_id: Option<&str>,
  ) -> SyncResult<CacheResult<Arc<Vec<Department>>>> {
    let gateway = Arc::clone(&self.gateway);
    let campus = campus_id.map(str::to_string);
    let result = self
      .cache
      .get(QueryKey::departments(campus_id), move || {
        let gateway = Arc::clone(&gateway);
        let campus = campus.clone();
        async move { gateway.list_departments(campus.as_deref()).await }
      })
      .await;
    self.reported(result)
  }

  pub async fn notifications(&self) -> SyncResult<CacheResult<Arc<Vec<Notification>>>> {
    let user_id = self.auth.user_id().ok_or(SyncError::NoSession)?;
    let gateway = Arc::clone(&self.gateway);
    let uid = user_id.clone();
    let result = self
      .cache
      .get(QueryKey::notifications(&user_id), move || {
        let gateway = Arc::clone(&gateway);
        let uid = uid.clone();
        async move { gateway.list_notifications(&uid).await }
      })
      .await;
    self.reported(result)
  }

  /// Sign out whenever any store or read reports `Unauthorized`.
  ///
  /// The task ends when the engine is dropped.
  pub fn spawn_session_watcher(self: &Arc<Self>) -> JoinHandle<()> {
    let mut rx = self.events.subscribe();
    let engine: Weak<Self> = Arc::downgrade(self);

    tokio::spawn(async move {
      loop {
        match rx.recv().await {
          Ok(SessionEvent::Unauthorized) => {
            let Some(engine) = engine.upgrade() else {
              break;
            };
            if engine.auth.is_signed_in() {
              tracing::warn!("Backend rejected the session, signing out");
              engine.force_sign_out().await;
            }
          }
          Ok(_) => {}
          Err(RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "Session watcher lagged");
          }
          Err(RecvError::Closed) => break,
        }
      }
    })
  }

  async fn load_session(&self, session: &Session) {
    let profile = match self
      .profile
      .load(&session.user_id, &session.display_name)
      .await
    {
      Ok(profile) => Some(profile),
      Err(e) => {
        tracing::warn!(user_id = %session.user_id, "Profile load failed: {}", e);
        None
      }
    };
    let campus_id = profile.as_ref().and_then(|p| p.campus_id.clone());
    let student_id = profile.as_ref().and_then(|p| p.student_id.clone());
    let user_id = session.user_id.as_str();

    let (campus, membership, departments, saved_jobs, chats) = futures::join!(
      self.campus.load(campus_id.as_deref()),
      self.membership.load(student_id.as_deref()),
      self.departments.load(user_id),
      self.saved_jobs.load(Some(user_id)),
      self.chats.load(user_id),
    );
    log_failure("campus", campus);
    log_failure("membership", membership);
    log_failure("departments", departments);
    log_failure("saved jobs", saved_jobs);
    log_failure("chats", chats);
  }

  async fn load_signed_out(&self) {
    let (campus, saved_jobs) = futures::join!(self.campus.load(None), self.saved_jobs.load(None));
    log_failure("campus", campus);
    log_failure("saved jobs", saved_jobs);
  }

  /// Drop per-user state. Campus, saved jobs and ui preferences are device state and stay.
  /// Must run before the auth store clears the cache.
  fn reset_session_stores(&self) {
    self.profile.reset();
    self.membership.reset();
    self.departments.reset();
    self.chats.reset();
  }

  async fn reload_device_stores(&self) {
    log_failure("saved jobs", self.saved_jobs.load(None).await);
  }

  fn reported<T>(&self, result: SyncResult<T>) -> SyncResult<T> {
    if let Err(e) = &result {
      self.events.report(e);
    }
    result
  }
}

fn log_failure<T>(store: &str, result: SyncResult<T>) {
  if let Err(e) = result {
    tracing::warn!(store, "Load failed: {}", e);
  }
}
