use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::{QueryCache, QueryKey};
use crate::error::SyncResult;
use crate::gateway::Gateway;
use crate::local::{keys, LocalStore};
use crate::model::SavedJob;

use super::optimistic::{self, RollbackPolicy};
use super::state::{SessionEvents, StateCell, StoreState, StoreStatus};

/// Union of two saved-job lists, keyed by job id. `primary` order wins.
pub fn merge_saved_jobs(primary: &[SavedJob], other: &[SavedJob]) -> Vec<SavedJob> {
  let mut merged: Vec<SavedJob> = Vec::with_capacity(primary.len() + other.len());
  for job in primary.iter().chain(other) {
    if !merged.iter().any(|j| j.job_id == job.job_id) {
      merged.push(job.clone());
    }
  }
  merged
}

/// Saved jobs, durable on the device first and mirrored remotely when signed in.
///
/// Local changes are never rolled back: a failed remote write is reported
/// and the local list keeps the change.
pub struct SavedJobsStore {
  cell: StateCell<Vec<SavedJob>>,
  gateway: Arc<dyn Gateway>,
  cache: QueryCache,
  local: LocalStore,
}

impl SavedJobsStore {
  pub fn new(
    gateway: Arc<dyn Gateway>,
    cache: QueryCache,
    local: LocalStore,
    events: SessionEvents,
  ) -> Self {
    let jobs = local
      .get::<Vec<SavedJob>>(keys::SAVED_JOBS)
      .unwrap_or_default();

    Self {
      cell: StateCell::with_state(StoreState::ready(Some(jobs)), events),
      gateway,
      cache,
      local,
    }
  }

  pub fn state(&self) -> &StateCell<Vec<SavedJob>> {
    &self.cell
  }

  pub fn jobs(&self) -> Vec<SavedJob> {
    self.cell.data().unwrap_or_default()
  }

  pub fn is_saved(&self, job_id: u64) -> bool {
    self
      .cell
      .snapshot()
      .data
      .is_some_and(|jobs| jobs.iter().any(|j| j.job_id == job_id))
  }

  /// Publish the local list, then merge in the remote one when signed in.
  pub async fn load(&self, user_id: Option<&str>) -> SyncResult<Vec<SavedJob>> {
    let _guard = self.cell.lock().await;
    let local_jobs = self
      .local
      .get::<Vec<SavedJob>>(keys::SAVED_JOBS)
      .unwrap_or_default();

    let Some(user_id) = user_id else {
      self.cell.replace(StoreState::ready(Some(local_jobs.clone())));
      return Ok(local_jobs);
    };

    self.cell.replace(StoreState {
      status: StoreStatus::Loading,
      data: Some(local_jobs.clone()),
      error: None,
    });

    let gateway = Arc::clone(&self.gateway);
    let uid = user_id.to_string();
    let fetched = self
      .cache
      .get(QueryKey::saved_jobs(user_id), move || {
        let gateway = Arc::clone(&gateway);
        let uid = uid.clone();
        async move { gateway.list_saved_jobs(&uid).await }
      })
      .await;

    match fetched {
      Ok(remote) => {
        let merged = merge_saved_jobs(&local_jobs, &remote.data);
        self.local.set(keys::SAVED_JOBS, &merged);
        self.cell.replace(StoreState::ready(Some(merged.clone())));
        Ok(merged)
      }
      Err(e) => {
        self.cell.fail(&e);
        Err(e)
      }
    }
  }

  /// Save a job. Returns `false` if it was already saved.
  pub async fn save_job(&self, job: SavedJob, user_id: Option<&str>) -> SyncResult<bool> {
    let changed = AtomicBool::new(false);
    let changed = &changed;
    let local = self.local.clone();
    let gateway = Arc::clone(&self.gateway);
    let uid = user_id.map(str::to_string);
    let entry = job.clone();
    optimistic::run(
      &self.cell,
      RollbackPolicy::KeepLocal,
      move |jobs| {
        if !jobs.iter().any(|j| j.job_id == entry.job_id) {
          jobs.push(entry);
          local.set(keys::SAVED_JOBS, &*jobs);
          changed.store(true, Ordering::SeqCst);
        }
      },
      move |_| {
        let changed = changed.load(Ordering::SeqCst);
        async move {
          match uid {
            Some(uid) if changed => gateway.save_job(&uid, &job).await.map(|_| true),
            _ => Ok(changed),
          }
        }
      },
      self.invalidate_remote(user_id),
    )
    .await
  }

  /// Remove a saved job. Returns `false` if it was not saved.
  pub async fn unsave_job(&self, job_id: u64, user_id: Option<&str>) -> SyncResult<bool> {
    let changed = AtomicBool::new(false);
    let changed = &changed;
    let local = self.local.clone();
    let gateway = Arc::clone(&self.gateway);
    let uid = user_id.map(str::to_string);
    optimistic::run(
      &self.cell,
      RollbackPolicy::KeepLocal,
      move |jobs| {
        let before = jobs.len();
        jobs.retain(|j| j.job_id != job_id);
        if jobs.len() != before {
          local.set(keys::SAVED_JOBS, &*jobs);
          changed.store(true, Ordering::SeqCst);
        }
      },
      move |_| {
        let changed = changed.load(Ordering::SeqCst);
        async move {
          let Some(uid) = uid.filter(|_| changed) else {
            return Ok(changed);
          };
          match gateway.unsave_job(&uid, job_id).await {
            // Already gone remotely
            Err(e) if e.is_not_found() => Ok(true),
            result => result.map(|_| true),
          }
        }
      },
      self.invalidate_remote(user_id),
    )
    .await
  }

  /// Reconcile step for a write: the cached remote list is outdated once it went through.
  fn invalidate_remote(&self, user_id: Option<&str>) -> impl FnOnce(&mut Vec<SavedJob>, &bool) {
    let cache = self.cache.clone();
    let key = user_id.map(QueryKey::saved_jobs);
    move |_, changed| {
      if let (true, Some(key)) = (*changed, key) {
        cache.invalidate(&key);
      }
    }
  }
}
