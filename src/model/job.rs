use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Job posting from the WordPress feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
  pub id: u64,
  pub title: String,
  pub campus: Option<String>,
  pub company: Option<String>,
  pub deadline: Option<String>,
  pub link: Option<String>,
}

/// A job bookmarked by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedJob {
  pub job_id: u64,
  pub saved_at: DateTime<Utc>,
  pub title: String,
  pub campus: Option<String>,
}

impl SavedJob {
  pub fn from_job(job: &Job) -> Self {
    Self {
      job_id: job.id,
      saved_at: Utc::now(),
      title: job.title.clone(),
      campus: job.campus.clone(),
    }
  }
}

/// Filter for the jobs feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobQuery {
  pub campus: Option<String>,
  pub include_expired: bool,
  pub page: Option<u32>,
}

impl JobQuery {
  /// Stable cache key for this filter.
  pub fn cache_hash(&self) -> String {
    let input = format!(
      "jobs:{}:{}:{}",
      self
        .campus
        .as_deref()
        .map(|c| c.trim().to_lowercase())
        .unwrap_or_default(),
      self.include_expired,
      self.page.unwrap_or(1)
    );

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cache_hash_normalizes_campus_and_page() {
    let a = JobQuery {
      campus: Some(" Oslo ".into()),
      include_expired: false,
      page: None,
    };
    let b = JobQuery {
      campus: Some("oslo".into()),
      include_expired: false,
      page: Some(1),
    };
    assert_eq!(a.cache_hash(), b.cache_hash());

    let c = JobQuery {
      include_expired: true,
      ..b
    };
    assert_ne!(a.cache_hash(), c.cache_hash());
  }
}
