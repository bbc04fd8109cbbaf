use std::sync::Arc;

use chrono::NaiveDate;

use crate::cache::{QueryCache, QueryKey};
use crate::error::SyncResult;
use crate::gateway::Gateway;
use crate::model::MembershipStatus;

use super::state::{SessionEvents, StateCell, StoreState};

/// Membership derived from the profile's student id. Read-only.
pub struct MembershipStore {
  cell: StateCell<MembershipStatus>,
  gateway: Arc<dyn Gateway>,
  cache: QueryCache,
}

impl MembershipStore {
  pub fn new(gateway: Arc<dyn Gateway>, cache: QueryCache, events: SessionEvents) -> Self {
    Self {
      cell: StateCell::new(events),
      gateway,
      cache,
    }
  }

  pub fn state(&self) -> &StateCell<MembershipStatus> {
    &self.cell
  }

  pub fn is_member(&self) -> bool {
    self.cell.data().is_some_and(|m| m.is_biso_member)
  }

  pub fn expiry(&self) -> Option<NaiveDate> {
    self.cell.data().and_then(|m| m.membership_expiry)
  }

  /// Look up the membership for `student_id`. No id, or no record, means non-member.
  pub async fn load(&self, student_id: Option<&str>) -> SyncResult<MembershipStatus> {
    let Some(student_id) = student_id.map(str::trim).filter(|s| !s.is_empty()) else {
      let status = MembershipStatus::default();
      self.cell.replace(StoreState::ready(Some(status.clone())));
      return Ok(status);
    };

    let gateway = Arc::clone(&self.gateway);
    let sid = student_id.to_string();
    let fetch = self.cache.get(QueryKey::membership(student_id), move || {
      let gateway = Arc::clone(&gateway);
      let sid = sid.clone();
      async move {
        match gateway.get_membership(&sid).await {
          Ok(membership) => Ok(Some(membership)),
          Err(e) if e.is_not_found() => Ok(None),
          Err(e) => Err(e),
        }
      }
    });
    self
      .cell
      .load_with(async {
        fetch
          .await
          .map(|r| MembershipStatus::from_membership((*r.data).clone()))
      })
      .await
  }

  pub fn reset(&self) {
    self.cell.reset();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::SyncError;
  use crate::model::Membership;
  use crate::stores::StoreStatus;
  use crate::testing::{cache, FakeGateway};

  fn membership(status: bool, expiry: &str) -> Membership {
    Membership {
      membership_id: "m1".into(),
      name: "Semester".into(),
      price: 350.0,
      category: "student".into(),
      status,
      expiry_date: Some(expiry.into()),
    }
  }

  #[tokio::test]
  async fn test_active_membership_for_student_id() {
    let gateway = Arc::new(FakeGateway::new().with_membership("12345", membership(true, "2025-12-31")));
    let store = MembershipStore::new(gateway.clone(), cache(), SessionEvents::new());

    let status = store.load(Some("12345")).await.unwrap();
    assert!(status.is_biso_member);
    assert_eq!(
      status.membership_expiry,
      NaiveDate::from_ymd_opt(2025, 12, 31)
    );
    assert!(store.is_member());
    assert_eq!(store.expiry(), NaiveDate::from_ymd_opt(2025, 12, 31));
  }

  #[tokio::test]
  async fn test_unknown_student_is_not_a_member() {
    let gateway = Arc::new(FakeGateway::new());
    let store = MembershipStore::new(gateway.clone(), cache(), SessionEvents::new());

    let status = store.load(Some("999")).await.unwrap();
    assert!(!status.is_biso_member);
    assert_eq!(store.state().status(), StoreStatus::Ready);
  }

  #[tokio::test]
  async fn test_missing_student_id_skips_network() {
    let gateway = Arc::new(FakeGateway::new());
    let store = MembershipStore::new(gateway.clone(), cache(), SessionEvents::new());

    assert!(!store.load(None).await.unwrap().is_biso_member);
    assert!(!store.load(Some("  ")).await.unwrap().is_biso_member);
    assert_eq!(gateway.calls("get_membership"), 0);
  }

  #[tokio::test]
  async fn test_server_failure_is_error_state() {
    let gateway = Arc::new(FakeGateway::new());
    gateway.fail("get_membership", SyncError::from_status(500, "boom"));
    let store = MembershipStore::new(gateway.clone(), cache(), SessionEvents::new());

    assert!(store.load(Some("12345")).await.is_err());
    assert_eq!(store.state().status(), StoreStatus::Error);
  }
}
