use std::sync::Arc;

use crate::cache::{QueryCache, QueryKey};
use crate::error::{SyncError, SyncResult};
use crate::gateway::Gateway;
use crate::local::{keys, LocalStore};
use crate::model::{default_campuses, merge_campuses, Campus};

use super::state::{SessionEvents, StateCell, StoreState, StoreStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampusSelection {
  pub current: Option<Campus>,
  pub available: Vec<Campus>,
}

/// Pick the current campus: stored selection, then profile campus, then the first one.
///
/// A stored campus whose id is gone is matched again by name, so a selection
/// made against the built-in list survives the server assigning new ids.
pub fn resolve_campus(
  stored: Option<&Campus>,
  profile_campus_id: Option<&str>,
  available: &[Campus],
) -> Option<Campus> {
  let by_id = |id: &str| available.iter().find(|c| c.id == id);

  stored
    .and_then(|s| {
      by_id(&s.id).or_else(|| {
        available
          .iter()
          .find(|c| c.name.eq_ignore_ascii_case(&s.name))
      })
    })
    .or_else(|| profile_campus_id.and_then(by_id))
    .or_else(|| available.first())
    .cloned()
}

pub struct CampusStore {
  cell: StateCell<CampusSelection>,
  gateway: Arc<dyn Gateway>,
  cache: QueryCache,
  local: LocalStore,
}

impl CampusStore {
  /// The stored selection is published immediately, before any network call.
  pub fn new(
    gateway: Arc<dyn Gateway>,
    cache: QueryCache,
    local: LocalStore,
    events: SessionEvents,
  ) -> Self {
    let stored = local.get::<Campus>(keys::CAMPUS);
    let status = if stored.is_some() {
      StoreStatus::Ready
    } else {
      StoreStatus::Uninitialized
    };
    let state = StoreState {
      status,
      data: Some(CampusSelection {
        current: stored,
        available: default_campuses(),
      }),
      error: None,
    };

    Self {
      cell: StateCell::with_state(state, events),
      gateway,
      cache,
      local,
    }
  }

  pub fn state(&self) -> &StateCell<CampusSelection> {
    &self.cell
  }

  pub fn current(&self) -> Option<Campus> {
    self.cell.data().and_then(|s| s.current)
  }

  pub fn available(&self) -> Vec<Campus> {
    self
      .cell
      .data()
      .map(|s| s.available)
      .unwrap_or_else(default_campuses)
  }

  /// Refresh the campus list and resolve the current campus.
  ///
  /// A failed list fetch falls back to the built-in campuses; the error is
  /// recorded but never blocks selection.
  pub async fn load(&self, profile_campus_id: Option<&str>) -> SyncResult<CampusSelection> {
    let _guard = self.cell.lock().await;
    self.cell.update(|s| s.status = StoreStatus::Loading);

    let gateway = Arc::clone(&self.gateway);
    let fetched = self
      .cache
      .get(QueryKey::campuses(), move || {
        let gateway = Arc::clone(&gateway);
        async move { gateway.list_campuses().await }
      })
      .await;

    let (server, error) = match fetched {
      Ok(result) => ((*result.data).clone(), None),
      Err(e) => {
        tracing::warn!("Falling back to built-in campus list: {}", e);
        self.cell.events().report(&e);
        (Vec::new(), Some(e.to_string()))
      }
    };

    let available = merge_campuses(&default_campuses(), &server);
    let stored = self.local.get::<Campus>(keys::CAMPUS);
    let current = resolve_campus(stored.as_ref(), profile_campus_id, &available);
    if current != stored {
      if let Some(campus) = &current {
        self.local.set(keys::CAMPUS, campus);
      }
    }

    let selection = CampusSelection { current, available };
    self.cell.replace(StoreState {
      status: StoreStatus::Ready,
      data: Some(selection.clone()),
      error,
    });
    Ok(selection)
  }

  /// Select a campus. The choice is durable before this returns.
  pub fn change_campus(&self, campus_id: &str) -> SyncResult<Campus> {
    let campus = self
      .available()
      .into_iter()
      .find(|c| c.id == campus_id)
      .ok_or_else(|| SyncError::validation("campus_id", format!("unknown campus {}", campus_id)))?;

    self.local.set(keys::CAMPUS, &campus);
    self.cell.update(|s| {
      let available = s
        .data
        .take()
        .map(|d| d.available)
        .unwrap_or_else(default_campuses);
      s.data = Some(CampusSelection {
        current: Some(campus.clone()),
        available,
      });
      s.status = StoreStatus::Ready;
      s.error = None;
    });

    tracing::info!(campus = %campus.name, "Campus changed");
    Ok(campus)
  }
}
