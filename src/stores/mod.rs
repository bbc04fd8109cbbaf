//! Client state stores.
//!
//! Each store owns one slice of client state, publishes it through a
//! [`StateCell`] and talks to the backend only through the injected
//! [`Gateway`](crate::gateway::Gateway) and [`QueryCache`](crate::cache::QueryCache).

mod auth;
mod campus;
mod chat;
mod department_follow;
mod membership;
pub mod optimistic;
mod profile;
mod saved_jobs;
mod state;
mod ui_preferences;

pub use auth::AuthStore;
pub use campus::{resolve_campus, CampusSelection, CampusStore};
pub use chat::ChatStore;
pub use department_follow::DepartmentFollowStore;
pub use membership::MembershipStore;
pub use optimistic::RollbackPolicy;
pub use profile::ProfileStore;
pub use saved_jobs::{merge_saved_jobs, SavedJobsStore};
pub use state::{SessionEvent, SessionEvents, StateCell, StoreState, StoreStatus};
pub use ui_preferences::UiPreferencesStore;
