//! Domain entities synchronized between the device and the backend.

mod account;
mod campus;
mod chat;
mod department;
mod job;
mod membership;
pub mod migration;
mod profile;
mod ui_preferences;

pub use account::{AccountPreferences, Session, Theme, ACCOUNT_PREFERENCES_VERSION};
pub use campus::{default_campuses, merge_campuses, Campus};
pub use chat::{ChatGroup, Notification};
pub use department::{Department, FollowedDepartments};
pub use job::{Job, JobQuery, SavedJob};
pub use membership::{parse_expiry, Membership, MembershipStatus};
pub use profile::{Profile, ProfilePatch};
pub use ui_preferences::{
  FontSize, LayoutDensity, NotificationPreferences, UiPreferences, UI_PREFERENCES_VERSION,
};
