use serde::{Deserialize, Serialize};

/// A chat group with the number of messages the user has not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatGroup {
  pub id: String,
  pub name: String,
  pub unread: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub id: String,
  pub title: String,
  pub body: String,
  pub read: bool,
}
