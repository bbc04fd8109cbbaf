use std::sync::Arc;

use crate::cache::{QueryCache, QueryKey};
use crate::error::SyncResult;
use crate::gateway::Gateway;
use crate::model::ChatGroup;

use super::optimistic::{self, RollbackPolicy};
use super::state::{SessionEvents, StateCell};

/// Chat groups with unread counters.
pub struct ChatStore {
  cell: StateCell<Vec<ChatGroup>>,
  gateway: Arc<dyn Gateway>,
  cache: QueryCache,
}

impl ChatStore {
  pub fn new(gateway: Arc<dyn Gateway>, cache: QueryCache, events: SessionEvents) -> Self {
    Self {
      cell: StateCell::new(events),
      gateway,
      cache,
    }
  }

  pub fn state(&self) -> &StateCell<Vec<ChatGroup>> {
    &self.cell
  }

  pub fn chats(&self) -> Vec<ChatGroup> {
    self.cell.data().unwrap_or_default()
  }

  pub fn total_unread(&self) -> u32 {
    self
      .cell
      .snapshot()
      .data
      .map(|chats| chats.iter().map(|c| c.unread).sum())
      .unwrap_or(0)
  }

  pub fn unread(&self, chat_id: &str) -> u32 {
    self
      .cell
      .snapshot()
      .data
      .and_then(|chats| chats.into_iter().find(|c| c.id == chat_id))
      .map(|c| c.unread)
      .unwrap_or(0)
  }

  pub async fn load(&self, user_id: &str) -> SyncResult<Vec<ChatGroup>> {
    let gateway = Arc::clone(&self.gateway);
    let uid = user_id.to_string();
    let fetch = self.cache.get(QueryKey::chats(user_id), move || {
      let gateway = Arc::clone(&gateway);
      let uid = uid.clone();
      async move { gateway.list_chats(&uid).await }
    });
    self
      .cell
      .load_with(async { fetch.await.map(|r| (*r.data).clone()) })
      .await
  }

  pub async fn mark_read(&self, user_id: &str, chat_id: &str) -> SyncResult<()> {
    if self.unread(chat_id) == 0 {
      return Ok(());
    }

    let gateway = Arc::clone(&self.gateway);
    let cache = self.cache.clone();
    let key = QueryKey::chats(user_id);
    let uid = user_id.to_string();
    let cid = chat_id.to_string();
    optimistic::run(
      &self.cell,
      RollbackPolicy::Revert,
      |chats| {
        if let Some(chat) = chats.iter_mut().find(|c| c.id == chat_id) {
          chat.unread = 0;
        }
      },
      move |_| async move { gateway.mark_chat_read(&uid, &cid).await },
      move |_, _| cache.invalidate(&key),
    )
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
  use crate::testing::{cache, FakeGateway};

  fn chats() -> Vec<ChatGroup> {
    vec![
      ChatGroup {
        id: "c1".into(),
        name: "Board".into(),
        unread: 3,
      },
      ChatGroup {
        id: "c2".into(),
        name: "Events".into(),
        unread: 2,
      },
    ]
  }

  async fn loaded(gateway: &Arc<FakeGateway>) -> ChatStore {
    let store = ChatStore::new(gateway.clone(), cache(), SessionEvents::new());
    store.load("u1").await.unwrap();
    store
  }

  #[tokio::test]
  async fn test_total_unread() {
    let gateway = Arc::new(FakeGateway::new().with_chats("u1", chats()));
    let store = loaded(&gateway).await;
    assert_eq!(store.total_unread(), 5);
  }

  #[tokio::test]
  async fn test_mark_read_clears_counter() {
    let gateway = Arc::new(FakeGateway::new().with_chats("u1", chats()));
    let store = loaded(&gateway).await;

    store.mark_read("u1", "c1").await.unwrap();
    assert_eq!(store.unread("c1"), 0);
    assert_eq!(store.total_unread(), 2);

    // Nothing left to clear
    store.mark_read("u1", "c1").await.unwrap();
    assert_eq!(gateway.calls("mark_chat_read"), 1);
  }

  #[tokio::test]
  async fn test_failed_mark_read_restores_counter() {
    let gateway = Arc::new(FakeGateway::new().with_chats("u1", chats()));
    let store = loaded(&gateway).await;

    gateway.fail("mark_chat_read", SyncError::Network("offline".into()));
    assert!(store.mark_read("u1", "c1").await.is_err());
    assert_eq!(store.unread("c1"), 3);
    assert!(store.state().snapshot().error.is_some());
  }

  #[tokio::test]
  async fn test_read_chat_stays_read_after_reload() {
    let gateway = Arc::new(FakeGateway::new().with_chats("u1", chats()));
    let store = loaded(&gateway).await;

    store.mark_read("u1", "c1").await.unwrap();
    store.load("u1").await.unwrap();

    assert_eq!(store.unread("c1"), 0);
    assert_eq!(store.total_unread(), 2);
    assert_eq!(gateway.calls("list_chats"), 2);
  }
}
