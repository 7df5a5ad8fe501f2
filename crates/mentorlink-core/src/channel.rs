//! Message Channel: the append-only log of a chat thread and the live views
//! over it.

use uuid::Uuid;

use crate::{
  DEFAULT_LIVE_BUFFER, Error, Result,
  chat::{ChatThread, Message},
  live::Subscription,
  profile::UserId,
  store::MatchStore,
};

#[derive(Clone)]
pub struct MessageChannel<S> {
  store:       S,
  live_buffer: usize,
}

impl<S: MatchStore + Clone + 'static> MessageChannel<S> {
  pub fn new(store: S) -> Self { Self { store, live_buffer: DEFAULT_LIVE_BUFFER } }

  pub fn with_live_buffer(mut self, live_buffer: usize) -> Self {
    self.live_buffer = live_buffer;
    self
  }

  pub async fn thread(&self, chat_id: Uuid) -> Result<ChatThread> {
    self
      .store
      .get_chat(chat_id)
      .await
      .map_err(Error::transient)?
      .ok_or_else(|| Error::not_found("chat", chat_id))
  }

  /// Append `text` from `sender_id`. The thread's `last_message` and
  /// `last_updated` change in the same store write.
  pub async fn append(&self, chat_id: Uuid, sender_id: &UserId, text: &str) -> Result<Uuid> {
    if text.trim().is_empty() {
      return Err(Error::Validation("message text is empty".into()));
    }

    let chat = self.thread(chat_id).await?;
    if !chat.participants.contains(sender_id) {
      return Err(Error::Forbidden(format!(
        "{sender_id} is not a participant of chat {chat_id}"
      )));
    }

    let message = self
      .store
      .append_message(chat_id, sender_id.clone(), text.to_owned())
      .await
      .map_err(Error::transient)?
      .ok_or_else(|| Error::not_found("chat", chat_id))?;

    tracing::debug!(%chat_id, message_id = %message.message_id, "message appended");
    Ok(message.message_id)
  }

  /// The thread's messages in delivery order.
  pub async fn history(&self, chat_id: Uuid) -> Result<Vec<Message>> {
    self
      .store
      .list_messages(chat_id)
      .await
      .map_err(Error::transient)
  }

  /// The threads `user_id` takes part in, most recently updated first.
  pub async fn threads_for_user(&self, user_id: &UserId) -> Result<Vec<ChatThread>> {
    self
      .store
      .list_chats_for_user(user_id.clone())
      .await
      .map_err(Error::transient)
  }

  /// Live view of a thread's messages, oldest first. Re-subscribe to restart.
  pub fn subscribe(&self, chat_id: Uuid) -> Subscription<Message> {
    let store = self.store.clone();
    Subscription::spawn(
      &self.store,
      self.live_buffer,
      move |change| change.touches_messages_of(chat_id),
      move || {
        let store = store.clone();
        async move { store.list_messages(chat_id).await.map_err(Error::transient) }
      },
    )
  }

  /// Live view of the threads `user_id` takes part in, most recently updated
  /// first.
  pub fn subscribe_threads_for_user(&self, user_id: &UserId) -> Subscription<ChatThread> {
    let store = self.store.clone();
    let watched = user_id.clone();
    let user_id = user_id.clone();
    Subscription::spawn(
      &self.store,
      self.live_buffer,
      move |change| change.touches_threads_of(&watched),
      move || {
        let store = store.clone();
        let user_id = user_id.clone();
        async move { store.list_chats_for_user(user_id).await.map_err(Error::transient) }
      },
    )
  }
}
