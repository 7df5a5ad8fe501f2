//! Chat threads, their canonical participant pair, and messages.
//!
//! A thread is identified by a [`CanonicalPair`]: the two participant ids in
//! sorted order. Stores keep a unique index on the pair, so at most one thread
//! exists for any two users regardless of who opened it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  profile::{DisplayFields, UserId},
};

/// Name shown for a participant whose display fields are unknown.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Participant id → display fields captured at creation / first enrichment.
pub type ParticipantsMeta = BTreeMap<UserId, DisplayFields>;

// ─── Canonical pair ──────────────────────────────────────────────────────────

/// Two distinct participant ids, sorted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "[UserId; 2]", try_from = "[UserId; 2]")]
pub struct CanonicalPair {
  first:  UserId,
  second: UserId,
}

impl CanonicalPair {
  /// Canonicalise an unordered pair. Fails on blank or identical ids.
  pub fn new(a: UserId, b: UserId) -> Result<Self> {
    if a.is_blank() || b.is_blank() {
      return Err(Error::Validation("chat participant id is empty".into()));
    }
    if a == b {
      return Err(Error::Validation(format!(
        "cannot open a chat between {a} and themselves"
      )));
    }
    let (first, second) = if a < b { (a, b) } else { (b, a) };
    Ok(Self { first, second })
  }

  pub fn first(&self) -> &UserId { &self.first }

  pub fn second(&self) -> &UserId { &self.second }

  pub fn contains(&self, user_id: &UserId) -> bool {
    &self.first == user_id || &self.second == user_id
  }

  /// The other participant, or `None` if `user_id` is not in the pair.
  pub fn peer_of(&self, user_id: &UserId) -> Option<&UserId> {
    if &self.first == user_id {
      Some(&self.second)
    } else if &self.second == user_id {
      Some(&self.first)
    } else {
      None
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = &UserId> {
    [&self.first, &self.second].into_iter()
  }
}

impl From<CanonicalPair> for [UserId; 2] {
  fn from(pair: CanonicalPair) -> Self { [pair.first, pair.second] }
}

impl TryFrom<[UserId; 2]> for CanonicalPair {
  type Error = Error;

  fn try_from([a, b]: [UserId; 2]) -> Result<Self> { Self::new(a, b) }
}

// ─── Thread ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatThread {
  pub chat_id:           Uuid,
  pub participants:      CanonicalPair,
  pub participants_meta: ParticipantsMeta,
  /// Text of the most recent message; empty for a thread with no messages.
  pub last_message:      String,
  /// Drives chat-list ordering (newest first).
  pub last_updated:      DateTime<Utc>,
  pub created_at:        DateTime<Utc>,
}

impl ChatThread {
  pub fn peer_of(&self, user_id: &UserId) -> Option<&UserId> {
    self.participants.peer_of(user_id)
  }

  /// Display fields for a participant with the `"Unknown"` fallback applied.
  pub fn display_for(&self, user_id: &UserId) -> DisplayFields {
    let meta = self.participants_meta.get(user_id).cloned().unwrap_or_default();
    DisplayFields::new(meta.name_or(UNKNOWN_NAME), meta.avatar_url.clone())
  }
}

/// Input to [`crate::store::MatchStore::create_chat_if_absent`].
#[derive(Debug, Clone)]
pub struct NewChat {
  pub participants:      CanonicalPair,
  pub participants_meta: ParticipantsMeta,
  /// Written in the same unit as the thread when present.
  pub opening:           Option<OpeningMessage>,
}

#[derive(Debug, Clone)]
pub struct OpeningMessage {
  pub sender_id: UserId,
  pub text:      String,
}

/// Outcome of an atomic create-if-absent on the canonical pair.
#[derive(Debug, Clone)]
pub enum ChatInsert {
  /// A new thread was written, together with its opening message if any.
  Created {
    chat:    ChatThread,
    opening: Option<Message>,
  },
  /// A thread for the pair already existed; nothing was written.
  Existing(ChatThread),
}

impl ChatInsert {
  pub fn chat(&self) -> &ChatThread {
    match self {
      Self::Created { chat, .. } | Self::Existing(chat) => chat,
    }
  }

  pub fn into_chat(self) -> ChatThread {
    match self {
      Self::Created { chat, .. } | Self::Existing(chat) => chat,
    }
  }
}

/// Entries of `incoming` whose participant has no metadata in `current` yet.
/// Existing entries are never overwritten.
pub fn missing_meta(current: &ParticipantsMeta, incoming: &ParticipantsMeta) -> ParticipantsMeta {
  incoming
    .iter()
    .filter(|(id, _)| !current.contains_key(*id))
    .map(|(id, meta)| (id.clone(), meta.clone()))
    .collect()
}

// ─── Message ─────────────────────────────────────────────────────────────────

/// An immutable chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub message_id: Uuid,
  pub chat_id:    Uuid,
  pub sender_id:  UserId,
  pub text:       String,
  /// Store-assigned; strictly increasing within a store.
  pub created_at: DateTime<Utc>,
}

impl Message {
  /// Delivery order key: `created_at`, then id for equal timestamps.
  pub fn order_key(&self) -> (DateTime<Utc>, Uuid) { (self.created_at, self.message_id) }
}

/// Sort messages into delivery order.
pub fn sort_messages(messages: &mut [Message]) {
  messages.sort_by_key(Message::order_key);
}

/// Sort threads for a chat list: most recently updated first.
pub fn sort_threads(threads: &mut [ChatThread]) {
  threads.sort_by(|a, b| {
    b.last_updated
      .cmp(&a.last_updated)
      .then_with(|| b.chat_id.cmp(&a.chat_id))
  });
}
