//! The `MatchStore` trait and its change feed.
//!
//! The trait is implemented by storage backends (`mentorlink-store-sqlite`,
//! and [`crate::memory::MemoryStore`] for tests). The workflow components
//! depend on this abstraction, not on any concrete backend.
//!
//! Backend errors are infrastructure failures only. Domain outcomes (a
//! missing row, a lost compare-and-set, an already-existing thread) are
//! reported through the return values ([`Transition`], [`ChatInsert`],
//! `Option`) so the components can map them onto [`crate::Error`].

use std::future::Future;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  chat::{CanonicalPair, ChatInsert, ChatThread, Message, NewChat, ParticipantsMeta},
  profile::{MentorQuery, UserId, UserProfile},
  request::{MentorRequest, NewRequest, RequestQuery, RequestStatus, Transition},
};

// ─── Change feed ─────────────────────────────────────────────────────────────

/// A committed write, published after the backend has made it visible.
/// Live views re-run their query when a change they care about arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
  Profile {
    user_id: UserId,
  },
  Request {
    request_id: Uuid,
    mentor_id:  UserId,
    mentee_id:  UserId,
  },
  /// Thread created or its metadata changed.
  Chat {
    chat_id:      Uuid,
    participants: CanonicalPair,
  },
  /// A message was appended and the thread summary updated with it.
  Message {
    chat_id:      Uuid,
    participants: CanonicalPair,
  },
}

impl Change {
  pub fn for_request(request: &MentorRequest) -> Self {
    Self::Request {
      request_id: request.request_id,
      mentor_id:  request.mentor_id.clone(),
      mentee_id:  request.mentee_id.clone(),
    }
  }

  pub fn for_chat(chat: &ChatThread) -> Self {
    Self::Chat { chat_id: chat.chat_id, participants: chat.participants.clone() }
  }

  /// Whether this change can alter the thread list of `user_id`.
  pub fn touches_threads_of(&self, user_id: &UserId) -> bool {
    match self {
      Self::Chat { participants, .. } | Self::Message { participants, .. } => {
        participants.contains(user_id)
      }
      _ => false,
    }
  }

  /// Whether this change can alter the message log of `chat_id`.
  pub fn touches_messages_of(&self, chat_id: Uuid) -> bool {
    matches!(self, Self::Message { chat_id: id, .. } if *id == chat_id)
  }

  /// Whether this change can alter the request list of `mentor_id`.
  pub fn touches_requests_of(&self, mentor_id: &UserId) -> bool {
    matches!(self, Self::Request { mentor_id: id, .. } if id == mentor_id)
  }
}

/// Capacity of a backend's change channel. Slow subscribers that fall further
/// behind see a lag notification and re-query.
pub const CHANGE_CAPACITY: usize = 256;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a durable keyed store with live-query support.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait MatchStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Subscribe to committed writes.
  fn changes(&self) -> broadcast::Receiver<Change>;

  // ── Profiles ──────────────────────────────────────────────────────────

  /// Insert or replace a profile. `created_at` is kept from the existing row
  /// when there is one; `updated_at` is set by the store.
  fn put_profile(
    &self,
    profile: UserProfile,
  ) -> impl Future<Output = Result<UserProfile, Self::Error>> + Send + '_;

  fn get_profile(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<Option<UserProfile>, Self::Error>> + Send + '_;

  /// Mentors matching `query`, ordered by display name then id.
  fn list_mentors<'a>(
    &'a self,
    query: &'a MentorQuery,
  ) -> impl Future<Output = Result<Vec<UserProfile>, Self::Error>> + Send + 'a;

  // ── Requests ──────────────────────────────────────────────────────────

  /// Persist a new request in `pending` state.
  fn insert_request(
    &self,
    input: NewRequest,
  ) -> impl Future<Output = Result<MentorRequest, Self::Error>> + Send + '_;

  fn get_request(
    &self,
    request_id: Uuid,
  ) -> impl Future<Output = Result<Option<MentorRequest>, Self::Error>> + Send + '_;

  /// Requests matching `query`, newest first.
  fn list_requests<'a>(
    &'a self,
    query: &'a RequestQuery,
  ) -> impl Future<Output = Result<Vec<MentorRequest>, Self::Error>> + Send + 'a;

  /// Atomically move a `pending` request to `to` and stamp `decided_at`.
  /// The status check and the write are one unit.
  fn transition_request(
    &self,
    request_id: Uuid,
    to: RequestStatus,
  ) -> impl Future<Output = Result<Transition, Self::Error>> + Send + '_;

  /// Set `chat_id` if the request is `accepted` and has none yet. Returns
  /// whether the write happened.
  fn attach_chat(
    &self,
    request_id: Uuid,
    chat_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Chats ─────────────────────────────────────────────────────────────

  /// Create a thread for `input.participants` unless one exists. Must be
  /// atomic with respect to concurrent calls for the same pair; the opening
  /// message and `last_message` are written in the same unit as the thread.
  fn create_chat_if_absent(
    &self,
    input: NewChat,
  ) -> impl Future<Output = Result<ChatInsert, Self::Error>> + Send + '_;

  fn get_chat(
    &self,
    chat_id: Uuid,
  ) -> impl Future<Output = Result<Option<ChatThread>, Self::Error>> + Send + '_;

  fn find_chat(
    &self,
    participants: CanonicalPair,
  ) -> impl Future<Output = Result<Option<ChatThread>, Self::Error>> + Send + '_;

  /// Add metadata for participants that have none yet; existing entries are
  /// kept. Returns the updated thread, or `None` if it does not exist.
  fn enrich_chat_meta(
    &self,
    chat_id: Uuid,
    meta: ParticipantsMeta,
  ) -> impl Future<Output = Result<Option<ChatThread>, Self::Error>> + Send + '_;

  /// Threads `user_id` participates in, most recently updated first.
  fn list_chats_for_user(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<Vec<ChatThread>, Self::Error>> + Send + '_;

  // ── Messages ──────────────────────────────────────────────────────────

  /// Append a message and update the thread's `last_message` /
  /// `last_updated` in the same unit. Returns `None` if the thread does not
  /// exist. Participant checks are the caller's job.
  fn append_message(
    &self,
    chat_id: Uuid,
    sender_id: UserId,
    text: String,
  ) -> impl Future<Output = Result<Option<Message>, Self::Error>> + Send + '_;

  /// Messages of a thread in delivery order (`created_at`, then id).
  fn list_messages(
    &self,
    chat_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send + '_;
}
