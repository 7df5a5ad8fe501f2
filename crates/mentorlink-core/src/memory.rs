//! [`MemoryStore`]: an in-process [`MatchStore`].
//!
//! Every write takes a single lock over all tables, which gives the same
//! guarantees the SQLite backend gets from transactions: compare-and-set
//! status transitions, a unique index on the canonical participant pair, and
//! message inserts that land together with the thread summary. Useful for
//! tests and for embedding the core without a database.

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use crate::{
  chat::{
    CanonicalPair, ChatInsert, ChatThread, Message, NewChat, ParticipantsMeta, missing_meta,
    sort_messages, sort_threads,
  },
  clock::MonotonicClock,
  profile::{MentorQuery, UserId, UserProfile},
  request::{MentorRequest, NewRequest, RequestQuery, RequestStatus, Transition},
  store::{CHANGE_CAPACITY, Change, MatchStore},
};

#[derive(Default)]
struct Tables {
  profiles:     HashMap<UserId, UserProfile>,
  requests:     HashMap<Uuid, MentorRequest>,
  chats:        HashMap<Uuid, ChatThread>,
  /// Unique index: canonical pair → chat id.
  chat_by_pair: HashMap<CanonicalPair, Uuid>,
  messages:     HashMap<Uuid, Vec<Message>>,
}

struct Inner {
  tables:  Mutex<Tables>,
  clock:   MonotonicClock,
  changes: broadcast::Sender<Change>,
}

/// Cloning is cheap; clones share the same tables and change feed.
#[derive(Clone)]
pub struct MemoryStore {
  inner: Arc<Inner>,
}

impl Default for MemoryStore {
  fn default() -> Self { Self::new() }
}

impl MemoryStore {
  pub fn new() -> Self {
    let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
    Self {
      inner: Arc::new(Inner {
        tables: Mutex::new(Tables::default()),
        clock: MonotonicClock::new(),
        changes,
      }),
    }
  }

  /// Number of threads stored for `pair`; at most one by construction.
  pub async fn chat_count(&self, pair: &CanonicalPair) -> usize {
    let tables = self.inner.tables.lock().await;
    tables
      .chats
      .values()
      .filter(|c| &c.participants == pair)
      .count()
  }

  fn publish(&self, change: Change) {
    // No receivers is fine: nobody is watching.
    let _ = self.inner.changes.send(change);
  }
}

impl MatchStore for MemoryStore {
  type Error = Infallible;

  fn changes(&self) -> broadcast::Receiver<Change> { self.inner.changes.subscribe() }

  // ── Profiles ──────────────────────────────────────────────────────────────

  async fn put_profile(&self, mut profile: UserProfile) -> Result<UserProfile, Infallible> {
    {
      let mut tables = self.inner.tables.lock().await;
      let now = self.inner.clock.tick();
      profile.created_at = tables
        .profiles
        .get(&profile.user_id)
        .map_or(now, |existing| existing.created_at);
      profile.updated_at = now;
      tables.profiles.insert(profile.user_id.clone(), profile.clone());
    }
    self.publish(Change::Profile { user_id: profile.user_id.clone() });
    Ok(profile)
  }

  async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, Infallible> {
    Ok(self.inner.tables.lock().await.profiles.get(&user_id).cloned())
  }

  async fn list_mentors(&self, query: &MentorQuery) -> Result<Vec<UserProfile>, Infallible> {
    let tables = self.inner.tables.lock().await;
    let mut mentors: Vec<UserProfile> = tables
      .profiles
      .values()
      .filter(|p| query.matches(p))
      .cloned()
      .collect();
    mentors.sort_by(|a, b| {
      a.display_name
        .cmp(&b.display_name)
        .then_with(|| a.user_id.cmp(&b.user_id))
    });
    Ok(mentors)
  }

  // ── Requests ──────────────────────────────────────────────────────────────

  async fn insert_request(&self, input: NewRequest) -> Result<MentorRequest, Infallible> {
    let request = {
      let mut tables = self.inner.tables.lock().await;
      let request = MentorRequest {
        request_id:        Uuid::new_v4(),
        mentee_id:         input.mentee_id,
        mentor_id:         input.mentor_id,
        message:           input.message,
        status:            RequestStatus::Pending,
        created_at:        self.inner.clock.tick(),
        decided_at:        None,
        chat_id:           None,
        mentee_name:       input.mentee_name,
        mentee_avatar_url: input.mentee_avatar_url,
      };
      tables.requests.insert(request.request_id, request.clone());
      request
    };
    self.publish(Change::for_request(&request));
    Ok(request)
  }

  async fn get_request(&self, request_id: Uuid) -> Result<Option<MentorRequest>, Infallible> {
    Ok(self.inner.tables.lock().await.requests.get(&request_id).cloned())
  }

  async fn list_requests(&self, query: &RequestQuery) -> Result<Vec<MentorRequest>, Infallible> {
    let tables = self.inner.tables.lock().await;
    let mut requests: Vec<MentorRequest> = tables
      .requests
      .values()
      .filter(|r| query.matches(r))
      .cloned()
      .collect();
    requests.sort_by(|a, b| {
      b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.request_id.cmp(&a.request_id))
    });
    Ok(requests)
  }

  async fn transition_request(
    &self,
    request_id: Uuid,
    to: RequestStatus,
  ) -> Result<Transition, Infallible> {
    let outcome = {
      let mut tables = self.inner.tables.lock().await;
      match tables.requests.get_mut(&request_id) {
        None => Transition::Missing,
        Some(request) if !request.status.can_transition_to(to) => {
          Transition::Stale(request.clone())
        }
        Some(request) => {
          request.status = to;
          request.decided_at = Some(self.inner.clock.tick());
          Transition::Applied(request.clone())
        }
      }
    };
    if let Transition::Applied(request) = &outcome {
      self.publish(Change::for_request(request));
    }
    Ok(outcome)
  }

  async fn attach_chat(&self, request_id: Uuid, chat_id: Uuid) -> Result<bool, Infallible> {
    let attached = {
      let mut tables = self.inner.tables.lock().await;
      match tables.requests.get_mut(&request_id) {
        Some(request) if request.status == RequestStatus::Accepted && request.chat_id.is_none() => {
          request.chat_id = Some(chat_id);
          Some(request.clone())
        }
        _ => None,
      }
    };
    Ok(match attached {
      Some(request) => {
        self.publish(Change::for_request(&request));
        true
      }
      None => false,
    })
  }

  // ── Chats ─────────────────────────────────────────────────────────────────

  async fn create_chat_if_absent(&self, input: NewChat) -> Result<ChatInsert, Infallible> {
    let outcome = {
      let mut tables = self.inner.tables.lock().await;

      if let Some(existing) = tables
        .chat_by_pair
        .get(&input.participants)
        .and_then(|id| tables.chats.get(id))
      {
        return Ok(ChatInsert::Existing(existing.clone()));
      }

      let now = self.inner.clock.tick();
      let chat_id = Uuid::new_v4();
      let opening = input.opening.map(|o| Message {
        message_id: Uuid::new_v4(),
        chat_id,
        sender_id:  o.sender_id,
        text:       o.text,
        created_at: now,
      });
      let chat = ChatThread {
        chat_id,
        participants: input.participants.clone(),
        participants_meta: input.participants_meta,
        last_message: opening.as_ref().map(|m| m.text.clone()).unwrap_or_default(),
        last_updated: now,
        created_at: now,
      };

      tables.chat_by_pair.insert(input.participants, chat_id);
      tables.chats.insert(chat_id, chat.clone());
      tables
        .messages
        .insert(chat_id, opening.iter().cloned().collect());

      ChatInsert::Created { chat, opening }
    };

    self.publish(Change::for_chat(outcome.chat()));
    if let ChatInsert::Created { chat, opening: Some(_) } = &outcome {
      self.publish(Change::Message {
        chat_id:      chat.chat_id,
        participants: chat.participants.clone(),
      });
    }
    Ok(outcome)
  }

  async fn get_chat(&self, chat_id: Uuid) -> Result<Option<ChatThread>, Infallible> {
    Ok(self.inner.tables.lock().await.chats.get(&chat_id).cloned())
  }

  async fn find_chat(&self, participants: CanonicalPair) -> Result<Option<ChatThread>, Infallible> {
    let tables = self.inner.tables.lock().await;
    Ok(
      tables
        .chat_by_pair
        .get(&participants)
        .and_then(|id| tables.chats.get(id))
        .cloned(),
    )
  }

  async fn enrich_chat_meta(
    &self,
    chat_id: Uuid,
    meta: ParticipantsMeta,
  ) -> Result<Option<ChatThread>, Infallible> {
    let (chat, changed) = {
      let mut tables = self.inner.tables.lock().await;
      let Some(chat) = tables.chats.get_mut(&chat_id) else {
        return Ok(None);
      };
      let patch = missing_meta(&chat.participants_meta, &meta);
      let changed = !patch.is_empty();
      chat.participants_meta.extend(patch);
      (chat.clone(), changed)
    };
    if changed {
      self.publish(Change::for_chat(&chat));
    }
    Ok(Some(chat))
  }

  async fn list_chats_for_user(&self, user_id: UserId) -> Result<Vec<ChatThread>, Infallible> {
    let tables = self.inner.tables.lock().await;
    let mut chats: Vec<ChatThread> = tables
      .chats
      .values()
      .filter(|c| c.participants.contains(&user_id))
      .cloned()
      .collect();
    sort_threads(&mut chats);
    Ok(chats)
  }

  // ── Messages ──────────────────────────────────────────────────────────────

  async fn append_message(
    &self,
    chat_id: Uuid,
    sender_id: UserId,
    text: String,
  ) -> Result<Option<Message>, Infallible> {
    let (message, participants) = {
      let mut tables = self.inner.tables.lock().await;
      let Some(chat) = tables.chats.get_mut(&chat_id) else {
        return Ok(None);
      };

      let message = Message {
        message_id: Uuid::new_v4(),
        chat_id,
        sender_id,
        text,
        created_at: self.inner.clock.tick(),
      };
      chat.last_message = message.text.clone();
      chat.last_updated = message.created_at;
      let participants = chat.participants.clone();

      tables
        .messages
        .entry(chat_id)
        .or_default()
        .push(message.clone());
      (message, participants)
    };
    self.publish(Change::Message { chat_id, participants });
    Ok(Some(message))
  }

  async fn list_messages(&self, chat_id: Uuid) -> Result<Vec<Message>, Infallible> {
    let tables = self.inner.tables.lock().await;
    let mut messages = tables.messages.get(&chat_id).cloned().unwrap_or_default();
    sort_messages(&mut messages);
    Ok(messages)
  }
}
