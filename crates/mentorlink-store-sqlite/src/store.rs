//! [`SqliteStore`]: the SQLite implementation of [`MatchStore`].

use std::{path::Path, sync::Arc};

use rusqlite::OptionalExtension as _;
use tokio::sync::broadcast;
use uuid::Uuid;

use mentorlink_core::{
  chat::{
    CanonicalPair, ChatInsert, ChatThread, Message, NewChat, ParticipantsMeta, missing_meta,
  },
  clock::MonotonicClock,
  profile::{MentorQuery, UserId, UserProfile},
  request::{MentorRequest, NewRequest, RequestQuery, RequestStatus, Transition},
  store::{CHANGE_CAPACITY, Change, MatchStore},
};

use crate::{
  Error, Result,
  encode::{
    CHAT_COLUMNS, MESSAGE_COLUMNS, PROFILE_COLUMNS, RawChat, RawMessage, RawProfile, RawRequest,
    REQUEST_COLUMNS, decode_dt, decode_meta, encode_dt, encode_meta, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A match store backed by a single SQLite file.
///
/// Cloning is cheap; clones share the connection, the clock and the change
/// feed. Every write runs on the connection's thread, and timestamps are
/// taken there too, so store order and timestamp order agree.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  clock:   Arc<MonotonicClock>,
  changes: broadcast::Sender<Change>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self::from_connection(conn).await?;
    tracing::debug!(path = %path.display(), "sqlite store opened");
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::from_connection(conn).await
  }

  async fn from_connection(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
    let store = Self { conn, clock: Arc::new(MonotonicClock::new()), changes };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Raw connection, for tests that need rows the public API cannot write.
  #[cfg(test)]
  pub(crate) fn connection(&self) -> &tokio_rusqlite::Connection { &self.conn }

  fn publish(&self, change: Change) {
    // No receivers just means nobody is watching.
    let _ = self.changes.send(change);
  }
}

// ─── Row lookups (run on the connection thread) ──────────────────────────────

fn select_request(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<RawRequest>> {
  conn
    .query_row(
      &format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE request_id = ?1"),
      rusqlite::params![id],
      RawRequest::from_row,
    )
    .optional()
}

fn select_chat(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<RawChat>> {
  conn
    .query_row(
      &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE chat_id = ?1"),
      rusqlite::params![id],
      RawChat::from_row,
    )
    .optional()
}

fn select_chat_by_pair(
  conn: &rusqlite::Connection,
  lo: &str,
  hi: &str,
) -> rusqlite::Result<Option<RawChat>> {
  conn
    .query_row(
      &format!(
        "SELECT {CHAT_COLUMNS} FROM chats WHERE participant_lo = ?1 AND participant_hi = ?2"
      ),
      rusqlite::params![lo, hi],
      RawChat::from_row,
    )
    .optional()
}

/// Carry a decode failure out of a connection closure.
fn in_call(e: Error) -> tokio_rusqlite::Error { tokio_rusqlite::Error::Other(Box::new(e)) }

// ─── MatchStore impl ─────────────────────────────────────────────────────────

impl MatchStore for SqliteStore {
  type Error = Error;

  fn changes(&self) -> broadcast::Receiver<Change> { self.changes.subscribe() }

  // ── Profiles ──────────────────────────────────────────────────────────────

  async fn put_profile(&self, mut profile: UserProfile) -> Result<UserProfile> {
    let clock = Arc::clone(&self.clock);
    let row = profile.clone();
    let role = profile.role.map(|r| r.to_string());
    let skills = serde_json::to_string(&profile.skills)?;

    let (created_at, updated_at) = self
      .conn
      .call(move |conn| {
        let now = clock.tick();
        let created: String = conn.query_row(
          "INSERT INTO profiles (
             user_id, display_name, avatar_url, role, field, bio, skills,
             email, phone, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
           ON CONFLICT (user_id) DO UPDATE SET
             display_name = excluded.display_name,
             avatar_url   = excluded.avatar_url,
             role         = excluded.role,
             field        = excluded.field,
             bio          = excluded.bio,
             skills       = excluded.skills,
             email        = excluded.email,
             phone        = excluded.phone,
             updated_at   = excluded.updated_at
           RETURNING created_at",
          rusqlite::params![
            row.user_id.as_str(),
            row.display_name,
            row.avatar_url,
            role,
            row.field,
            row.bio,
            skills,
            row.email,
            row.phone,
            encode_dt(now),
          ],
          |r| r.get(0),
        )?;
        Ok((created, now))
      })
      .await?;

    profile.created_at = decode_dt(&created_at)?;
    profile.updated_at = updated_at;
    self.publish(Change::Profile { user_id: profile.user_id.clone() });
    Ok(profile)
  }

  async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"),
              rusqlite::params![user_id.as_str()],
              RawProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawProfile::into_profile).transpose()
  }

  async fn list_mentors(&self, query: &MentorQuery) -> Result<Vec<UserProfile>> {
    let field = query.field.clone();

    let raws: Vec<RawProfile> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PROFILE_COLUMNS} FROM profiles
           WHERE role = 'mentor' AND (?1 IS NULL OR field = ?1)
           ORDER BY display_name, user_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![field], RawProfile::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    // Free-text matching is case-insensitive over several columns; it runs
    // here so both backends share one definition.
    let mut mentors = Vec::with_capacity(raws.len());
    for raw in raws {
      let profile = raw.into_profile()?;
      if query.matches(&profile) {
        mentors.push(profile);
      }
    }
    Ok(mentors)
  }

  // ── Requests ──────────────────────────────────────────────────────────────

  async fn insert_request(&self, input: NewRequest) -> Result<MentorRequest> {
    let clock = Arc::clone(&self.clock);
    let request_id = Uuid::new_v4();
    let row = input.clone();
    let id_str = encode_uuid(request_id);

    let created_at = self
      .conn
      .call(move |conn| {
        let now = clock.tick();
        conn.execute(
          "INSERT INTO requests (
             request_id, mentee_id, mentor_id, message, status, created_at,
             mentee_name, mentee_avatar_url
           ) VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7)",
          rusqlite::params![
            id_str,
            row.mentee_id.as_str(),
            row.mentor_id.as_str(),
            row.message,
            encode_dt(now),
            row.mentee_name,
            row.mentee_avatar_url,
          ],
        )?;
        Ok(now)
      })
      .await?;

    let request = MentorRequest {
      request_id,
      mentee_id: input.mentee_id,
      mentor_id: input.mentor_id,
      message: input.message,
      status: RequestStatus::Pending,
      created_at,
      decided_at: None,
      chat_id: None,
      mentee_name: input.mentee_name,
      mentee_avatar_url: input.mentee_avatar_url,
    };
    self.publish(Change::for_request(&request));
    Ok(request)
  }

  async fn get_request(&self, request_id: Uuid) -> Result<Option<MentorRequest>> {
    let id_str = encode_uuid(request_id);
    let raw = self
      .conn
      .call(move |conn| Ok(select_request(conn, &id_str)?))
      .await?;
    raw.map(RawRequest::into_request).transpose()
  }

  async fn list_requests(&self, query: &RequestQuery) -> Result<Vec<MentorRequest>> {
    let mentor = query.mentor_id.as_ref().map(|id| id.as_str().to_owned());
    let mentee = query.mentee_id.as_ref().map(|id| id.as_str().to_owned());
    let status = query.status.map(|s| s.to_string());

    let raws: Vec<RawRequest> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REQUEST_COLUMNS} FROM requests
           WHERE (?1 IS NULL OR mentor_id = ?1)
             AND (?2 IS NULL OR mentee_id = ?2)
             AND (?3 IS NULL OR status = ?3)
           ORDER BY created_at DESC, request_id DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![mentor, mentee, status], RawRequest::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRequest::into_request).collect()
  }

  async fn transition_request(&self, request_id: Uuid, to: RequestStatus) -> Result<Transition> {
    let clock = Arc::clone(&self.clock);
    let id_str = encode_uuid(request_id);
    let to_str = to.to_string();
    let allowed = RequestStatus::Pending.can_transition_to(to);

    let (applied, raw) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        // The status guard in the WHERE clause is the compare-and-set.
        let applied = allowed
          && tx.execute(
            "UPDATE requests SET status = ?2, decided_at = ?3
             WHERE request_id = ?1 AND status = 'pending'",
            rusqlite::params![id_str, to_str, encode_dt(clock.tick())],
          )? == 1;
        let raw = select_request(&tx, &id_str)?;
        tx.commit()?;
        Ok((applied, raw))
      })
      .await?;

    let outcome = match raw {
      None => Transition::Missing,
      Some(raw) if applied => Transition::Applied(raw.into_request()?),
      Some(raw) => Transition::Stale(raw.into_request()?),
    };
    if let Transition::Applied(request) = &outcome {
      self.publish(Change::for_request(request));
    }
    Ok(outcome)
  }

  async fn attach_chat(&self, request_id: Uuid, chat_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(request_id);
    let chat_str = encode_uuid(chat_id);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let updated = tx.execute(
          "UPDATE requests SET chat_id = ?2
           WHERE request_id = ?1 AND status = 'accepted' AND chat_id IS NULL",
          rusqlite::params![id_str, chat_str],
        )?;
        let raw = if updated == 1 { select_request(&tx, &id_str)? } else { None };
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    match raw {
      Some(raw) => {
        self.publish(Change::for_request(&raw.into_request()?));
        Ok(true)
      }
      None => Ok(false),
    }
  }

  // ── Chats ─────────────────────────────────────────────────────────────────

  async fn create_chat_if_absent(&self, input: NewChat) -> Result<ChatInsert> {
    let clock = Arc::clone(&self.clock);
    let chat_id = Uuid::new_v4();
    let message_id = Uuid::new_v4();
    let chat_str = encode_uuid(chat_id);
    let message_str = encode_uuid(message_id);
    let lo = input.participants.first().as_str().to_owned();
    let hi = input.participants.second().as_str().to_owned();
    let meta = encode_meta(&input.participants_meta)?;
    let opening = input.opening.clone();

    let (inserted, raw) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let now = encode_dt(clock.tick());
        let last_message = opening.as_ref().map(|o| o.text.as_str()).unwrap_or_default();

        // The unique pair index arbitrates concurrent creators.
        let inserted = tx.execute(
          "INSERT INTO chats (
             chat_id, participant_lo, participant_hi, participants_meta,
             last_message, last_updated, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
           ON CONFLICT (participant_lo, participant_hi) DO NOTHING",
          rusqlite::params![chat_str, lo, hi, meta, last_message, now],
        )? == 1;

        if inserted && let Some(opening) = &opening {
          tx.execute(
            "INSERT INTO messages (message_id, chat_id, sender_id, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![message_str, chat_str, opening.sender_id.as_str(), opening.text, now],
          )?;
        }

        let raw = select_chat_by_pair(&tx, &lo, &hi)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok((inserted, raw))
      })
      .await?;

    let chat = raw.into_chat()?;
    if !inserted {
      return Ok(ChatInsert::Existing(chat));
    }

    let opening = input.opening.map(|o| Message {
      message_id,
      chat_id,
      sender_id: o.sender_id,
      text: o.text,
      created_at: chat.created_at,
    });

    self.publish(Change::for_chat(&chat));
    if opening.is_some() {
      self.publish(Change::Message { chat_id, participants: chat.participants.clone() });
    }
    Ok(ChatInsert::Created { chat, opening })
  }

  async fn get_chat(&self, chat_id: Uuid) -> Result<Option<ChatThread>> {
    let id_str = encode_uuid(chat_id);
    let raw = self
      .conn
      .call(move |conn| Ok(select_chat(conn, &id_str)?))
      .await?;
    raw.map(RawChat::into_chat).transpose()
  }

  async fn find_chat(&self, participants: CanonicalPair) -> Result<Option<ChatThread>> {
    let raw = self
      .conn
      .call(move |conn| {
        Ok(select_chat_by_pair(
          conn,
          participants.first().as_str(),
          participants.second().as_str(),
        )?)
      })
      .await?;
    raw.map(RawChat::into_chat).transpose()
  }

  async fn enrich_chat_meta(
    &self,
    chat_id: Uuid,
    meta: ParticipantsMeta,
  ) -> Result<Option<ChatThread>> {
    let id_str = encode_uuid(chat_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(raw) = select_chat(&tx, &id_str)? else {
          return Ok(None);
        };

        let mut current = decode_meta(&raw.participants_meta).map_err(in_call)?;
        let patch = missing_meta(&current, &meta);
        if patch.is_empty() {
          return Ok(Some((raw, false)));
        }
        current.extend(patch);

        tx.execute(
          "UPDATE chats SET participants_meta = ?2 WHERE chat_id = ?1",
          rusqlite::params![id_str, encode_meta(&current).map_err(in_call)?],
        )?;
        let raw = select_chat(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw.map(|raw| (raw, true)))
      })
      .await?;

    let Some((raw, changed)) = outcome else {
      return Ok(None);
    };
    let chat = raw.into_chat()?;
    if changed {
      self.publish(Change::for_chat(&chat));
    }
    Ok(Some(chat))
  }

  async fn list_chats_for_user(&self, user_id: UserId) -> Result<Vec<ChatThread>> {
    let raws: Vec<RawChat> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CHAT_COLUMNS} FROM chats
           WHERE participant_lo = ?1 OR participant_hi = ?1
           ORDER BY last_updated DESC, chat_id DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![user_id.as_str()], RawChat::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawChat::into_chat).collect()
  }

  // ── Messages ──────────────────────────────────────────────────────────────

  async fn append_message(
    &self,
    chat_id: Uuid,
    sender_id: UserId,
    text: String,
  ) -> Result<Option<Message>> {
    let clock = Arc::clone(&self.clock);
    let message_id = Uuid::new_v4();
    let chat_str = encode_uuid(chat_id);
    let message_str = encode_uuid(message_id);
    let sender = sender_id.as_str().to_owned();
    let body = text.clone();

    // Message insert and thread summary land in one transaction.
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let now = clock.tick();
        let now_str = encode_dt(now);

        let updated = tx.execute(
          "UPDATE chats SET last_message = ?2, last_updated = ?3 WHERE chat_id = ?1",
          rusqlite::params![chat_str, body, now_str],
        )?;
        if updated == 0 {
          return Ok(None);
        }
        tx.execute(
          "INSERT INTO messages (message_id, chat_id, sender_id, text, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![message_str, chat_str, sender, body, now_str],
        )?;
        let participants: (String, String) = tx.query_row(
          "SELECT participant_lo, participant_hi FROM chats WHERE chat_id = ?1",
          rusqlite::params![chat_str],
          |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        tx.commit()?;
        Ok(Some((now, participants)))
      })
      .await?;

    let Some((created_at, (lo, hi))) = outcome else {
      return Ok(None);
    };
    let participants = CanonicalPair::new(UserId::new(lo), UserId::new(hi))?;
    self.publish(Change::Message { chat_id, participants });

    Ok(Some(Message { message_id, chat_id, sender_id, text, created_at }))
  }

  async fn list_messages(&self, chat_id: Uuid) -> Result<Vec<Message>> {
    let id_str = encode_uuid(chat_id);

    let raws: Vec<RawMessage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MESSAGE_COLUMNS} FROM messages
           WHERE chat_id = ?1
           ORDER BY created_at ASC, message_id ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }
}
