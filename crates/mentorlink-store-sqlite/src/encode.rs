//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with microsecond
//! precision, so lexical order is chronological order. Enums are stored by
//! their lowercase names, structured fields as compact JSON and UUIDs as
//! hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use mentorlink_core::{
  chat::{CanonicalPair, ChatThread, Message, ParticipantsMeta},
  profile::{Role, UserId, UserProfile},
  request::{MentorRequest, RequestStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_enum<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  T::from_str(s).map_err(|_| Error::UnknownVariant { column, value: s.to_owned() })
}

pub fn encode_meta(meta: &ParticipantsMeta) -> Result<String> { Ok(serde_json::to_string(meta)?) }

pub fn decode_meta(s: &str) -> Result<ParticipantsMeta> { Ok(serde_json::from_str(s)?) }

// ─── Column lists ────────────────────────────────────────────────────────────

pub const PROFILE_COLUMNS: &str = "user_id, display_name, avatar_url, role, field, bio, skills, \
                                   email, phone, created_at, updated_at";

pub const REQUEST_COLUMNS: &str = "request_id, mentee_id, mentor_id, message, status, created_at, \
                                   decided_at, chat_id, mentee_name, mentee_avatar_url";

pub const CHAT_COLUMNS: &str =
  "chat_id, participant_lo, participant_hi, participants_meta, last_message, last_updated, \
   created_at";

pub const MESSAGE_COLUMNS: &str = "message_id, chat_id, sender_id, text, created_at";

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `profiles` row.
pub struct RawProfile {
  pub user_id:      String,
  pub display_name: String,
  pub avatar_url:   String,
  pub role:         Option<String>,
  pub field:        String,
  pub bio:          String,
  pub skills:       String,
  pub email:        String,
  pub phone:        String,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawProfile {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:      row.get(0)?,
      display_name: row.get(1)?,
      avatar_url:   row.get(2)?,
      role:         row.get(3)?,
      field:        row.get(4)?,
      bio:          row.get(5)?,
      skills:       row.get(6)?,
      email:        row.get(7)?,
      phone:        row.get(8)?,
      created_at:   row.get(9)?,
      updated_at:   row.get(10)?,
    })
  }

  pub fn into_profile(self) -> Result<UserProfile> {
    Ok(UserProfile {
      user_id:      UserId::new(self.user_id),
      display_name: self.display_name,
      avatar_url:   self.avatar_url,
      role:         self
        .role
        .as_deref()
        .map(|r| decode_enum::<Role>("role", r))
        .transpose()?,
      field:        self.field,
      bio:          self.bio,
      skills:       serde_json::from_str(&self.skills)?,
      email:        self.email,
      phone:        self.phone,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `requests` row.
pub struct RawRequest {
  pub request_id:        String,
  pub mentee_id:         String,
  pub mentor_id:         String,
  pub message:           String,
  pub status:            String,
  pub created_at:        String,
  pub decided_at:        Option<String>,
  pub chat_id:           Option<String>,
  pub mentee_name:       String,
  pub mentee_avatar_url: String,
}

impl RawRequest {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      request_id:        row.get(0)?,
      mentee_id:         row.get(1)?,
      mentor_id:         row.get(2)?,
      message:           row.get(3)?,
      status:            row.get(4)?,
      created_at:        row.get(5)?,
      decided_at:        row.get(6)?,
      chat_id:           row.get(7)?,
      mentee_name:       row.get(8)?,
      mentee_avatar_url: row.get(9)?,
    })
  }

  pub fn into_request(self) -> Result<MentorRequest> {
    Ok(MentorRequest {
      request_id:        decode_uuid(&self.request_id)?,
      mentee_id:         UserId::new(self.mentee_id),
      mentor_id:         UserId::new(self.mentor_id),
      message:           self.message,
      status:            decode_enum::<RequestStatus>("status", &self.status)?,
      created_at:        decode_dt(&self.created_at)?,
      decided_at:        self.decided_at.as_deref().map(decode_dt).transpose()?,
      chat_id:           self.chat_id.as_deref().map(decode_uuid).transpose()?,
      mentee_name:       self.mentee_name,
      mentee_avatar_url: self.mentee_avatar_url,
    })
  }
}

/// Raw strings read directly from a `chats` row.
pub struct RawChat {
  pub chat_id:           String,
  pub participant_lo:    String,
  pub participant_hi:    String,
  pub participants_meta: String,
  pub last_message:      String,
  pub last_updated:      String,
  pub created_at:        String,
}

impl RawChat {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      chat_id:           row.get(0)?,
      participant_lo:    row.get(1)?,
      participant_hi:    row.get(2)?,
      participants_meta: row.get(3)?,
      last_message:      row.get(4)?,
      last_updated:      row.get(5)?,
      created_at:        row.get(6)?,
    })
  }

  pub fn into_chat(self) -> Result<ChatThread> {
    Ok(ChatThread {
      chat_id:           decode_uuid(&self.chat_id)?,
      participants:      CanonicalPair::new(
        UserId::new(self.participant_lo),
        UserId::new(self.participant_hi),
      )?,
      participants_meta: decode_meta(&self.participants_meta)?,
      last_message:      self.last_message,
      last_updated:      decode_dt(&self.last_updated)?,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `messages` row.
pub struct RawMessage {
  pub message_id: String,
  pub chat_id:    String,
  pub sender_id:  String,
  pub text:       String,
  pub created_at: String,
}

impl RawMessage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      message_id: row.get(0)?,
      chat_id:    row.get(1)?,
      sender_id:  row.get(2)?,
      text:       row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_message(self) -> Result<Message> {
    Ok(Message {
      message_id: decode_uuid(&self.message_id)?,
      chat_id:    decode_uuid(&self.chat_id)?,
      sender_id:  UserId::new(self.sender_id),
      text:       self.text,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let early = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let later = early + chrono::Duration::microseconds(1);
    assert!(encode_dt(early) < encode_dt(later));
    assert_eq!(encode_dt(early), "2024-03-01T09:00:00.000000Z");
    assert_eq!(decode_dt(&encode_dt(later)).unwrap(), later);
  }

  #[test]
  fn unknown_status_is_reported() {
    let err = decode_enum::<RequestStatus>("status", "withdrawn").unwrap_err();
    assert!(matches!(err, Error::UnknownVariant { column: "status", .. }));
  }
}
