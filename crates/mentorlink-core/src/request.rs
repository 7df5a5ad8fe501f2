//! Mentor requests: a mentee's ask for mentorship and its lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::profile::{DisplayFields, UserId};

// ─── Status ──────────────────────────────────────────────────────────────────

/// `Pending` is the only non-terminal state.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
  Pending,
  Accepted,
  Declined,
}

impl RequestStatus {
  pub fn is_terminal(self) -> bool { !matches!(self, Self::Pending) }

  /// Only `pending → accepted` and `pending → declined` are allowed.
  pub fn can_transition_to(self, next: RequestStatus) -> bool {
    self == Self::Pending && next.is_terminal()
  }
}

// ─── Request ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentorRequest {
  pub request_id:        Uuid,
  pub mentee_id:         UserId,
  pub mentor_id:         UserId,
  pub message:           String,
  pub status:            RequestStatus,
  /// Store-assigned, monotonic.
  pub created_at:        DateTime<Utc>,
  /// When the request left `pending`.
  pub decided_at:        Option<DateTime<Utc>>,
  /// Set at most once, and only after acceptance.
  pub chat_id:           Option<Uuid>,
  /// Captured at creation so the mentor's list renders without a join.
  pub mentee_name:       String,
  pub mentee_avatar_url: String,
}

impl MentorRequest {
  pub fn mentee_display(&self) -> DisplayFields {
    DisplayFields::new(self.mentee_name.clone(), self.mentee_avatar_url.clone())
  }

  pub fn involves(&self, user_id: &UserId) -> bool {
    &self.mentee_id == user_id || &self.mentor_id == user_id
  }
}

/// Input to [`crate::store::MatchStore::insert_request`]. Identifier, status
/// and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewRequest {
  pub mentee_id:         UserId,
  pub mentor_id:         UserId,
  pub message:           String,
  pub mentee_name:       String,
  pub mentee_avatar_url: String,
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Filter for [`crate::store::MatchStore::list_requests`]. Results are
/// ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct RequestQuery {
  pub mentor_id: Option<UserId>,
  pub mentee_id: Option<UserId>,
  pub status:    Option<RequestStatus>,
}

impl RequestQuery {
  pub fn pending_for(mentor_id: UserId) -> Self {
    Self {
      mentor_id: Some(mentor_id),
      status: Some(RequestStatus::Pending),
      ..Default::default()
    }
  }

  pub fn matches(&self, request: &MentorRequest) -> bool {
    self.mentor_id.as_ref().is_none_or(|id| id == &request.mentor_id)
      && self.mentee_id.as_ref().is_none_or(|id| id == &request.mentee_id)
      && self.status.is_none_or(|s| s == request.status)
  }
}

// ─── Transition outcome ──────────────────────────────────────────────────────

/// Result of a compare-and-set status write.
#[derive(Debug, Clone)]
pub enum Transition {
  /// The request was pending and now carries the new status.
  Applied(MentorRequest),
  /// The request had already left `pending`; nothing was written.
  Stale(MentorRequest),
  Missing,
}
