//! User profiles and the display fields denormalized onto requests and chats.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Opaque user identifier issued by the identity provider.
#[derive(
  Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// `true` for ids that are empty or whitespace only.
  pub fn is_blank(&self) -> bool { self.0.trim().is_empty() }
}

impl fmt::Display for UserId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for UserId {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for UserId {
  fn from(s: String) -> Self { Self(s) }
}

// ─── Role ────────────────────────────────────────────────────────────────────

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
pub enum Role {
  Mentor,
  Mentee,
}

// ─── Display fields ──────────────────────────────────────────────────────────

/// The public display fields of a user. Empty strings mean "unknown"; callers
/// pick their own fallback text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFields {
  #[serde(default)]
  pub display_name: String,
  #[serde(default)]
  pub avatar_url:   String,
}

impl DisplayFields {
  pub fn new(display_name: impl Into<String>, avatar_url: impl Into<String>) -> Self {
    Self { display_name: display_name.into(), avatar_url: avatar_url.into() }
  }

  /// The trimmed display name, or `fallback` when it is blank.
  pub fn name_or<'a>(&'a self, fallback: &'a str) -> &'a str {
    match self.display_name.trim() {
      "" => fallback,
      name => name,
    }
  }

  pub fn is_complete(&self) -> bool {
    !self.display_name.trim().is_empty() && !self.avatar_url.is_empty()
  }

  /// Fill blank fields from `other`, keeping anything already present.
  pub fn backfill(&mut self, other: &DisplayFields) {
    if self.display_name.trim().is_empty() {
      self.display_name = other.display_name.trim().to_owned();
    }
    if self.avatar_url.is_empty() {
      self.avatar_url = other.avatar_url.clone();
    }
  }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
  pub user_id:      UserId,
  #[serde(default)]
  pub display_name: String,
  #[serde(default)]
  pub avatar_url:   String,
  pub role:         Option<Role>,
  /// Professional field, e.g. "Engineering" or "Finance".
  #[serde(default)]
  pub field:        String,
  #[serde(default)]
  pub bio:          String,
  /// Display-only; order carries no meaning.
  #[serde(default)]
  pub skills:       Vec<String>,
  #[serde(default)]
  pub email:        String,
  #[serde(default)]
  pub phone:        String,
  /// Store-assigned.
  pub created_at:   DateTime<Utc>,
  /// Store-assigned.
  pub updated_at:   DateTime<Utc>,
}

impl UserProfile {
  /// A profile with only the identity and role set. Timestamps are replaced
  /// by the store on write.
  pub fn new(user_id: impl Into<UserId>, role: Option<Role>) -> Self {
    let now = Utc::now();
    Self {
      user_id: user_id.into(),
      display_name: String::new(),
      avatar_url: String::new(),
      role,
      field: String::new(),
      bio: String::new(),
      skills: Vec::new(),
      email: String::new(),
      phone: String::new(),
      created_at: now,
      updated_at: now,
    }
  }

  pub fn display_fields(&self) -> DisplayFields {
    DisplayFields::new(self.display_name.trim(), self.avatar_url.clone())
  }

  pub fn is_mentor(&self) -> bool { self.role == Some(Role::Mentor) }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Parameters for browsing mentors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MentorQuery {
  /// Exact professional field; `None` means every field.
  pub field: Option<String>,
  /// Case-insensitive substring over name, field and bio.
  pub text:  Option<String>,
}

impl MentorQuery {
  pub fn matches(&self, profile: &UserProfile) -> bool {
    if !profile.is_mentor() {
      return false;
    }
    if let Some(field) = self.field.as_deref()
      && profile.field != field
    {
      return false;
    }
    match self.text.as_deref().map(str::trim) {
      None | Some("") => true,
      Some(text) => {
        let needle = text.to_lowercase();
        [&profile.display_name, &profile.field, &profile.bio]
          .iter()
          .any(|haystack| haystack.to_lowercase().contains(&needle))
      }
    }
  }
}
