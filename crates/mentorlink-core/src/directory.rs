//! Profile Directory: public display fields by user id, plus profile reads,
//! owner-only writes and the mentor browse query.
//!
//! [`ProfileDirectory::lookup`] never fails. Missing profiles and backend
//! errors both come back as empty display fields, and callers apply their own
//! fallback text.

use crate::{
  Error, Result, Session,
  chat::ParticipantsMeta,
  profile::{DisplayFields, MentorQuery, UserId, UserProfile},
  store::MatchStore,
};

#[derive(Clone)]
pub struct ProfileDirectory<S> {
  store: S,
}

impl<S: MatchStore> ProfileDirectory<S> {
  pub fn new(store: S) -> Self { Self { store } }

  /// Display fields for `user_id`, or empty placeholders.
  pub async fn lookup(&self, user_id: &UserId) -> DisplayFields {
    if user_id.is_blank() {
      return DisplayFields::default();
    }
    match self.store.get_profile(user_id.clone()).await {
      Ok(Some(profile)) => profile.display_fields(),
      Ok(None) => {
        tracing::debug!(%user_id, "no profile; using placeholder display fields");
        DisplayFields::default()
      }
      Err(e) => {
        tracing::warn!(%user_id, error = %e, "profile lookup failed; using placeholder display fields");
        DisplayFields::default()
      }
    }
  }

  /// Make sure `meta` has a name and avatar entry for `user_id`. Fields
  /// already present are kept; blanks are filled from the directory, and a
  /// still-blank name becomes `fallback_name`.
  pub async fn hydrate(&self, meta: &mut ParticipantsMeta, user_id: &UserId, fallback_name: &str) {
    let entry = meta.entry(user_id.clone()).or_default();
    if !entry.is_complete() {
      let found = self.lookup(user_id).await;
      entry.backfill(&found);
    }
    if entry.display_name.trim().is_empty() {
      entry.display_name = fallback_name.to_owned();
    }
  }

  /// Full profile for `user_id`.
  pub async fn profile(&self, user_id: &UserId) -> Result<UserProfile> {
    self
      .store
      .get_profile(user_id.clone())
      .await
      .map_err(Error::transient)?
      .ok_or_else(|| Error::not_found("profile", user_id))
  }

  /// Create or replace the caller's own profile.
  pub async fn save_profile(&self, session: &Session, profile: UserProfile) -> Result<UserProfile> {
    if profile.user_id.is_blank() {
      return Err(Error::Validation("profile user id is empty".into()));
    }
    session.require(&profile.user_id, "edit this profile")?;

    let saved = self
      .store
      .put_profile(profile)
      .await
      .map_err(Error::transient)?;
    tracing::info!(user_id = %saved.user_id, "profile saved");
    Ok(saved)
  }

  /// Mentors matching `query`, ordered by display name.
  pub async fn browse_mentors(&self, query: &MentorQuery) -> Result<Vec<UserProfile>> {
    self
      .store
      .list_mentors(query)
      .await
      .map_err(Error::transient)
  }
}
