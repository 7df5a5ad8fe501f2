//! The caller's established identity.
//!
//! The core never authenticates. Whatever sits in front of it (the HTTP
//! layer, a test) hands in a [`Session`] built from an identity the
//! authentication provider already vouched for.

use crate::{Error, Result, profile::UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
  user_id: UserId,
}

impl Session {
  pub fn new(user_id: impl Into<UserId>) -> Result<Self> {
    let user_id = user_id.into();
    if user_id.is_blank() {
      return Err(Error::Validation("session user id is empty".into()));
    }
    Ok(Self { user_id })
  }

  pub fn user_id(&self) -> &UserId { &self.user_id }

  /// `Forbidden` unless the session belongs to `owner`.
  pub fn require(&self, owner: &UserId, action: &str) -> Result<()> {
    if &self.user_id == owner {
      Ok(())
    } else {
      Err(Error::Forbidden(format!(
        "{} may not {action} on behalf of {owner}",
        self.user_id
      )))
    }
  }
}
