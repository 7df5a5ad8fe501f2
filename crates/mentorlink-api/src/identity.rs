//! Caller identity extractor.
//!
//! The gateway in front of the API authenticates the user and forwards the
//! verified id in [`USER_ID_HEADER`]. Requests without it are rejected with
//! 401 before any handler runs.

use axum::{extract::FromRequestParts, http::request::Parts};
use mentorlink_core::{Session, profile::UserId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
pub struct Caller(pub Session);

impl Caller {
  pub fn user_id(&self) -> &UserId { self.0.user_id() }
}

impl<St: Send + Sync> FromRequestParts<St> for Caller {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
    let user_id = parts
      .headers
      .get(USER_ID_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .ok_or(ApiError::Unauthorized)?;
    Ok(Caller(Session::new(user_id)?))
  }
}
