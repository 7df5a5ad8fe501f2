//! Error types for `mentorlink-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::request::RequestStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("request {request_id} is already {status}")]
  InvalidState {
    request_id: Uuid,
    status:     RequestStatus,
  },

  /// The backend could not be reached or timed out. Safe to retry.
  #[error("backend unavailable: {0}")]
  Transient(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("validation error: {0}")]
  Validation(String),
}

impl Error {
  /// Wrap a store backend error. Every backend failure is treated as
  /// retryable; domain outcomes are reported through return values instead.
  pub fn transient<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Transient(Box::new(e))
  }

  pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
    Self::NotFound { entity, id: id.to_string() }
  }

  pub fn is_retryable(&self) -> bool { matches!(self, Self::Transient(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
