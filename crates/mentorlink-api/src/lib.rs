//! JSON REST API for MentorLink.
//!
//! Exposes an axum [`Router`] backed by any [`MatchStore`]. Authentication,
//! TLS and transport concerns are the caller's responsibility: the router
//! trusts the `x-user-id` header set by the gateway in front of it.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", mentorlink_api::api_router(AppState::new(store, 16)))
//! ```

pub mod chats;
pub mod error;
pub mod extract;
pub mod identity;
pub mod live;
pub mod profiles;
pub mod requests;

use axum::{
  Router,
  routing::{get, post},
};
use mentorlink_core::{MatchOrchestrator, MessageChannel, store::MatchStore};

pub use error::ApiError;
pub use identity::{Caller, USER_ID_HEADER};

/// Workflow components shared by all handlers.
#[derive(Clone)]
pub struct AppState<S> {
  pub matcher: MatchOrchestrator<S>,
  pub channel: MessageChannel<S>,
}

impl<S: MatchStore + Clone + 'static> AppState<S> {
  /// Build every component over `store`. `live_buffer` is the snapshot
  /// queue depth of each live view.
  pub fn new(store: S, live_buffer: usize) -> Self {
    Self {
      matcher: MatchOrchestrator::new(store.clone()).with_live_buffer(live_buffer),
      channel: MessageChannel::new(store).with_live_buffer(live_buffer),
    }
  }
}

/// Build the API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: MatchStore + Clone + 'static,
{
  Router::new()
    // Profiles
    .route("/mentors", get(profiles::mentors::<S>))
    .route("/profiles/{id}", get(profiles::get_one::<S>).put(profiles::save::<S>))
    // Requests
    .route("/requests", post(requests::create::<S>))
    .route("/requests/pending", get(requests::pending::<S>))
    .route("/requests/pending/live", get(requests::pending_live::<S>))
    .route("/requests/sent", get(requests::sent::<S>))
    .route("/requests/{id}", get(requests::get_one::<S>))
    .route("/requests/{id}/accept", post(requests::accept::<S>))
    .route("/requests/{id}/decline", post(requests::decline::<S>))
    .route("/requests/{id}/chat", post(requests::chat::<S>))
    // Chats
    .route("/chats", get(chats::list::<S>).post(chats::start::<S>))
    .route("/chats/live", get(chats::live::<S>))
    .route("/chats/{id}/messages", get(chats::history::<S>).post(chats::append::<S>))
    .route("/chats/{id}/messages/live", get(chats::messages_live::<S>))
    .with_state(state)
}
