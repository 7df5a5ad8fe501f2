//! Handlers for `/chats` endpoints. Every thread endpoint is restricted to
//! the thread's two participants.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/chats` | Caller's threads, most recent first |
//! | `GET`  | `/chats/live` | Same, as server-sent events |
//! | `POST` | `/chats` | Body: `{"peer_id":"...","text":"..."}`; reuses an existing thread |
//! | `GET`  | `/chats/{id}/messages` | Oldest first |
//! | `POST` | `/chats/{id}/messages` | Body: `{"text":"..."}`; 201 + `{"message_id":"..."}` |
//! | `GET`  | `/chats/{id}/messages/live` | Message log as server-sent events |

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use mentorlink_core::{
  Error,
  chat::{ChatThread, Message},
  profile::UserId,
  store::MatchStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  AppState,
  error::ApiError,
  extract::{JsonBody, PathParam},
  identity::Caller,
  live,
  requests::ChatRef,
};

/// The thread `chat_id`, if `caller` takes part in it.
async fn participant_thread<S>(
  state: &AppState<S>,
  chat_id: Uuid,
  caller: &Caller,
) -> Result<ChatThread, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  let chat = state.channel.thread(chat_id).await?;
  if !chat.participants.contains(caller.user_id()) {
    return Err(
      Error::Forbidden(format!("{} is not a participant of chat {chat_id}", caller.user_id())).into(),
    );
  }
  Ok(chat)
}

// ─── Threads ─────────────────────────────────────────────────────────────────

/// `GET /chats`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
) -> Result<Json<Vec<ChatThread>>, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  let threads = state.channel.threads_for_user(caller.user_id()).await?;
  Ok(Json(threads))
}

/// `GET /chats/live`
pub async fn live<S>(State(state): State<AppState<S>>, caller: Caller) -> impl IntoResponse
where
  S: MatchStore + Clone + 'static,
{
  live::sse(state.channel.subscribe_threads_for_user(caller.user_id()))
}

#[derive(Debug, Deserialize)]
pub struct StartBody {
  pub peer_id: UserId,
  /// Sent as the first message only if the thread is new.
  #[serde(default)]
  pub text:    String,
}

/// `POST /chats`
pub async fn start<S>(
  State(state): State<AppState<S>>,
  Caller(session): Caller,
  JsonBody(body): JsonBody<StartBody>,
) -> Result<Json<ChatRef>, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  let chat_id = state.matcher.start_chat(&session, &body.peer_id, &body.text).await?;
  Ok(Json(ChatRef { chat_id }))
}

// ─── Messages ────────────────────────────────────────────────────────────────

/// `GET /chats/{id}/messages`
pub async fn history<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<Vec<Message>>, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  participant_thread(&state, id, &caller).await?;
  let messages = state.channel.history(id).await?;
  Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct AppendBody {
  pub text: String,
}

#[derive(Debug, Serialize)]
pub struct MessageRef {
  pub message_id: Uuid,
}

/// `POST /chats/{id}/messages`
pub async fn append<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  PathParam(id): PathParam<Uuid>,
  JsonBody(body): JsonBody<AppendBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  let message_id = state.channel.append(id, caller.user_id(), &body.text).await?;
  Ok((StatusCode::CREATED, Json(MessageRef { message_id })))
}

/// `GET /chats/{id}/messages/live`
pub async fn messages_live<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  participant_thread(&state, id, &caller).await?;
  Ok(live::sse(state.channel.subscribe(id)))
}
