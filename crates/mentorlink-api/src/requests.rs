//! Handlers for `/requests` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/requests` | Body: `{"mentor_id":"...","message":"..."}`; caller is the mentee |
//! | `GET`  | `/requests/pending` | Caller's pending requests as mentor |
//! | `GET`  | `/requests/pending/live` | Same, as server-sent events |
//! | `GET`  | `/requests/sent` | Requests the caller sent as mentee |
//! | `GET`  | `/requests/{id}` | Either party may read |
//! | `POST` | `/requests/{id}/accept` | Body: `{"participants_meta":{...}}` (may be `{}`) |
//! | `POST` | `/requests/{id}/decline` | 204; repeating it is harmless |
//! | `POST` | `/requests/{id}/chat` | Chat of an accepted request, provisioned if missing |

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use mentorlink_core::{
  AcceptedMatch, Error,
  chat::ParticipantsMeta,
  profile::UserId,
  request::MentorRequest,
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
};

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub mentor_id: UserId,
  #[serde(default)]
  pub message:   String,
}

/// `POST /requests`: returns 201 + the stored request.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Caller(session): Caller,
  JsonBody(body): JsonBody<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  let request = state
    .matcher
    .request_mentorship(&session, &body.mentor_id, &body.message)
    .await?;
  Ok((StatusCode::CREATED, Json(request)))
}

// ─── Lists ───────────────────────────────────────────────────────────────────

/// `GET /requests/pending`
pub async fn pending<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
) -> Result<Json<Vec<MentorRequest>>, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  let requests = state.matcher.requests().pending(caller.user_id()).await?;
  Ok(Json(requests))
}

/// `GET /requests/pending/live`
pub async fn pending_live<S>(State(state): State<AppState<S>>, caller: Caller) -> impl IntoResponse
where
  S: MatchStore + Clone + 'static,
{
  live::sse(state.matcher.requests().pending_for_mentor(caller.user_id()))
}

/// `GET /requests/sent`
pub async fn sent<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
) -> Result<Json<Vec<MentorRequest>>, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  let requests = state.matcher.requests().sent_by_mentee(caller.user_id()).await?;
  Ok(Json(requests))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /requests/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<MentorRequest>, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  let request = state.matcher.requests().get(id).await?;
  if !request.involves(caller.user_id()) {
    return Err(Error::Forbidden(format!("{} is not a party to request {id}", caller.user_id())).into());
  }
  Ok(Json(request))
}

// ─── Transitions ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AcceptBody {
  /// Display fields the mentor's client already has on screen.
  pub participants_meta: ParticipantsMeta,
}

/// `POST /requests/{id}/accept`: returns `{"request":{...},"chat_id":"..."}`.
pub async fn accept<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  PathParam(id): PathParam<Uuid>,
  JsonBody(body): JsonBody<AcceptBody>,
) -> Result<Json<AcceptedMatch>, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  let accepted = state
    .matcher
    .accept(id, caller.user_id(), body.participants_meta)
    .await?;
  Ok(Json(accepted))
}

/// `POST /requests/{id}/decline`
pub async fn decline<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  PathParam(id): PathParam<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  state.matcher.decline(id, caller.user_id()).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct ChatRef {
  pub chat_id: Uuid,
}

/// `POST /requests/{id}/chat`
pub async fn chat<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<ChatRef>, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  let chat_id = state.matcher.chat_for_request(id, caller.user_id()).await?;
  Ok(Json(ChatRef { chat_id }))
}
