//! Handlers for profile and mentor-browse endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/mentors` | Optional `?field=` (exact) and `?q=` (substring) |
//! | `GET`  | `/profiles/{id}` | 404 if not found |
//! | `PUT`  | `/profiles/{id}` | Body: [`ProfileBody`]; caller must be `{id}` |

use axum::{
  Json,
  extract::State,
};
use mentorlink_core::{
  profile::{MentorQuery, Role, UserId, UserProfile},
  store::MatchStore,
};
use serde::Deserialize;

use crate::{
  AppState,
  error::ApiError,
  extract::{JsonBody, PathParam, QueryParams},
  identity::Caller,
};

// ─── Browse ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct MentorParams {
  pub field: Option<String>,
  pub q:     Option<String>,
}

fn non_blank(s: Option<String>) -> Option<String> { s.filter(|s| !s.trim().is_empty()) }

/// `GET /mentors[?field=...][&q=...]`
pub async fn mentors<S>(
  State(state): State<AppState<S>>,
  _caller: Caller,
  QueryParams(params): QueryParams<MentorParams>,
) -> Result<Json<Vec<UserProfile>>, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  let query = MentorQuery { field: non_blank(params.field), text: non_blank(params.q) };
  let mentors = state.matcher.directory().browse_mentors(&query).await?;
  Ok(Json(mentors))
}

// ─── Read ────────────────────────────────────────────────────────────────────

/// `GET /profiles/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  _caller: Caller,
  PathParam(id): PathParam<String>,
) -> Result<Json<UserProfile>, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  let profile = state.matcher.directory().profile(&UserId::new(id)).await?;
  Ok(Json(profile))
}

// ─── Save ────────────────────────────────────────────────────────────────────

/// JSON body accepted by `PUT /profiles/{id}`. Omitted fields are stored
/// empty.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ProfileBody {
  pub display_name: String,
  pub avatar_url:   String,
  pub role:         Option<Role>,
  pub field:        String,
  pub bio:          String,
  pub skills:       Vec<String>,
  pub email:        String,
  pub phone:        String,
}

impl ProfileBody {
  fn into_profile(self, user_id: UserId) -> UserProfile {
    UserProfile {
      display_name: self.display_name,
      avatar_url: self.avatar_url,
      field: self.field,
      bio: self.bio,
      skills: self.skills,
      email: self.email,
      phone: self.phone,
      ..UserProfile::new(user_id, self.role)
    }
  }
}

/// `PUT /profiles/{id}`: returns the stored profile.
pub async fn save<S>(
  State(state): State<AppState<S>>,
  Caller(session): Caller,
  PathParam(id): PathParam<String>,
  JsonBody(body): JsonBody<ProfileBody>,
) -> Result<Json<UserProfile>, ApiError>
where
  S: MatchStore + Clone + 'static,
{
  let profile = body.into_profile(UserId::new(id));
  let saved = state.matcher.directory().save_profile(&session, profile).await?;
  Ok(Json(saved))
}
