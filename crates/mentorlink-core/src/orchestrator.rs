//! Match Orchestrator: sequences request transitions with chat provisioning.
//!
//! Accepting is three steps: the request's compare-and-set, then chat
//! resolution, then a best-effort link back onto the request. The transition
//! is the durable decision. A failure in a later step never rolls it back,
//! and [`MatchOrchestrator::chat_for_request`] lets a caller recover the chat
//! afterwards.

use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result, Session,
  chat::ParticipantsMeta,
  directory::ProfileDirectory,
  profile::UserId,
  request::{MentorRequest, RequestStatus},
  requests::RequestMachine,
  resolver::ChatResolver,
  store::MatchStore,
};

/// Opening message of a chat created by accepting a request.
pub const ACCEPT_GREETING: &str = "Request accepted! Let's chat.";

const MENTOR_FALLBACK: &str = "Mentor";
const MENTEE_FALLBACK: &str = "Mentee";

/// What a successful accept hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedMatch {
  pub request: MentorRequest,
  pub chat_id: Uuid,
}

#[derive(Clone)]
pub struct MatchOrchestrator<S> {
  requests:  RequestMachine<S>,
  resolver:  ChatResolver<S>,
  directory: ProfileDirectory<S>,
}

impl<S: MatchStore + Clone + 'static> MatchOrchestrator<S> {
  pub fn new(store: S) -> Self {
    Self {
      requests:  RequestMachine::new(store.clone()),
      resolver:  ChatResolver::new(store.clone()),
      directory: ProfileDirectory::new(store),
    }
  }

  pub fn with_live_buffer(mut self, live_buffer: usize) -> Self {
    self.requests = self.requests.with_live_buffer(live_buffer);
    self
  }

  pub fn requests(&self) -> &RequestMachine<S> { &self.requests }

  pub fn resolver(&self) -> &ChatResolver<S> { &self.resolver }

  pub fn directory(&self) -> &ProfileDirectory<S> { &self.directory }

  /// The session user asks `mentor_id` for mentorship.
  pub async fn request_mentorship(
    &self,
    session: &Session,
    mentor_id: &UserId,
    message: &str,
  ) -> Result<MentorRequest> {
    self.requests.create(session.user_id(), mentor_id, message).await
  }

  /// Accept `request_id` as `acting_mentor_id` and provision the chat.
  ///
  /// `meta_hint` carries display fields the caller already has on screen;
  /// anything missing is filled from the request, then the directory, then
  /// the role fallbacks "Mentor" / "Mentee".
  pub async fn accept(
    &self,
    request_id: Uuid,
    acting_mentor_id: &UserId,
    meta_hint: ParticipantsMeta,
  ) -> Result<AcceptedMatch> {
    let request = self.requests.accept(request_id, acting_mentor_id).await?;
    let chat_id = self.provision_chat(&request, meta_hint).await?;
    Ok(AcceptedMatch { request, chat_id })
  }

  /// Decline `request_id` as `acting_mentor_id`. Only the request's mentor
  /// may decline; a second decline is a no-op.
  pub async fn decline(&self, request_id: Uuid, acting_mentor_id: &UserId) -> Result<()> {
    let request = self.requests.get(request_id).await?;
    if &request.mentor_id != acting_mentor_id {
      return Err(Error::Forbidden(format!(
        "{acting_mentor_id} is not the mentor of request {request_id}"
      )));
    }
    self.requests.decline(request_id).await
  }

  /// The chat of an accepted request, created if an earlier accept stopped
  /// after the transition. Either party may ask.
  pub async fn chat_for_request(&self, request_id: Uuid, acting_user_id: &UserId) -> Result<Uuid> {
    let request = self.requests.get(request_id).await?;
    if !request.involves(acting_user_id) {
      return Err(Error::Forbidden(format!(
        "{acting_user_id} is not a party to request {request_id}"
      )));
    }
    if request.status != RequestStatus::Accepted {
      return Err(Error::InvalidState { request_id, status: request.status });
    }
    if let Some(chat_id) = request.chat_id {
      return Ok(chat_id);
    }
    self.provision_chat(&request, ParticipantsMeta::new()).await
  }

  /// Open (or reuse) a direct chat between the session user and `peer_id`.
  pub async fn start_chat(&self, session: &Session, peer_id: &UserId, opening_text: &str) -> Result<Uuid> {
    self
      .resolver
      .resolve_or_create(session.user_id(), peer_id, opening_text, ParticipantsMeta::new())
      .await
  }

  async fn provision_chat(&self, request: &MentorRequest, meta_hint: ParticipantsMeta) -> Result<Uuid> {
    let mut meta = meta_hint;
    meta
      .entry(request.mentee_id.clone())
      .or_default()
      .backfill(&request.mentee_display());
    self.directory.hydrate(&mut meta, &request.mentor_id, MENTOR_FALLBACK).await;
    self.directory.hydrate(&mut meta, &request.mentee_id, MENTEE_FALLBACK).await;

    let chat_id = self
      .resolver
      .resolve_or_create(&request.mentor_id, &request.mentee_id, ACCEPT_GREETING, meta)
      .await?;

    if !self.requests.link_chat(request.request_id, chat_id).await {
      tracing::debug!(request_id = %request.request_id, %chat_id, "chat not linked to request");
    }
    Ok(chat_id)
  }
}
