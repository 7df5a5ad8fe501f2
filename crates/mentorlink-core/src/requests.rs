//! Request State Machine: `pending → accepted | declined`.
//!
//! Every transition goes through the store's compare-and-set
//! ([`MatchStore::transition_request`]), so two concurrent accepts, or an
//! accept racing a decline, resolve to exactly one winner.

use std::{
  collections::BTreeSet,
  sync::{Arc, Mutex, PoisonError},
};

use uuid::Uuid;

use crate::{
  DEFAULT_LIVE_BUFFER, Error, Result,
  directory::ProfileDirectory,
  live::Subscription,
  profile::UserId,
  request::{MentorRequest, NewRequest, RequestQuery, RequestStatus, Transition},
  store::{Change, MatchStore},
};

#[derive(Clone)]
pub struct RequestMachine<S> {
  store:       S,
  directory:   ProfileDirectory<S>,
  live_buffer: usize,
}

impl<S: MatchStore + Clone + 'static> RequestMachine<S> {
  pub fn new(store: S) -> Self {
    Self {
      directory: ProfileDirectory::new(store.clone()),
      store,
      live_buffer: DEFAULT_LIVE_BUFFER,
    }
  }

  /// Set the snapshot queue depth of live views.
  pub fn with_live_buffer(mut self, live_buffer: usize) -> Self {
    self.live_buffer = live_buffer;
    self
  }

  // ── Creation ──────────────────────────────────────────────────────────────

  /// Record a new `pending` request from `mentee_id` to `mentor_id`,
  /// capturing the mentee's display fields if the directory has them.
  pub async fn create(
    &self,
    mentee_id: &UserId,
    mentor_id: &UserId,
    message: &str,
  ) -> Result<MentorRequest> {
    if mentee_id.is_blank() || mentor_id.is_blank() {
      return Err(Error::Validation("missing mentee or mentor id".into()));
    }
    if mentee_id == mentor_id {
      return Err(Error::Validation(format!(
        "{mentee_id} cannot request mentorship from themselves"
      )));
    }

    let mentee = self.directory.lookup(mentee_id).await;

    let request = self
      .store
      .insert_request(NewRequest {
        mentee_id:         mentee_id.clone(),
        mentor_id:         mentor_id.clone(),
        message:           message.to_owned(),
        mentee_name:       mentee.display_name,
        mentee_avatar_url: mentee.avatar_url,
      })
      .await
      .map_err(Error::transient)?;

    tracing::info!(
      request_id = %request.request_id,
      mentee_id = %request.mentee_id,
      mentor_id = %request.mentor_id,
      "mentor request created"
    );
    Ok(request)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn get(&self, request_id: Uuid) -> Result<MentorRequest> {
    self
      .store
      .get_request(request_id)
      .await
      .map_err(Error::transient)?
      .ok_or_else(|| Error::not_found("request", request_id))
  }

  /// Every request `mentee_id` has sent, newest first.
  pub async fn sent_by_mentee(&self, mentee_id: &UserId) -> Result<Vec<MentorRequest>> {
    let query = RequestQuery { mentee_id: Some(mentee_id.clone()), ..Default::default() };
    self
      .store
      .list_requests(&query)
      .await
      .map_err(Error::transient)
  }

  /// `mentor_id`'s pending requests, newest first, with mentee display
  /// fields hydrated.
  pub async fn pending(&self, mentor_id: &UserId) -> Result<Vec<MentorRequest>> {
    load_pending(&self.store, &self.directory, &RequestQuery::pending_for(mentor_id.clone())).await
  }

  /// Live view of [`RequestMachine::pending`]. Re-queries when one of the
  /// mentor's requests changes, or when a mentee listed in the last snapshot
  /// saves their profile.
  pub fn pending_for_mentor(&self, mentor_id: &UserId) -> Subscription<MentorRequest> {
    let store = self.store.clone();
    let directory = self.directory.clone();
    let watched = mentor_id.clone();
    let query = RequestQuery::pending_for(mentor_id.clone());
    let listed: Arc<Mutex<BTreeSet<UserId>>> = Arc::default();
    let listed_by_query = Arc::clone(&listed);

    Subscription::spawn(
      &self.store,
      self.live_buffer,
      move |change| match change {
        Change::Profile { user_id } => {
          listed.lock().unwrap_or_else(PoisonError::into_inner).contains(user_id)
        }
        _ => change.touches_requests_of(&watched),
      },
      move || {
        let store = store.clone();
        let directory = directory.clone();
        let query = query.clone();
        let listed = Arc::clone(&listed_by_query);
        async move {
          let requests = load_pending(&store, &directory, &query).await?;
          *listed.lock().unwrap_or_else(PoisonError::into_inner) =
            requests.iter().map(|r| r.mentee_id.clone()).collect();
          Ok::<_, Error>(requests)
        }
      },
    )
  }

  // ── Transitions ───────────────────────────────────────────────────────────

  /// Move a pending request to `accepted` on behalf of its mentor.
  ///
  /// Fails with `NotFound`, `Forbidden` (someone other than the request's
  /// mentor) or `InvalidState` (no longer pending). Chat provisioning is the
  /// orchestrator's job; see [`crate::MatchOrchestrator::accept`].
  pub async fn accept(&self, request_id: Uuid, acting_mentor_id: &UserId) -> Result<MentorRequest> {
    let current = self.get(request_id).await?;
    if &current.mentor_id != acting_mentor_id {
      return Err(Error::Forbidden(format!(
        "{acting_mentor_id} is not the mentor of request {request_id}"
      )));
    }
    if current.status.is_terminal() {
      return Err(Error::InvalidState { request_id, status: current.status });
    }

    match self
      .store
      .transition_request(request_id, RequestStatus::Accepted)
      .await
      .map_err(Error::transient)?
    {
      Transition::Applied(request) => {
        tracing::info!(%request_id, mentor_id = %request.mentor_id, "request accepted");
        Ok(request)
      }
      Transition::Stale(request) => {
        Err(Error::InvalidState { request_id, status: request.status })
      }
      Transition::Missing => Err(Error::not_found("request", request_id)),
    }
  }

  /// Move a pending request to `declined`. Declining a request that already
  /// left `pending` is a no-op, so repeated calls are harmless.
  pub async fn decline(&self, request_id: Uuid) -> Result<()> {
    let current = self.get(request_id).await?;
    if current.status.is_terminal() {
      tracing::debug!(%request_id, status = %current.status, "decline ignored; request already decided");
      return Ok(());
    }

    match self
      .store
      .transition_request(request_id, RequestStatus::Declined)
      .await
      .map_err(Error::transient)?
    {
      Transition::Applied(_) => {
        tracing::info!(%request_id, "request declined");
        Ok(())
      }
      Transition::Stale(request) => {
        tracing::debug!(%request_id, status = %request.status, "decline lost the race; ignoring");
        Ok(())
      }
      Transition::Missing => Err(Error::not_found("request", request_id)),
    }
  }

  /// Best-effort: record `chat_id` on an accepted request. Failures are
  /// logged and swallowed; the chat stays reachable through the resolver.
  pub async fn link_chat(&self, request_id: Uuid, chat_id: Uuid) -> bool {
    match self.store.attach_chat(request_id, chat_id).await {
      Ok(linked) => linked,
      Err(e) => {
        tracing::warn!(%request_id, %chat_id, error = %e, "failed to link chat to request");
        false
      }
    }
  }
}

/// Requests stored without mentee display fields are filled in from the
/// directory.
async fn load_pending<S: MatchStore>(
  store: &S,
  directory: &ProfileDirectory<S>,
  query: &RequestQuery,
) -> Result<Vec<MentorRequest>> {
  let mut requests = store.list_requests(query).await.map_err(Error::transient)?;
  for request in &mut requests {
    let mut display = request.mentee_display();
    if !display.is_complete() {
      display.backfill(&directory.lookup(&request.mentee_id).await);
      request.mentee_name = display.display_name;
      request.mentee_avatar_url = display.avatar_url;
    }
  }
  Ok(requests)
}
