//! Workflow tests against the in-memory store, plus a fault-injecting wrapper
//! that simulates backend outages.

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use futures_util::StreamExt as _;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  ChatResolver, Error, MatchOrchestrator, MessageChannel, ProfileDirectory, RequestMachine,
  Session,
  chat::{
    CanonicalPair, ChatInsert, ChatThread, Message, NewChat, ParticipantsMeta, UNKNOWN_NAME,
  },
  memory::MemoryStore,
  orchestrator::ACCEPT_GREETING,
  profile::{DisplayFields, MentorQuery, Role, UserId, UserProfile},
  request::{MentorRequest, NewRequest, RequestQuery, RequestStatus, Transition},
  store::{Change, MatchStore},
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn uid(s: &str) -> UserId { UserId::from(s) }

fn session(s: &str) -> Session { Session::new(s).unwrap() }

fn profile(id: &str, name: &str, role: Role) -> UserProfile {
  let mut p = UserProfile::new(id, Some(role));
  p.display_name = name.into();
  p.avatar_url = format!("https://cdn.example.com/{id}.jpg");
  p
}

async fn seeded() -> MemoryStore {
  let store = MemoryStore::new();
  store.put_profile(profile("m1", "Mia Mentee", Role::Mentee)).await.unwrap();
  store.put_profile(profile("t1", "Theo Mentor", Role::Mentor)).await.unwrap();
  store
}

async fn next_within<T>(sub: &mut crate::Subscription<T>) -> Vec<T> {
  tokio::time::timeout(Duration::from_secs(2), sub.next())
    .await
    .expect("snapshot within timeout")
    .expect("subscription still open")
    .expect("query succeeded")
}

// ─── Fault injection ─────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("simulated backend outage")]
struct Outage;

#[derive(Default)]
struct Faults {
  profiles:    AtomicBool,
  attach:      AtomicBool,
  transitions: AtomicBool,
  appends:     AtomicBool,
}

/// Delegates to a [`MemoryStore`] unless the matching fault is switched on.
#[derive(Clone)]
struct FaultyStore {
  inner:  MemoryStore,
  faults: Arc<Faults>,
}

impl FaultyStore {
  fn new(inner: MemoryStore) -> Self { Self { inner, faults: Arc::default() } }

  fn fail(flag: &AtomicBool) -> Result<(), Outage> {
    if flag.load(Ordering::SeqCst) { Err(Outage) } else { Ok(()) }
  }
}

fn infallible<T>(r: Result<T, std::convert::Infallible>) -> Result<T, Outage> {
  r.map_err(|e| match e {})
}

impl MatchStore for FaultyStore {
  type Error = Outage;

  fn changes(&self) -> broadcast::Receiver<Change> { self.inner.changes() }

  async fn put_profile(&self, profile: UserProfile) -> Result<UserProfile, Outage> {
    infallible(self.inner.put_profile(profile).await)
  }

  async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, Outage> {
    Self::fail(&self.faults.profiles)?;
    infallible(self.inner.get_profile(user_id).await)
  }

  async fn list_mentors(&self, query: &MentorQuery) -> Result<Vec<UserProfile>, Outage> {
    Self::fail(&self.faults.profiles)?;
    infallible(self.inner.list_mentors(query).await)
  }

  async fn insert_request(&self, input: NewRequest) -> Result<MentorRequest, Outage> {
    infallible(self.inner.insert_request(input).await)
  }

  async fn get_request(&self, request_id: Uuid) -> Result<Option<MentorRequest>, Outage> {
    infallible(self.inner.get_request(request_id).await)
  }

  async fn list_requests(&self, query: &RequestQuery) -> Result<Vec<MentorRequest>, Outage> {
    infallible(self.inner.list_requests(query).await)
  }

  async fn transition_request(
    &self,
    request_id: Uuid,
    to: RequestStatus,
  ) -> Result<Transition, Outage> {
    Self::fail(&self.faults.transitions)?;
    infallible(self.inner.transition_request(request_id, to).await)
  }

  async fn attach_chat(&self, request_id: Uuid, chat_id: Uuid) -> Result<bool, Outage> {
    Self::fail(&self.faults.attach)?;
    infallible(self.inner.attach_chat(request_id, chat_id).await)
  }

  async fn create_chat_if_absent(&self, input: NewChat) -> Result<ChatInsert, Outage> {
    infallible(self.inner.create_chat_if_absent(input).await)
  }

  async fn get_chat(&self, chat_id: Uuid) -> Result<Option<ChatThread>, Outage> {
    infallible(self.inner.get_chat(chat_id).await)
  }

  async fn find_chat(&self, participants: CanonicalPair) -> Result<Option<ChatThread>, Outage> {
    infallible(self.inner.find_chat(participants).await)
  }

  async fn enrich_chat_meta(
    &self,
    chat_id: Uuid,
    meta: ParticipantsMeta,
  ) -> Result<Option<ChatThread>, Outage> {
    infallible(self.inner.enrich_chat_meta(chat_id, meta).await)
  }

  async fn list_chats_for_user(&self, user_id: UserId) -> Result<Vec<ChatThread>, Outage> {
    infallible(self.inner.list_chats_for_user(user_id).await)
  }

  async fn append_message(
    &self,
    chat_id: Uuid,
    sender_id: UserId,
    text: String,
  ) -> Result<Option<Message>, Outage> {
    Self::fail(&self.faults.appends)?;
    infallible(self.inner.append_message(chat_id, sender_id, text).await)
  }

  async fn list_messages(&self, chat_id: Uuid) -> Result<Vec<Message>, Outage> {
    infallible(self.inner.list_messages(chat_id).await)
  }
}

// ─── Profile Directory ───────────────────────────────────────────────────────

#[tokio::test]
async fn lookup_returns_display_fields() {
  let dir = ProfileDirectory::new(seeded().await);
  let fields = dir.lookup(&uid("t1")).await;
  assert_eq!(fields.display_name, "Theo Mentor");
  assert_eq!(fields.avatar_url, "https://cdn.example.com/t1.jpg");
}

#[tokio::test]
async fn lookup_missing_or_failing_yields_placeholders() {
  let dir = ProfileDirectory::new(seeded().await);
  assert_eq!(dir.lookup(&uid("ghost")).await, DisplayFields::default());
  assert_eq!(dir.lookup(&uid("")).await, DisplayFields::default());

  let faulty = FaultyStore::new(seeded().await);
  faulty.faults.profiles.store(true, Ordering::SeqCst);
  let dir = ProfileDirectory::new(faulty);
  assert_eq!(dir.lookup(&uid("t1")).await, DisplayFields::default());
}

#[tokio::test]
async fn save_profile_is_owner_only() {
  let store = MemoryStore::new();
  let dir = ProfileDirectory::new(store.clone());

  let err = dir
    .save_profile(&session("intruder"), profile("t1", "Theo", Role::Mentor))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));
  assert!(store.get_profile(uid("t1")).await.unwrap().is_none());

  let first = dir
    .save_profile(&session("t1"), profile("t1", "Theo", Role::Mentor))
    .await
    .unwrap();
  let second = dir
    .save_profile(&session("t1"), profile("t1", "Theo B.", Role::Mentor))
    .await
    .unwrap();
  assert_eq!(second.created_at, first.created_at);
  assert!(second.updated_at > first.updated_at);
  assert_eq!(dir.profile(&uid("t1")).await.unwrap().display_name, "Theo B.");
}

#[tokio::test]
async fn profile_missing_is_not_found() {
  let dir = ProfileDirectory::new(MemoryStore::new());
  assert!(matches!(
    dir.profile(&uid("nobody")).await,
    Err(Error::NotFound { entity: "profile", .. })
  ));
}

#[tokio::test]
async fn browse_mentors_filters_by_field_and_text() {
  let store = MemoryStore::new();
  let mut eng = profile("t1", "Theo", Role::Mentor);
  eng.field = "Engineering".into();
  eng.bio = "Distributed systems and Rust".into();
  let mut fin = profile("t2", "Fiona", Role::Mentor);
  fin.field = "Finance".into();
  let mut mentee = profile("m1", "Mia", Role::Mentee);
  mentee.field = "Engineering".into();
  for p in [eng, fin, mentee] {
    store.put_profile(p).await.unwrap();
  }
  let dir = ProfileDirectory::new(store);

  let all = dir.browse_mentors(&MentorQuery::default()).await.unwrap();
  let names: Vec<_> = all.iter().map(|p| p.display_name.as_str()).collect();
  assert_eq!(names, ["Fiona", "Theo"]);

  let eng_only = dir
    .browse_mentors(&MentorQuery { field: Some("Engineering".into()), text: None })
    .await
    .unwrap();
  assert_eq!(eng_only.len(), 1);
  assert_eq!(eng_only[0].user_id, uid("t1"));

  let by_text = dir
    .browse_mentors(&MentorQuery { field: None, text: Some("rust".into()) })
    .await
    .unwrap();
  assert_eq!(by_text.len(), 1);
  assert_eq!(by_text[0].user_id, uid("t1"));
}

// ─── Chat Identity Resolver ──────────────────────────────────────────────────

#[tokio::test]
async fn resolve_is_idempotent_and_sends_opening_once() {
  let store = seeded().await;
  let resolver = ChatResolver::new(store.clone());
  let channel = MessageChannel::new(store.clone());

  let first = resolver
    .resolve(&uid("m1"), &uid("t1"), "Hi Theo", ParticipantsMeta::new())
    .await
    .unwrap();
  assert!(first.created);

  let again = resolver
    .resolve(&uid("t1"), &uid("m1"), "Hello again", ParticipantsMeta::new())
    .await
    .unwrap();
  assert!(!again.created);
  assert_eq!(again.chat_id(), first.chat_id());

  let history = channel.history(first.chat_id()).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].text, "Hi Theo");
  assert_eq!(history[0].sender_id, uid("m1"));

  let chat = channel.thread(first.chat_id()).await.unwrap();
  assert_eq!(chat.last_message, "Hi Theo");
  assert_eq!(chat.participants.first(), &uid("m1"));
  assert_eq!(chat.participants_meta[&uid("t1")].display_name, "Theo Mentor");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolution_yields_one_thread() {
  let store = seeded().await;
  let resolver = ChatResolver::new(store.clone());

  let mut tasks = Vec::new();
  for i in 0..16 {
    let resolver = resolver.clone();
    let (a, b) = if i % 2 == 0 { ("m1", "t1") } else { ("t1", "m1") };
    tasks.push(tokio::spawn(async move {
      resolver
        .resolve_or_create(&uid(a), &uid(b), "hello", ParticipantsMeta::new())
        .await
        .unwrap()
    }));
  }

  let mut ids = Vec::new();
  for task in tasks {
    ids.push(task.await.unwrap());
  }
  ids.dedup();
  assert_eq!(ids.len(), 1);

  let pair = CanonicalPair::new(uid("m1"), uid("t1")).unwrap();
  assert_eq!(store.chat_count(&pair).await, 1);
  assert_eq!(store.list_messages(ids[0]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn resolve_rejects_self_chat() {
  let resolver = ChatResolver::new(seeded().await);
  let err = resolver
    .resolve_or_create(&uid("m1"), &uid("m1"), "hi", ParticipantsMeta::new())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn resolve_survives_directory_outage() {
  let faulty = FaultyStore::new(seeded().await);
  faulty.faults.profiles.store(true, Ordering::SeqCst);
  let resolver = ChatResolver::new(faulty.clone());

  let chat_id = resolver
    .resolve_or_create(&uid("m1"), &uid("t1"), "hi", ParticipantsMeta::new())
    .await
    .unwrap();

  let chat = faulty.get_chat(chat_id).await.unwrap().unwrap();
  for id in [uid("m1"), uid("t1")] {
    assert_eq!(chat.participants_meta[&id].display_name, UNKNOWN_NAME);
    assert_eq!(chat.participants_meta[&id].avatar_url, "");
  }
}

#[tokio::test]
async fn existing_thread_gets_missing_meta_only() {
  let store = MemoryStore::new();
  let resolver = ChatResolver::new(store.clone());

  let mut hint = ParticipantsMeta::new();
  hint.insert(uid("a"), DisplayFields::new("Ada", ""));
  let chat_id = resolver.resolve_or_create(&uid("a"), &uid("b"), "", hint).await.unwrap();

  let chat = store.get_chat(chat_id).await.unwrap().unwrap();
  assert_eq!(chat.participants_meta[&uid("a")].display_name, "Ada");
  assert_eq!(chat.participants_meta[&uid("b")].display_name, UNKNOWN_NAME);
  assert!(chat.last_message.is_empty());
  assert!(store.list_messages(chat_id).await.unwrap().is_empty());

  let mut later = ParticipantsMeta::new();
  later.insert(uid("a"), DisplayFields::new("Renamed", "a.png"));
  let again = resolver.resolve(&uid("b"), &uid("a"), "hi", later).await.unwrap();
  assert_eq!(again.chat.participants_meta[&uid("a")].display_name, "Ada");
}

// ─── Request State Machine ───────────────────────────────────────────────────

#[tokio::test]
async fn create_captures_mentee_display_fields() {
  let machine = RequestMachine::new(seeded().await);
  let request = machine.create(&uid("m1"), &uid("t1"), "Hi").await.unwrap();

  assert_eq!(request.status, RequestStatus::Pending);
  assert_eq!(request.mentee_name, "Mia Mentee");
  assert_eq!(request.mentee_avatar_url, "https://cdn.example.com/m1.jpg");
  assert!(request.chat_id.is_none());
  assert!(request.decided_at.is_none());
}

#[tokio::test]
async fn create_without_directory_still_succeeds() {
  let faulty = FaultyStore::new(seeded().await);
  faulty.faults.profiles.store(true, Ordering::SeqCst);
  let machine = RequestMachine::new(faulty);

  let request = machine.create(&uid("m1"), &uid("t1"), "").await.unwrap();
  assert_eq!(request.mentee_name, "");
  assert_eq!(request.message, "");
}

#[tokio::test]
async fn create_validates_ids() {
  let machine = RequestMachine::new(MemoryStore::new());
  for (mentee, mentor) in [("", "t1"), ("m1", " "), ("m1", "m1")] {
    let err = machine.create(&uid(mentee), &uid(mentor), "hi").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{mentee:?} → {mentor:?}");
  }
}

#[tokio::test]
async fn accept_checks_existence_and_ownership() {
  let machine = RequestMachine::new(seeded().await);
  let request = machine.create(&uid("m1"), &uid("t1"), "Hi").await.unwrap();

  assert!(matches!(
    machine.accept(Uuid::new_v4(), &uid("t1")).await,
    Err(Error::NotFound { entity: "request", .. })
  ));
  assert!(matches!(
    machine.accept(request.request_id, &uid("m1")).await,
    Err(Error::Forbidden(_))
  ));
  assert_eq!(
    machine.get(request.request_id).await.unwrap().status,
    RequestStatus::Pending
  );
}

#[tokio::test]
async fn accept_on_decided_request_is_invalid_state() {
  let machine = RequestMachine::new(seeded().await);
  let request = machine.create(&uid("m1"), &uid("t1"), "Hi").await.unwrap();
  machine.decline(request.request_id).await.unwrap();

  let err = machine.accept(request.request_id, &uid("t1")).await.unwrap_err();
  assert!(matches!(
    err,
    Error::InvalidState { status: RequestStatus::Declined, .. }
  ));
  assert_eq!(
    machine.get(request.request_id).await.unwrap().status,
    RequestStatus::Declined
  );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_have_one_winner() {
  let machine = RequestMachine::new(seeded().await);
  let request = machine.create(&uid("m1"), &uid("t1"), "Hi").await.unwrap();
  let id = request.request_id;

  let (a, b) = tokio::join!(
    {
      let machine = machine.clone();
      tokio::spawn(async move { machine.accept(id, &uid("t1")).await })
    },
    {
      let machine = machine.clone();
      tokio::spawn(async move { machine.accept(id, &uid("t1")).await })
    },
  );
  let outcomes = [a.unwrap(), b.unwrap()];

  assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
  assert!(outcomes.iter().any(|r| matches!(
    r,
    Err(Error::InvalidState { status: RequestStatus::Accepted, .. })
  )));
}

#[tokio::test]
async fn decline_twice_is_a_noop() {
  let machine = RequestMachine::new(seeded().await);
  let request = machine.create(&uid("m1"), &uid("t1"), "Hi").await.unwrap();

  machine.decline(request.request_id).await.unwrap();
  let after_first = machine.get(request.request_id).await.unwrap();
  assert_eq!(after_first.status, RequestStatus::Declined);
  assert!(after_first.decided_at.is_some());

  machine.decline(request.request_id).await.unwrap();
  assert_eq!(machine.get(request.request_id).await.unwrap(), after_first);

  assert!(matches!(
    machine.decline(Uuid::new_v4()).await,
    Err(Error::NotFound { .. })
  ));
}

#[tokio::test]
async fn decline_after_accept_keeps_accepted() {
  let machine = RequestMachine::new(seeded().await);
  let request = machine.create(&uid("m1"), &uid("t1"), "Hi").await.unwrap();
  machine.accept(request.request_id, &uid("t1")).await.unwrap();
  machine.decline(request.request_id).await.unwrap();
  assert_eq!(
    machine.get(request.request_id).await.unwrap().status,
    RequestStatus::Accepted
  );
}

#[tokio::test]
async fn failed_transition_leaves_status_unchanged() {
  let faulty = FaultyStore::new(seeded().await);
  let machine = RequestMachine::new(faulty.clone());
  let request = machine.create(&uid("m1"), &uid("t1"), "Hi").await.unwrap();

  faulty.faults.transitions.store(true, Ordering::SeqCst);
  let err = machine.accept(request.request_id, &uid("t1")).await.unwrap_err();
  assert!(err.is_retryable());
  let err = machine.decline(request.request_id).await.unwrap_err();
  assert!(err.is_retryable());

  faulty.faults.transitions.store(false, Ordering::SeqCst);
  assert_eq!(
    machine.get(request.request_id).await.unwrap().status,
    RequestStatus::Pending
  );
  machine.accept(request.request_id, &uid("t1")).await.unwrap();
}

#[tokio::test]
async fn sent_by_mentee_lists_newest_first() {
  let machine = RequestMachine::new(seeded().await);
  let first = machine.create(&uid("m1"), &uid("t1"), "one").await.unwrap();
  let second = machine.create(&uid("m1"), &uid("t2"), "two").await.unwrap();
  machine.create(&uid("m2"), &uid("t1"), "other").await.unwrap();

  let sent = machine.sent_by_mentee(&uid("m1")).await.unwrap();
  let ids: Vec<_> = sent.iter().map(|r| r.request_id).collect();
  assert_eq!(ids, [second.request_id, first.request_id]);
}

#[tokio::test]
async fn pending_view_tracks_transitions() {
  let store = seeded().await;
  let machine = RequestMachine::new(store.clone());
  let mut view = machine.pending_for_mentor(&uid("t1"));
  assert!(next_within(&mut view).await.is_empty());

  let request = machine.create(&uid("m1"), &uid("t1"), "Hi").await.unwrap();
  let snapshot = next_within(&mut view).await;
  assert_eq!(snapshot.len(), 1);
  assert_eq!(snapshot[0].mentee_id, uid("m1"));
  assert_eq!(snapshot[0].status, RequestStatus::Pending);

  machine.decline(request.request_id).await.unwrap();
  assert!(next_within(&mut view).await.is_empty());
}

#[tokio::test]
async fn pending_view_hydrates_missing_mentee_fields() {
  let store = MemoryStore::new();
  store.put_profile(profile("t1", "Theo", Role::Mentor)).await.unwrap();
  let machine = RequestMachine::new(store.clone());

  // No mentee profile yet, so nothing is captured at creation.
  let request = machine.create(&uid("m1"), &uid("t1"), "Hi").await.unwrap();
  assert!(request.mentee_name.is_empty());
  store.put_profile(profile("m1", "Mia", Role::Mentee)).await.unwrap();

  let mut view = machine.pending_for_mentor(&uid("t1"));
  let snapshot = next_within(&mut view).await;
  assert_eq!(snapshot[0].mentee_name, "Mia");
  assert_eq!(snapshot[0].mentee_avatar_url, "https://cdn.example.com/m1.jpg");
}

#[tokio::test]
async fn pending_view_refreshes_when_listed_mentee_saves_profile() {
  let store = MemoryStore::new();
  store.put_profile(profile("t1", "Theo", Role::Mentor)).await.unwrap();
  let machine = RequestMachine::new(store.clone());
  machine.create(&uid("m1"), &uid("t1"), "Hi").await.unwrap();

  let mut view = machine.pending_for_mentor(&uid("t1"));
  let snapshot = next_within(&mut view).await;
  assert!(snapshot[0].mentee_name.is_empty());

  // A profile unrelated to the view does not trigger a snapshot.
  store.put_profile(profile("x9", "Xavier", Role::Mentee)).await.unwrap();
  store.put_profile(profile("m1", "Mia", Role::Mentee)).await.unwrap();

  let snapshot = next_within(&mut view).await;
  assert_eq!(snapshot[0].mentee_name, "Mia");
  assert_eq!(snapshot[0].mentee_avatar_url, "https://cdn.example.com/m1.jpg");
}

// ─── Match Orchestrator ──────────────────────────────────────────────────────

#[tokio::test]
async fn mentee_to_mentor_scenario() {
  let store = seeded().await;
  let matcher = MatchOrchestrator::new(store.clone());
  let mut pending = matcher.requests().pending_for_mentor(&uid("t1"));
  assert!(next_within(&mut pending).await.is_empty());

  let request = matcher
    .request_mentorship(&session("m1"), &uid("t1"), "Hi")
    .await
    .unwrap();
  let snapshot = next_within(&mut pending).await;
  assert_eq!(snapshot.len(), 1);
  assert_eq!(snapshot[0].mentee_id, uid("m1"));
  assert_eq!(snapshot[0].status, RequestStatus::Pending);

  let accepted = matcher
    .accept(request.request_id, &uid("t1"), ParticipantsMeta::new())
    .await
    .unwrap();
  assert_eq!(accepted.request.status, RequestStatus::Accepted);

  let stored = matcher.requests().get(request.request_id).await.unwrap();
  assert_eq!(stored.status, RequestStatus::Accepted);
  assert_eq!(stored.chat_id, Some(accepted.chat_id));

  let pair = CanonicalPair::new(uid("m1"), uid("t1")).unwrap();
  let chat = store.find_chat(pair.clone()).await.unwrap().unwrap();
  assert_eq!(chat.chat_id, accepted.chat_id);
  assert_eq!(chat.last_message, ACCEPT_GREETING);
  assert_eq!(chat.participants_meta[&uid("m1")].display_name, "Mia Mentee");
  assert_eq!(chat.participants_meta[&uid("t1")].display_name, "Theo Mentor");

  let again = matcher
    .resolver()
    .resolve_or_create(&uid("m1"), &uid("t1"), "Hi again", ParticipantsMeta::new())
    .await
    .unwrap();
  assert_eq!(again, accepted.chat_id);
  assert_eq!(store.chat_count(&pair).await, 1);
}

#[tokio::test]
async fn accept_reuses_chat_opened_from_profile_page() {
  let store = seeded().await;
  let matcher = MatchOrchestrator::new(store.clone());

  let direct = matcher
    .start_chat(&session("m1"), &uid("t1"), "Hi Theo, let's connect!")
    .await
    .unwrap();
  let request = matcher
    .request_mentorship(&session("m1"), &uid("t1"), "Hi")
    .await
    .unwrap();
  let accepted = matcher
    .accept(request.request_id, &uid("t1"), ParticipantsMeta::new())
    .await
    .unwrap();

  assert_eq!(accepted.chat_id, direct);
  let history = store.list_messages(direct).await.unwrap();
  assert_eq!(history.len(), 1, "greeting is not re-sent to an existing chat");
}

#[tokio::test]
async fn accept_uses_role_fallbacks_when_directory_is_down() {
  let faulty = FaultyStore::new(MemoryStore::new());
  let matcher = MatchOrchestrator::new(faulty.clone());
  let request = matcher
    .request_mentorship(&session("m1"), &uid("t1"), "Hi")
    .await
    .unwrap();

  faulty.faults.profiles.store(true, Ordering::SeqCst);
  let accepted = matcher
    .accept(request.request_id, &uid("t1"), ParticipantsMeta::new())
    .await
    .unwrap();

  let chat = faulty.get_chat(accepted.chat_id).await.unwrap().unwrap();
  assert_eq!(chat.participants_meta[&uid("t1")].display_name, "Mentor");
  assert_eq!(chat.participants_meta[&uid("m1")].display_name, "Mentee");
  assert_eq!(chat.participants_meta[&uid("m1")].avatar_url, "");
}

#[tokio::test]
async fn accept_prefers_caller_hint() {
  let store = seeded().await;
  let matcher = MatchOrchestrator::new(store.clone());
  let request = matcher
    .request_mentorship(&session("m1"), &uid("t1"), "Hi")
    .await
    .unwrap();

  let mut hint = ParticipantsMeta::new();
  hint.insert(uid("t1"), DisplayFields::new("Dr. Theo", "https://cdn.example.com/custom.jpg"));
  let accepted = matcher.accept(request.request_id, &uid("t1"), hint).await.unwrap();

  let chat = store.get_chat(accepted.chat_id).await.unwrap().unwrap();
  assert_eq!(chat.participants_meta[&uid("t1")].display_name, "Dr. Theo");
  assert_eq!(chat.participants_meta[&uid("m1")].display_name, "Mia Mentee");
}

#[tokio::test]
async fn link_failure_does_not_roll_back_acceptance() {
  let faulty = FaultyStore::new(seeded().await);
  let matcher = MatchOrchestrator::new(faulty.clone());
  let request = matcher
    .request_mentorship(&session("m1"), &uid("t1"), "Hi")
    .await
    .unwrap();

  faulty.faults.attach.store(true, Ordering::SeqCst);
  let accepted = matcher
    .accept(request.request_id, &uid("t1"), ParticipantsMeta::new())
    .await
    .unwrap();

  let stored = matcher.requests().get(request.request_id).await.unwrap();
  assert_eq!(stored.status, RequestStatus::Accepted);
  assert_eq!(stored.chat_id, None);

  // The chat is still discoverable, and a later recovery links it.
  faulty.faults.attach.store(false, Ordering::SeqCst);
  let recovered = matcher.chat_for_request(request.request_id, &uid("m1")).await.unwrap();
  assert_eq!(recovered, accepted.chat_id);
  assert_eq!(
    matcher.requests().get(request.request_id).await.unwrap().chat_id,
    Some(accepted.chat_id)
  );
}

#[tokio::test]
async fn chat_for_request_requires_accepted_party() {
  let matcher = MatchOrchestrator::new(seeded().await);
  let request = matcher
    .request_mentorship(&session("m1"), &uid("t1"), "Hi")
    .await
    .unwrap();

  assert!(matches!(
    matcher.chat_for_request(request.request_id, &uid("t1")).await,
    Err(Error::InvalidState { status: RequestStatus::Pending, .. })
  ));
  assert!(matches!(
    matcher.chat_for_request(request.request_id, &uid("x9")).await,
    Err(Error::Forbidden(_))
  ));
}

#[tokio::test]
async fn only_the_mentor_may_decline() {
  let matcher = MatchOrchestrator::new(seeded().await);
  let request = matcher
    .request_mentorship(&session("m1"), &uid("t1"), "Hi")
    .await
    .unwrap();

  assert!(matches!(
    matcher.decline(request.request_id, &uid("m1")).await,
    Err(Error::Forbidden(_))
  ));
  matcher.decline(request.request_id, &uid("t1")).await.unwrap();
  matcher.decline(request.request_id, &uid("t1")).await.unwrap();
}

// ─── Message Channel ─────────────────────────────────────────────────────────

async fn open_chat(store: &MemoryStore) -> Uuid {
  ChatResolver::new(store.clone())
    .resolve_or_create(&uid("m1"), &uid("t1"), "Hi", ParticipantsMeta::new())
    .await
    .unwrap()
}

#[tokio::test]
async fn append_orders_messages_and_updates_summary() {
  let store = seeded().await;
  let chat_id = open_chat(&store).await;
  let channel = MessageChannel::new(store.clone());

  let mut sent = Vec::new();
  for (sender, text) in [("t1", "Welcome!"), ("m1", "Thanks"), ("t1", "When works?")] {
    sent.push(channel.append(chat_id, &uid(sender), text).await.unwrap());
  }

  let history = channel.history(chat_id).await.unwrap();
  let texts: Vec<_> = history.iter().map(|m| m.text.as_str()).collect();
  assert_eq!(texts, ["Hi", "Welcome!", "Thanks", "When works?"]);
  assert!(history.windows(2).all(|w| w[0].created_at < w[1].created_at));
  assert_eq!(&history[1..].iter().map(|m| m.message_id).collect::<Vec<_>>(), &sent);

  let chat = channel.thread(chat_id).await.unwrap();
  assert_eq!(chat.last_message, "When works?");
  assert_eq!(chat.last_updated, history.last().unwrap().created_at);
}

#[tokio::test]
async fn append_rejects_outsiders_blank_text_and_unknown_chats() {
  let store = seeded().await;
  let chat_id = open_chat(&store).await;
  let channel = MessageChannel::new(store);

  assert!(matches!(
    channel.append(chat_id, &uid("eve"), "hi").await,
    Err(Error::Forbidden(_))
  ));
  assert!(matches!(
    channel.append(chat_id, &uid("m1"), "   ").await,
    Err(Error::Validation(_))
  ));
  assert!(matches!(
    channel.append(Uuid::new_v4(), &uid("m1"), "hi").await,
    Err(Error::NotFound { entity: "chat", .. })
  ));
  assert_eq!(channel.history(chat_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_append_is_retryable() {
  let faulty = FaultyStore::new(seeded().await);
  let chat_id = ChatResolver::new(faulty.clone())
    .resolve_or_create(&uid("m1"), &uid("t1"), "Hi", ParticipantsMeta::new())
    .await
    .unwrap();
  let channel = MessageChannel::new(faulty.clone());

  faulty.faults.appends.store(true, Ordering::SeqCst);
  assert!(channel.append(chat_id, &uid("m1"), "hello").await.unwrap_err().is_retryable());
  assert_eq!(channel.thread(chat_id).await.unwrap().last_message, "Hi");
}

#[tokio::test]
async fn subscription_delivers_each_message_once_in_order() {
  let store = seeded().await;
  let chat_id = open_chat(&store).await;
  let channel = MessageChannel::new(store.clone());

  let mut live = channel.subscribe(chat_id);
  assert_eq!(next_within(&mut live).await.len(), 1);

  channel.append(chat_id, &uid("t1"), "one").await.unwrap();
  let mut snapshot = next_within(&mut live).await;
  while snapshot.len() < 2 {
    snapshot = next_within(&mut live).await;
  }
  channel.append(chat_id, &uid("m1"), "two").await.unwrap();
  while snapshot.len() < 3 {
    snapshot = next_within(&mut live).await;
  }

  let texts: Vec<_> = snapshot.iter().map(|m| m.text.as_str()).collect();
  assert_eq!(texts, ["Hi", "one", "two"]);
  assert!(snapshot.windows(2).all(|w| w[0].order_key() < w[1].order_key()));
}

#[tokio::test]
async fn cancelled_subscription_yields_nothing() {
  let store = seeded().await;
  let chat_id = open_chat(&store).await;
  let channel = MessageChannel::new(store.clone());

  let mut live = channel.subscribe(chat_id);
  next_within(&mut live).await;

  channel.append(chat_id, &uid("t1"), "queued").await.unwrap();
  tokio::time::sleep(Duration::from_millis(50)).await;
  live.cancel();

  assert!(live.is_cancelled());
  assert!(live.next().await.is_none());
  assert!(live.next_snapshot().await.is_none());
}

#[tokio::test]
async fn thread_list_orders_by_last_update() {
  let store = MemoryStore::new();
  let resolver = ChatResolver::new(store.clone());
  let channel = MessageChannel::new(store.clone());

  let with_a = resolver
    .resolve_or_create(&uid("me"), &uid("a"), "to a", ParticipantsMeta::new())
    .await
    .unwrap();
  let with_b = resolver
    .resolve_or_create(&uid("me"), &uid("b"), "to b", ParticipantsMeta::new())
    .await
    .unwrap();

  let mut threads = channel.subscribe_threads_for_user(&uid("me"));
  let ids: Vec<_> = next_within(&mut threads).await.iter().map(|c| c.chat_id).collect();
  assert_eq!(ids, [with_b, with_a]);

  channel.append(with_a, &uid("a"), "bump").await.unwrap();
  let snapshot = next_within(&mut threads).await;
  assert_eq!(snapshot[0].chat_id, with_a);
  assert_eq!(snapshot[0].last_message, "bump");
  assert_eq!(snapshot[0].display_for(&uid("a")).display_name, UNKNOWN_NAME);

  // Threads of other users do not show up.
  resolver
    .resolve_or_create(&uid("x"), &uid("y"), "elsewhere", ParticipantsMeta::new())
    .await
    .unwrap();
  let all = store.list_chats_for_user(uid("me")).await.unwrap();
  assert_eq!(all.len(), 2);
}
