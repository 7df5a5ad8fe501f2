//! Chat Identity Resolver: one thread per unordered pair of participants.
//!
//! Resolution canonicalises the pair, returns the existing thread if there is
//! one, and otherwise asks the store for an atomic create-if-absent keyed on
//! the pair. Two callers racing to open the same chat therefore converge on
//! one thread; the loser sees [`ChatInsert::Existing`] and reuses it.

use uuid::Uuid;

use crate::{
  Error, Result,
  chat::{
    CanonicalPair, ChatInsert, ChatThread, NewChat, OpeningMessage, ParticipantsMeta,
    UNKNOWN_NAME, missing_meta,
  },
  directory::ProfileDirectory,
  profile::UserId,
  store::MatchStore,
};

/// The thread a pair resolved to.
#[derive(Debug, Clone)]
pub struct Resolution {
  pub chat:    ChatThread,
  /// `true` if this call created the thread (and sent the opening message).
  pub created: bool,
}

impl Resolution {
  pub fn chat_id(&self) -> Uuid { self.chat.chat_id }
}

#[derive(Clone)]
pub struct ChatResolver<S> {
  store:     S,
  directory: ProfileDirectory<S>,
}

impl<S: MatchStore + Clone> ChatResolver<S> {
  pub fn new(store: S) -> Self {
    Self { directory: ProfileDirectory::new(store.clone()), store }
  }

  /// Resolve the thread between `a` and `b`, creating it if absent, and
  /// return its id. `a` is the sender of the opening message.
  pub async fn resolve_or_create(
    &self,
    a: &UserId,
    b: &UserId,
    opening_text: &str,
    meta_hint: ParticipantsMeta,
  ) -> Result<Uuid> {
    Ok(self.resolve(a, b, opening_text, meta_hint).await?.chat_id())
  }

  /// Like [`ChatResolver::resolve_or_create`], also reporting whether the
  /// thread was created by this call.
  pub async fn resolve(
    &self,
    a: &UserId,
    b: &UserId,
    opening_text: &str,
    meta_hint: ParticipantsMeta,
  ) -> Result<Resolution> {
    let pair = CanonicalPair::new(a.clone(), b.clone())?;
    let meta_hint: ParticipantsMeta = meta_hint
      .into_iter()
      .filter(|(id, _)| pair.contains(id))
      .collect();

    if let Some(existing) = self
      .store
      .find_chat(pair.clone())
      .await
      .map_err(Error::transient)?
    {
      let chat = self.enrich(existing, &meta_hint).await;
      return Ok(Resolution { chat, created: false });
    }

    let mut meta = meta_hint.clone();
    for participant in pair.iter() {
      self.directory.hydrate(&mut meta, participant, UNKNOWN_NAME).await;
    }

    let opening = match opening_text.trim() {
      "" => None,
      _ => Some(OpeningMessage { sender_id: a.clone(), text: opening_text.to_owned() }),
    };

    let insert = self
      .store
      .create_chat_if_absent(NewChat { participants: pair, participants_meta: meta, opening })
      .await
      .map_err(Error::transient)?;

    match insert {
      ChatInsert::Created { chat, .. } => {
        tracing::info!(
          chat_id = %chat.chat_id,
          first = %chat.participants.first(),
          second = %chat.participants.second(),
          "chat created"
        );
        Ok(Resolution { chat, created: true })
      }
      ChatInsert::Existing(chat) => {
        tracing::debug!(chat_id = %chat.chat_id, "chat created concurrently; reusing it");
        let chat = self.enrich(chat, &meta_hint).await;
        Ok(Resolution { chat, created: false })
      }
    }
  }

  /// Best-effort: record hint metadata for participants the thread has none
  /// for yet. First enrichment wins.
  async fn enrich(&self, chat: ChatThread, hint: &ParticipantsMeta) -> ChatThread {
    let patch = missing_meta(&chat.participants_meta, hint);
    if patch.is_empty() {
      return chat;
    }
    match self.store.enrich_chat_meta(chat.chat_id, patch).await {
      Ok(Some(updated)) => updated,
      Ok(None) => chat,
      Err(e) => {
        tracing::warn!(chat_id = %chat.chat_id, error = %e, "failed to enrich chat metadata");
        chat
      }
    }
  }
}
