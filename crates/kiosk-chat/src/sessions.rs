//! Session lifecycle on top of the document store.
//!
//! States are `active` and `ended`; `ended` is terminal. Every mutation is
//! guarded against unknown and ended sessions, and no operation creates a
//! session implicitly. Each transition is a single document write.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use kiosk_core::{
  session::{
    Channel, ChatMessage, ChatSession, MAX_MESSAGE_CHARS, NewMessage,
    PatientRef, SessionId, SessionPatch,
  },
  store::SessionStore,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result, StoreKind, bounded::bounded};

const DEVICE_ID_CHARS: std::ops::RangeInclusive<usize> = 3..=120;

pub struct SessionManager<D> {
  store:   Arc<D>,
  timeout: Duration,
}

impl<D: SessionStore> SessionManager<D> {
  pub fn new(store: Arc<D>, timeout: Duration) -> Self { Self { store, timeout } }

  /// Create a new active session.
  pub async fn start(
    &self,
    device_id: &str,
    channel: Channel,
    now: DateTime<Utc>,
  ) -> Result<ChatSession> {
    let device_id = device_id.trim();
    if !DEVICE_ID_CHARS.contains(&device_id.chars().count()) {
      return Err(Error::Validation(format!(
        "deviceId must be {} to {} characters",
        DEVICE_ID_CHARS.start(),
        DEVICE_ID_CHARS.end()
      )));
    }

    let session = ChatSession::start(device_id, channel, now);
    bounded(
      StoreKind::Sessions,
      self.timeout,
      self.store.insert_session(session.clone()),
    )
    .await?;
    tracing::info!(session_id = %session.session_id, %channel, "session started");
    Ok(session)
  }

  /// Load a session in any state.
  pub async fn get(&self, id: SessionId) -> Result<ChatSession> {
    bounded(StoreKind::Sessions, self.timeout, self.store.find_session(id))
      .await?
      .ok_or(Error::SessionNotFound(id))
  }

  /// Load a session, rejecting it if it has ended.
  pub async fn active(&self, id: SessionId) -> Result<ChatSession> {
    let session = self.get(id).await?;
    if session.is_ended() {
      return Err(Error::SessionEnded(id));
    }
    Ok(session)
  }

  /// Set or overwrite the session's patient reference. Repeating the same
  /// token only refreshes `attached_at`.
  pub async fn attach_patient(
    &self,
    id: SessionId,
    token: &str,
    now: DateTime<Utc>,
  ) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
      return Err(Error::Validation("patient token must not be empty".into()));
    }
    let patient_ref = PatientRef { token: token.to_owned(), attached_at: now };
    self.guarded_update(id, SessionPatch::attach(patient_ref)).await
  }

  /// Append a message to an active session.
  pub async fn append_message(
    &self,
    id: SessionId,
    message: NewMessage,
    now: DateTime<Utc>,
  ) -> Result<ChatMessage> {
    validate_text(&message.text)?;
    let session = self.active(id).await?;
    self.append_to(&session, message, now).await
  }

  /// Append to a session the caller has already loaded and checked.
  pub(crate) async fn append_to(
    &self,
    session: &ChatSession,
    message: NewMessage,
    now: DateTime<Utc>,
  ) -> Result<ChatMessage> {
    if session.is_ended() {
      return Err(Error::SessionEnded(session.session_id));
    }
    let message = ChatMessage {
      message_id: Uuid::new_v4(),
      session_id: session.session_id,
      role:       message.role,
      text:       message.text,
      nlu:        message.nlu,
      extra:      message.extra,
      timestamp:  now,
    };
    bounded(
      StoreKind::Sessions,
      self.timeout,
      self.store.insert_message(message.clone()),
    )
    .await?;
    Ok(message)
  }

  /// Move the session to `ended`. Ending an ended session is a no-op that
  /// returns it unchanged; the end timestamp is written exactly once.
  pub async fn end(&self, id: SessionId, now: DateTime<Utc>) -> Result<ChatSession> {
    let mut session = self.get(id).await?;
    if session.is_ended() {
      return Ok(session);
    }

    let patch = SessionPatch::end(now);
    let matched = bounded(
      StoreKind::Sessions,
      self.timeout,
      self.store.update_active_session(id, patch.clone()),
    )
    .await?;

    if matched {
      patch.apply(&mut session);
      tracing::info!(session_id = %id, "session ended");
      Ok(session)
    } else {
      // A concurrent end got there first; report its result.
      self.get(id).await
    }
  }

  /// Merge `entries` into the session context.
  pub async fn update_context(
    &self,
    id: SessionId,
    entries: Map<String, Value>,
  ) -> Result<()> {
    self.guarded_update(id, SessionPatch::context(entries)).await
  }

  /// The session's messages, oldest first.
  pub async fn messages(&self, id: SessionId) -> Result<Vec<ChatMessage>> {
    self.get(id).await?;
    bounded(StoreKind::Sessions, self.timeout, self.store.messages(id)).await
  }

  /// Write `patch` if the session is still active, otherwise explain why not.
  async fn guarded_update(&self, id: SessionId, patch: SessionPatch) -> Result<()> {
    let matched = bounded(
      StoreKind::Sessions,
      self.timeout,
      self.store.update_active_session(id, patch),
    )
    .await?;
    if matched {
      return Ok(());
    }

    match bounded(StoreKind::Sessions, self.timeout, self.store.find_session(id))
      .await?
    {
      None => Err(Error::SessionNotFound(id)),
      Some(session) if session.is_ended() => Err(Error::SessionEnded(id)),
      Some(_) => Err(Error::Store(
        StoreKind::Sessions,
        "active session did not match the update".into(),
      )),
    }
  }
}

pub(crate) fn validate_text(text: &str) -> Result<()> {
  if text.trim().is_empty() {
    return Err(Error::Validation("message text must not be empty".into()));
  }
  if text.chars().count() > MAX_MESSAGE_CHARS {
    return Err(Error::Validation(format!(
      "message text exceeds {MAX_MESSAGE_CHARS} characters"
    )));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::{Duration as Span, TimeZone};
  use kiosk_core::{
    intent::Intent,
    memory::MemorySessionStore,
    session::{CONTEXT_INTENT, Role, SessionStatus},
  };
  use serde_json::json;

  use super::*;

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 8, 10, 9, 0, 0).unwrap() }

  fn manager() -> SessionManager<MemorySessionStore> {
    SessionManager::new(Arc::new(MemorySessionStore::new()), Duration::from_secs(1))
  }

  #[tokio::test]
  async fn start_then_end_round_trip() {
    let sessions = manager();
    let session = sessions.start("kiosk-07", Channel::Touch, t0()).await.unwrap();
    assert_eq!(session.status, SessionStatus::Active);

    let ended = sessions.end(session.session_id, t0() + Span::minutes(5)).await.unwrap();
    assert_eq!(ended.status, SessionStatus::Ended);
    assert_eq!(ended.ended_at, Some(t0() + Span::minutes(5)));

    let stored = sessions.get(session.session_id).await.unwrap();
    assert_eq!(stored, ended);

    let err = sessions
      .attach_patient(session.session_id, "MRN123456", t0())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::SessionEnded(_)));
  }

  #[tokio::test]
  async fn end_is_idempotent_and_keeps_first_timestamp() {
    let sessions = manager();
    let session = sessions.start("kiosk-07", Channel::Voice, t0()).await.unwrap();
    let id = session.session_id;

    let first = sessions.end(id, t0() + Span::minutes(1)).await.unwrap();
    let second = sessions.end(id, t0() + Span::minutes(9)).await.unwrap();
    assert_eq!(first.ended_at, Some(t0() + Span::minutes(1)));
    assert_eq!(second.ended_at, first.ended_at);
  }

  #[tokio::test]
  async fn unknown_session_is_not_found_everywhere() {
    let sessions = manager();
    let id = SessionId::generate();
    assert!(matches!(sessions.get(id).await, Err(Error::SessionNotFound(_))));
    assert!(matches!(sessions.end(id, t0()).await, Err(Error::SessionNotFound(_))));
    assert!(matches!(
      sessions.attach_patient(id, "x", t0()).await,
      Err(Error::SessionNotFound(_))
    ));
    assert!(matches!(
      sessions.update_context(id, Map::new()).await,
      Err(Error::SessionNotFound(_))
    ));
    assert!(matches!(
      sessions.append_message(id, NewMessage::user("hi", Intent::Fallback), t0()).await,
      Err(Error::SessionNotFound(_))
    ));
  }

  #[tokio::test]
  async fn ended_session_rejects_appends_and_context() {
    let sessions = manager();
    let id = sessions.start("kiosk-07", Channel::Touch, t0()).await.unwrap().session_id;
    sessions.end(id, t0()).await.unwrap();

    let append = sessions
      .append_message(id, NewMessage::user("hello", Intent::Fallback), t0())
      .await;
    assert!(matches!(append, Err(Error::SessionEnded(_))));

    let mut entries = Map::new();
    entries.insert(CONTEXT_INTENT.into(), json!("fallback"));
    assert!(matches!(
      sessions.update_context(id, entries).await,
      Err(Error::SessionEnded(_))
    ));
    assert!(sessions.messages(id).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn attach_overwrites_and_refreshes_timestamp() {
    let sessions = manager();
    let id = sessions.start("kiosk-07", Channel::Touch, t0()).await.unwrap().session_id;

    sessions.attach_patient(id, " MRN1 ", t0()).await.unwrap();
    sessions.attach_patient(id, "MRN1", t0() + Span::minutes(2)).await.unwrap();
    let patient_ref = sessions.get(id).await.unwrap().patient_ref.unwrap();
    assert_eq!(patient_ref.token, "MRN1");
    assert_eq!(patient_ref.attached_at, t0() + Span::minutes(2));

    sessions.attach_patient(id, "MRN2", t0()).await.unwrap();
    assert_eq!(sessions.get(id).await.unwrap().patient_ref.unwrap().token, "MRN2");
  }

  #[tokio::test]
  async fn messages_come_back_in_order() {
    let sessions = manager();
    let id = sessions.start("kiosk-07", Channel::Touch, t0()).await.unwrap().session_id;
    sessions
      .append_message(id, NewMessage::assistant("second", None), t0() + Span::seconds(1))
      .await
      .unwrap();
    sessions
      .append_message(id, NewMessage::user("first", Intent::Fallback), t0())
      .await
      .unwrap();

    let messages = sessions.messages(id).await.unwrap();
    let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["first", "second"]);
    assert_eq!(messages[0].role, Role::User);
  }

  #[tokio::test]
  async fn input_bounds_are_enforced_before_the_store() {
    let sessions = manager();
    assert!(matches!(
      sessions.start("k1", Channel::Touch, t0()).await,
      Err(Error::Validation(_))
    ));
    let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
    assert!(matches!(validate_text(&long), Err(Error::Validation(_))));
    assert!(matches!(validate_text("   "), Err(Error::Validation(_))));
    assert!(validate_text("hello").is_ok());
  }

  // ─── Lost end race ──────────────────────────────────────────────────────

  type MemError = <MemorySessionStore as SessionStore>::Error;

  /// Lets another writer end the session just before our conditional
  /// update, so the update matches nothing.
  struct LateEnd {
    inner: MemorySessionStore,
    first: DateTime<Utc>,
  }

  impl SessionStore for LateEnd {
    type Error = MemError;

    async fn insert_session(&self, session: ChatSession) -> Result<(), MemError> {
      self.inner.insert_session(session).await
    }

    async fn find_session(&self, id: SessionId) -> Result<Option<ChatSession>, MemError> {
      self.inner.find_session(id).await
    }

    async fn update_active_session(
      &self,
      id: SessionId,
      _patch: SessionPatch,
    ) -> Result<bool, MemError> {
      assert!(self.inner.update_active_session(id, SessionPatch::end(self.first)).await?);
      Ok(false)
    }

    async fn insert_message(&self, message: ChatMessage) -> Result<(), MemError> {
      self.inner.insert_message(message).await
    }

    async fn messages(&self, session_id: SessionId) -> Result<Vec<ChatMessage>, MemError> {
      self.inner.messages(session_id).await
    }
  }

  #[tokio::test]
  async fn end_after_lost_race_reports_winning_timestamp() {
    let first = t0() + Span::minutes(3);
    let store = LateEnd { inner: MemorySessionStore::new(), first };
    let sessions = SessionManager::new(Arc::new(store), Duration::from_secs(1));
    let session = sessions.start("kiosk-07", Channel::Touch, t0()).await.unwrap();

    let ended = sessions.end(session.session_id, t0() + Span::minutes(9)).await.unwrap();
    assert_eq!(ended.status, SessionStatus::Ended);
    assert_eq!(ended.ended_at, Some(first));

    let stored = sessions.get(session.session_id).await.unwrap();
    assert_eq!(stored, ended);
  }
}
