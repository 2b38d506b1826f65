//! Chat sessions and messages, the documents kept by the session store.
//!
//! A session moves `active → ended` exactly once. Messages are append-only and
//! never mutated after they are written.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, intent::Intent};

/// Upper bound on the length of a message body, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

// ─── Identity ────────────────────────────────────────────────────────────────

/// Opaque session identifier. Parsing rejects malformed strings before any
/// store is touched.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
  pub fn generate() -> Self { Self(Uuid::new_v4()) }

  pub fn as_uuid(&self) -> Uuid { self.0 }
}

impl fmt::Display for SessionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.hyphenated())
  }
}

impl FromStr for SessionId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Uuid::parse_str(s.trim())
      .map(Self)
      .map_err(|_| Error::InvalidSessionId(s.to_owned()))
  }
}

// ─── Enumerations ────────────────────────────────────────────────────────────

/// How the kiosk user is interacting.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
  Voice,
  #[default]
  Touch,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
  System,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
  Active,
  /// Terminal.
  Ended,
}

// ─── Session document ────────────────────────────────────────────────────────

/// The patient a session is currently talking about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRef {
  /// Free-text token; resolved against the record store on demand.
  pub token:       String,
  pub attached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
  pub session_id:  SessionId,
  pub device_id:   String,
  pub channel:     Channel,
  pub started_at:  DateTime<Utc>,
  /// Absent while the session is active.
  pub ended_at:    Option<DateTime<Utc>>,
  pub status:      SessionStatus,
  /// Free-form conversational context, e.g. the last intent seen.
  #[serde(default)]
  pub context:     Map<String, Value>,
  #[serde(default)]
  pub patient_ref: Option<PatientRef>,
}

impl ChatSession {
  /// A fresh active session with empty context and no patient attached.
  pub fn start(
    device_id: impl Into<String>,
    channel: Channel,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      session_id: SessionId::generate(),
      device_id: device_id.into(),
      channel,
      started_at: now,
      ended_at: None,
      status: SessionStatus::Active,
      context: Map::new(),
      patient_ref: None,
    }
  }

  pub fn is_ended(&self) -> bool { self.status == SessionStatus::Ended }

  /// The intent recorded by the most recent exchange, if any.
  pub fn last_intent(&self) -> Option<Intent> {
    self
      .context
      .get(CONTEXT_INTENT)
      .and_then(Value::as_str)
      .and_then(|s| s.parse().ok())
  }
}

/// Context key under which the latest intent is stored.
pub const CONTEXT_INTENT: &str = "intent";

// ─── Message document ────────────────────────────────────────────────────────

/// Classification metadata attached to user messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nlu {
  pub intent: Intent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub message_id: Uuid,
  pub session_id: SessionId,
  pub role:       Role,
  pub text:       String,
  /// Present on user messages.
  #[serde(default)]
  pub nlu:        Option<Nlu>,
  /// Structured payload accompanying assistant replies.
  #[serde(default)]
  pub extra:      Option<Value>,
  pub timestamp:  DateTime<Utc>,
}

/// Input to [`crate::store::SessionStore::insert_message`] via the session
/// manager. The id and timestamp are assigned on append.
#[derive(Debug, Clone)]
pub struct NewMessage {
  pub role:  Role,
  pub text:  String,
  pub nlu:   Option<Nlu>,
  pub extra: Option<Value>,
}

impl NewMessage {
  pub fn user(text: impl Into<String>, intent: Intent) -> Self {
    Self {
      role:  Role::User,
      text:  text.into(),
      nlu:   Some(Nlu { intent }),
      extra: None,
    }
  }

  pub fn assistant(text: impl Into<String>, extra: Option<Value>) -> Self {
    Self { role: Role::Assistant, text: text.into(), nlu: None, extra }
  }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// A field-level `$set`-style update to a session document.
///
/// Unset fields are left untouched; context entries are merged key by key
/// rather than replacing the whole map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
  pub status:      Option<SessionStatus>,
  pub ended_at:    Option<DateTime<Utc>>,
  pub patient_ref: Option<PatientRef>,
  pub context:     Map<String, Value>,
}

impl SessionPatch {
  pub fn end(at: DateTime<Utc>) -> Self {
    Self {
      status: Some(SessionStatus::Ended),
      ended_at: Some(at),
      ..Self::default()
    }
  }

  pub fn attach(patient_ref: PatientRef) -> Self {
    Self { patient_ref: Some(patient_ref), ..Self::default() }
  }

  pub fn context(entries: Map<String, Value>) -> Self {
    Self { context: entries, ..Self::default() }
  }

  pub fn is_empty(&self) -> bool {
    self.status.is_none()
      && self.ended_at.is_none()
      && self.patient_ref.is_none()
      && self.context.is_empty()
  }

  /// Apply in place. Backends that hold whole documents in memory use this;
  /// backends that update documents in the database must match it.
  pub fn apply(&self, session: &mut ChatSession) {
    if let Some(status) = self.status {
      session.status = status;
    }
    if let Some(at) = self.ended_at {
      session.ended_at = Some(at);
    }
    if let Some(patient_ref) = &self.patient_ref {
      session.patient_ref = Some(patient_ref.clone());
    }
    for (key, value) in &self.context {
      session.context.insert(key.clone(), value.clone());
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 10, 9, 0, 0).unwrap()
  }

  #[test]
  fn session_id_rejects_garbage() {
    assert!(matches!(
      "not-a-session".parse::<SessionId>(),
      Err(Error::InvalidSessionId(_))
    ));
    let id = SessionId::generate();
    assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
  }

  #[test]
  fn started_session_is_active_and_bare() {
    let session = ChatSession::start("kiosk-07", Channel::Touch, t0());
    assert_eq!(session.status, SessionStatus::Active);
    assert!(session.ended_at.is_none());
    assert!(session.context.is_empty());
    assert!(session.patient_ref.is_none());
  }

  #[test]
  fn patch_merges_context_without_dropping_keys() {
    let mut session = ChatSession::start("kiosk-07", Channel::Voice, t0());
    session.context.insert("language".into(), json!("en"));

    let mut entries = Map::new();
    entries.insert(CONTEXT_INTENT.into(), json!("clinic_hours"));
    SessionPatch::context(entries).apply(&mut session);

    assert_eq!(session.context["language"], "en");
    assert_eq!(session.last_intent(), Some(Intent::ClinicHours));
  }

  #[test]
  fn end_patch_sets_status_and_timestamp() {
    let mut session = ChatSession::start("kiosk-07", Channel::Touch, t0());
    SessionPatch::end(t0()).apply(&mut session);
    assert!(session.is_ended());
    assert_eq!(session.ended_at, Some(t0()));
  }
}
