//! The conversation orchestrator.
//!
//! One inbound message runs through: load session → classify → record the
//! inbound message → (for appointment checks) pick a token, resolve it, look
//! appointments up → compose → record the reply → note the intent in the
//! session context.
//!
//! The three document writes are independent of each other and of the
//! relational reads. The reply and context writes are best-effort: once a
//! reply is composed the caller gets it even if recording it fails.

use std::{num::NonZeroUsize, sync::Arc};

use chrono::{DateTime, Utc};
use kiosk_core::{
  clock::{Clock, SystemClock},
  intent::{Classifier, Intent},
  record::AppointmentView,
  session::{
    CONTEXT_INTENT, Channel, ChatMessage, ChatSession, NewMessage, Nlu, Role,
    SessionId,
  },
  store::{RecordStore, SessionStore},
};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::{
  Result,
  bounded::StoreTimeouts,
  classify::{KeywordClassifier, KeywordRules},
  compose::{LookupOutcome, ReplyComposer, ReplyContent},
  lookup::{AppointmentLookup, DEFAULT_LOOKUP_LIMIT, FaultReporter},
  resolve::{DEFAULT_CANDIDATE_CAP, PatientResolver, Resolution},
  sessions::{SessionManager, validate_text},
};

/// Prefixes that introduce a patient token inside a message.
const TOKEN_PREFIXES: [&str; 2] = ["pid:", "id:"];

/// Tunables for a [`Conversation`].
#[derive(Debug, Clone)]
pub struct ChatSettings {
  pub timeouts:      StoreTimeouts,
  pub lookup_limit:  NonZeroUsize,
  pub candidate_cap: usize,
  pub keywords:      KeywordRules,
  pub replies:       ReplyContent,
}

impl Default for ChatSettings {
  fn default() -> Self {
    Self {
      timeouts:      StoreTimeouts::default(),
      lookup_limit:  DEFAULT_LOOKUP_LIMIT,
      candidate_cap: DEFAULT_CANDIDATE_CAP,
      keywords:      KeywordRules::default(),
      replies:       ReplyContent::default(),
    }
  }
}

/// What the caller gets back for one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exchange {
  pub reply:  String,
  pub intent: Intent,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub items:  Option<Vec<AppointmentView>>,
}

pub struct Conversation<R, D> {
  sessions:     SessionManager<D>,
  resolver:     PatientResolver<R>,
  lookup:       AppointmentLookup<R>,
  classifier:   Arc<dyn Classifier>,
  composer:     ReplyComposer,
  clock:        Arc<dyn Clock>,
  lookup_limit: NonZeroUsize,
}

impl<R: RecordStore, D: SessionStore> Conversation<R, D> {
  pub fn new(records: Arc<R>, sessions: Arc<D>, settings: ChatSettings) -> Self {
    let timeouts = settings.timeouts;
    Self {
      sessions:     SessionManager::new(sessions, timeouts.sessions),
      resolver:     PatientResolver::new(records.clone(), timeouts.records)
        .with_candidate_cap(settings.candidate_cap),
      lookup:       AppointmentLookup::new(records, timeouts.records),
      classifier:   Arc::new(KeywordClassifier::new(settings.keywords)),
      composer:     ReplyComposer::new(settings.replies),
      clock:        Arc::new(SystemClock),
      lookup_limit: settings.lookup_limit,
    }
  }

  pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
    self.classifier = classifier;
    self
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_fault_reporter(mut self, faults: Arc<dyn FaultReporter>) -> Self {
    self.lookup = self.lookup.with_fault_reporter(faults);
    self
  }

  pub fn sessions(&self) -> &SessionManager<D> { &self.sessions }

  pub fn resolver(&self) -> &PatientResolver<R> { &self.resolver }

  pub fn lookup(&self) -> &AppointmentLookup<R> { &self.lookup }

  pub fn now(&self) -> DateTime<Utc> { self.clock.now() }

  // ── Session entry points ──────────────────────────────────────────────────

  pub async fn start_session(
    &self,
    device_id: &str,
    channel: Channel,
  ) -> Result<ChatSession> {
    self.sessions.start(device_id, channel, self.now()).await
  }

  pub async fn attach_patient(&self, id: SessionId, token: &str) -> Result<()> {
    self.sessions.attach_patient(id, token, self.now()).await
  }

  pub async fn end_session(&self, id: SessionId) -> Result<ChatSession> {
    self.sessions.end(id, self.now()).await
  }

  pub async fn history(&self, id: SessionId) -> Result<Vec<ChatMessage>> {
    self.sessions.messages(id).await
  }

  // ── Messages ──────────────────────────────────────────────────────────────

  /// Handle one inbound message and produce the reply.
  #[tracing::instrument(skip_all, fields(%session_id, %role))]
  pub async fn handle(
    &self,
    session_id: SessionId,
    role: Role,
    text: &str,
  ) -> Result<Exchange> {
    validate_text(text)?;
    let session = self.sessions.active(session_id).await?;

    let intent = self.classifier.classify(text);
    let inbound = NewMessage {
      role,
      text: text.to_owned(),
      nlu: (role == Role::User).then_some(Nlu { intent }),
      extra: None,
    };
    self.sessions.append_to(&session, inbound, self.now()).await?;

    let outcome = match intent {
      Intent::CheckAppointment => Some(self.check_appointments(&session, text).await?),
      _ => None,
    };
    let reply = self.composer.compose(intent, outcome);

    let extra = reply.items.as_ref().and_then(items_extra);
    let outbound = NewMessage::assistant(reply.text.clone(), extra);
    if let Err(e) = self.sessions.append_to(&session, outbound, self.now()).await {
      tracing::warn!(error = %e, "failed to record assistant reply");
    }

    let mut context = Map::new();
    context.insert(CONTEXT_INTENT.to_owned(), Value::from(intent.as_str()));
    if let Err(e) = self.sessions.update_context(session_id, context).await {
      tracing::warn!(error = %e, "failed to record intent in session context");
    }

    tracing::debug!(%intent, "message handled");
    Ok(Exchange { reply: reply.text, intent, items: reply.items })
  }

  async fn check_appointments(
    &self,
    session: &ChatSession,
    text: &str,
  ) -> Result<LookupOutcome> {
    let token = session
      .patient_ref
      .as_ref()
      .map(|r| r.token.clone())
      .or_else(|| extract_token(text));

    let Some(token) = token else {
      tracing::info!(outcome = "missing_token", "no patient token available");
      return Ok(LookupOutcome::MissingToken);
    };

    match self.resolver.resolve(&token).await? {
      Resolution::Unique(patient) => {
        let items = self
          .lookup
          .upcoming_for(&patient, self.lookup_limit, self.now())
          .await?;
        tracing::info!(outcome = "unique", appointments = items.len(), "patient resolved");
        Ok(LookupOutcome::Found(items))
      }
      Resolution::NotFound => {
        tracing::info!(outcome = "not_found", "patient token matched nobody");
        Ok(LookupOutcome::Unresolved)
      }
      Resolution::Ambiguous(candidates) => {
        tracing::info!(
          outcome = "ambiguous",
          candidates = candidates.len(),
          "patient token matched several patients"
        );
        Ok(LookupOutcome::Unresolved)
      }
    }
  }
}

/// The `extra` payload attached to an assistant message that carries items.
/// A serialisation failure drops the payload; the reply text still goes out.
fn items_extra<T: Serialize + ?Sized>(items: &T) -> Option<Value> {
  match serde_json::to_value(items) {
    Ok(items) => Some(json!({ "items": items })),
    Err(e) => {
      tracing::warn!(error = %e, "failed to serialise appointment items");
      None
    }
  }
}

/// Pull a patient token out of `text`: whatever follows an `id:` or `pid:`
/// prefix (case-insensitive) that starts the message or follows a
/// non-alphanumeric character.
pub(crate) fn extract_token(text: &str) -> Option<String> {
  // ASCII lowercasing keeps byte offsets aligned with `text`.
  let lowered = text.to_ascii_lowercase();
  let start = TOKEN_PREFIXES
    .iter()
    .filter_map(|prefix| {
      lowered
        .match_indices(prefix)
        .find(|(at, _)| {
          lowered[..*at]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric())
        })
        .map(|(at, _)| at + prefix.len())
    })
    .min()?;

  let token = text[start..]
    .trim()
    .trim_end_matches(['.', '!', '?'])
    .trim();
  (!token.is_empty()).then(|| token.to_owned())
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use chrono::{Duration as Span, TimeZone};
  use kiosk_core::{
    clock::FixedClock,
    memory::{MemoryRecordStore, MemorySessionStore},
    record::{Appointment, AppointmentStatus, Doctor, Patient},
    session::SessionStatus,
  };
  use uuid::Uuid;

  use super::*;
  use crate::Error;

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 8, 1, 8, 0, 0).unwrap() }

  struct Fixture {
    records:  Arc<MemoryRecordStore>,
    sessions: Arc<MemorySessionStore>,
    chat:     Conversation<MemoryRecordStore, MemorySessionStore>,
    patient:  Patient,
    doctor:   Doctor,
  }

  fn fixture() -> Fixture {
    let records = Arc::new(MemoryRecordStore::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let patient = Patient {
      external_id: Some("MRN123456".into()),
      ..Patient::named("John Doe")
    };
    let doctor = Doctor {
      doctor_id:     Uuid::new_v4(),
      department_id: Uuid::new_v4(),
      name:          "Smith".into(),
      specialty:     Some("Cardiologist".into()),
      room:          Some("201".into()),
    };
    records.add_patient(patient.clone());
    records.add_doctor(doctor.clone());

    let chat = Conversation::new(records.clone(), sessions.clone(), ChatSettings::default())
      .with_clock(Arc::new(FixedClock(now())));
    Fixture { records, sessions, chat, patient, doctor }
  }

  impl Fixture {
    fn book(&self, start: DateTime<Utc>) {
      self.records.add_appointment(
        Appointment::new(
          self.patient.patient_id,
          self.doctor.doctor_id,
          start,
          Some(start + Span::minutes(30)),
          AppointmentStatus::Confirmed,
        )
        .unwrap(),
      );
    }

    async fn session(&self) -> SessionId {
      self.chat.start_session("kiosk-07", Channel::Touch).await.unwrap().session_id
    }
  }

  #[test]
  fn token_follows_a_recognised_prefix() {
    assert_eq!(extract_token("id: MRN123456").as_deref(), Some("MRN123456"));
    assert_eq!(extract_token("PID:  John Doe. ").as_deref(), Some("John Doe"));
    assert_eq!(
      extract_token("Check my appointment, id: MRN1").as_deref(),
      Some("MRN1")
    );
    assert_eq!(extract_token("check my appointment"), None);
    assert_eq!(extract_token("id:   "), None);
    // "id:" inside a word is not a prefix.
    assert_eq!(extract_token("paid:42"), None);
  }

  #[tokio::test]
  async fn directions_then_bare_identifier() {
    let f = fixture();
    let id = f.session().await;

    let first = f.chat.handle(id, Role::User, "Where is cardiology?").await.unwrap();
    assert_eq!(first.intent, Intent::AskDirections);
    assert_eq!(first.reply, ReplyContent::default().directions);
    assert!(first.items.is_none());

    // Without appointment keywords the prefix alone does not trigger a lookup.
    let second = f.chat.handle(id, Role::User, "id: MRN123456").await.unwrap();
    assert_eq!(second.intent, Intent::Fallback);
    assert!(second.items.is_none());

    let session = f.chat.sessions().get(id).await.unwrap();
    assert_eq!(session.last_intent(), Some(Intent::Fallback));
    let history = f.chat.history(id).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].nlu, Some(Nlu { intent: Intent::AskDirections }));
    assert_eq!(history[1].role, Role::Assistant);
  }

  #[tokio::test]
  async fn appointment_check_without_token_asks_for_one() {
    let f = fixture();
    let id = f.session().await;
    let exchange = f.chat.handle(id, Role::User, "Check my appointment").await.unwrap();
    assert_eq!(exchange.intent, Intent::CheckAppointment);
    assert_eq!(exchange.reply, ReplyContent::default().ask_identifier);
    assert!(exchange.items.is_none());
  }

  #[tokio::test]
  async fn token_in_message_is_resolved() {
    let f = fixture();
    f.book(now() + Span::days(1));
    f.book(now() - Span::days(1));
    let id = f.session().await;

    let exchange = f
      .chat
      .handle(id, Role::User, "check my appointment pid: MRN123456")
      .await
      .unwrap();
    let items = exchange.items.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].doctor_name, "Smith");
    assert!(exchange.reply.contains("- 02 Aug 2025, 08:00 with Dr. Smith (CONFIRMED)"));
  }

  #[tokio::test]
  async fn attached_patient_takes_precedence_and_list_is_truncated() {
    let f = fixture();
    for day in 1..=6 {
      f.book(now() + Span::days(day));
    }
    let id = f.session().await;
    f.chat.attach_patient(id, &f.patient.patient_id.to_string()).await.unwrap();

    // The embedded token names nobody; the attached one wins.
    let exchange = f
      .chat
      .handle(id, Role::User, "my appointment id: nobody-at-all")
      .await
      .unwrap();
    let lines = exchange.reply.lines().filter(|l| l.starts_with("- ")).count();
    assert_eq!(lines, 3);
    assert!(exchange.reply.ends_with(" and 2 more…"));
    assert_eq!(exchange.items.as_ref().map(Vec::len), Some(5));

    let history = f.chat.history(id).await.unwrap();
    let extra = history[1].extra.as_ref().unwrap();
    assert_eq!(extra["items"].as_array().unwrap().len(), 5);
    assert_eq!(extra["items"][0]["start_time"], "2025-08-02T08:00:00Z");
  }

  #[tokio::test]
  async fn ambiguous_and_unknown_tokens_read_as_no_results() {
    let f = fixture();
    f.records.add_patient(Patient::named("Johnny Doering"));
    f.book(now() + Span::days(1));
    let id = f.session().await;

    let ambiguous = f.chat.handle(id, Role::User, "my appointment id: john").await.unwrap();
    let unknown = f.chat.handle(id, Role::User, "my appointment id: zed").await.unwrap();
    assert_eq!(ambiguous.reply, ReplyContent::default().no_results);
    assert_eq!(ambiguous.reply, unknown.reply);
    assert!(ambiguous.items.is_none());
  }

  #[tokio::test]
  async fn reply_survives_a_failed_reply_write() {
    let f = fixture();
    let id = f.session().await;
    f.sessions.limit_message_writes(1);

    let exchange = f.chat.handle(id, Role::User, "What time do you open?").await.unwrap();
    assert_eq!(exchange.intent, Intent::ClinicHours);
    assert_eq!(f.chat.history(id).await.unwrap().len(), 1);
    // Context is still updated.
    let session = f.chat.sessions().get(id).await.unwrap();
    assert_eq!(session.last_intent(), Some(Intent::ClinicHours));
  }

  #[tokio::test]
  async fn inbound_write_failure_fails_the_request() {
    let f = fixture();
    let id = f.session().await;
    f.sessions.limit_message_writes(0);

    let err = f.chat.handle(id, Role::User, "hello").await.unwrap_err();
    assert!(err.is_retryable());
  }

  #[tokio::test]
  async fn ended_and_unknown_sessions_are_rejected() {
    let f = fixture();
    let id = f.session().await;
    let ended = f.chat.end_session(id).await.unwrap();
    assert_eq!(ended.status, SessionStatus::Ended);

    assert!(matches!(
      f.chat.handle(id, Role::User, "hello").await,
      Err(Error::SessionEnded(_))
    ));
    assert!(matches!(
      f.chat.handle(SessionId::generate(), Role::User, "hello").await,
      Err(Error::SessionNotFound(_))
    ));
    assert!(matches!(
      f.chat.handle(id, Role::User, "").await,
      Err(Error::Validation(_))
    ));
  }

  struct Always(Intent);

  impl Classifier for Always {
    fn classify(&self, _: &str) -> Intent { self.0 }
  }

  #[tokio::test]
  async fn classifier_is_pluggable() {
    let f = fixture();
    let chat = Conversation::new(f.records.clone(), f.sessions.clone(), ChatSettings {
      timeouts: StoreTimeouts::uniform(Duration::from_millis(500)),
      ..ChatSettings::default()
    })
    .with_classifier(Arc::new(Always(Intent::ClinicHours)));
    let id = chat.start_session("kiosk-07", Channel::Voice).await.unwrap().session_id;

    let exchange = chat.handle(id, Role::User, "Where is cardiology?").await.unwrap();
    assert_eq!(exchange.intent, Intent::ClinicHours);
  }

  #[test]
  fn items_extra_wraps_items_or_drops_unserialisable() {
    assert_eq!(items_extra(&[1, 2]), Some(json!({ "items": [1, 2] })));

    // Non-string map keys cannot become a JSON object.
    let bad: std::collections::BTreeMap<(u8, u8), u8> = [((1, 2), 3)].into();
    assert_eq!(items_extra(&bad), None);
  }
}
