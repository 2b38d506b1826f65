//! The `RecordStore` and `SessionStore` traits and supporting query types.
//!
//! The relational records and the chat documents live in two independent
//! stores with independent failure modes. Nothing spans both of them in a
//! transaction. Higher layers (`kiosk-chat`, `kiosk-api`) depend on these
//! abstractions, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  record::{AppointmentRecord, Patient},
  session::{ChatMessage, ChatSession, SessionId, SessionPatch},
};

// ─── Query type ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
  /// Soonest first.
  #[default]
  Ascending,
  /// Latest first.
  Descending,
}

/// Parameters for [`RecordStore::appointments`].
#[derive(Debug, Clone)]
pub struct AppointmentQuery {
  pub patient_id:    Uuid,
  /// Only appointments starting at or after this instant.
  pub starting_from: Option<DateTime<Utc>>,
  /// Ordering on start time.
  pub order:         SortOrder,
  pub limit:         usize,
  pub offset:        usize,
}

// ─── Relational store ────────────────────────────────────────────────────────

/// Read access to the hospital's relational records.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Point lookup by internal id. Returns `None` if not found.
  fn patient_by_id(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Patient>, Self::Error>> + Send + '_;

  /// Exact match on the external identifier (medical record number).
  fn patient_by_external_id<'a>(
    &'a self,
    external_id: &'a str,
  ) -> impl Future<Output = Result<Option<Patient>, Self::Error>> + Send + 'a;

  /// Case-insensitive substring match on full name, at most `limit` rows,
  /// ordered by name.
  fn patients_by_name<'a>(
    &'a self,
    fragment: &'a str,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Patient>, Self::Error>> + Send + 'a;

  /// Appointments for one patient joined with patient and doctor rows,
  /// ordered by start time.
  ///
  /// Rows whose patient or doctor is missing are still returned with empty
  /// join columns; see [`AppointmentRecord`].
  fn appointments<'a>(
    &'a self,
    query: &'a AppointmentQuery,
  ) -> impl Future<Output = Result<Vec<AppointmentRecord>, Self::Error>> + Send + 'a;

  /// One appointment by id, left-joined like [`appointments`](Self::appointments).
  fn appointment_by_id(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<AppointmentRecord>, Self::Error>> + Send + '_;
}

// ─── Document store ──────────────────────────────────────────────────────────

/// Primitive document operations over chat sessions and messages.
///
/// Lifecycle rules (not-found and ended guards) are layered on top of these
/// by the session manager; the store itself knows nothing about them except
/// the active-only precondition on updates.
pub trait SessionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert a new session document.
  fn insert_session(
    &self,
    session: ChatSession,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Find one session by id. Returns `None` if not found.
  fn find_session(
    &self,
    id: SessionId,
  ) -> impl Future<Output = Result<Option<ChatSession>, Self::Error>> + Send + '_;

  /// Apply a field-level patch to a session that is still active, as one
  /// atomic single-document write.
  ///
  /// Returns `false` when no active session with that id matched.
  fn update_active_session(
    &self,
    id: SessionId,
    patch: SessionPatch,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Append a message document.
  fn insert_message(
    &self,
    message: ChatMessage,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// All messages of a session, oldest first.
  fn messages(
    &self,
    session_id: SessionId,
  ) -> impl Future<Output = Result<Vec<ChatMessage>, Self::Error>> + Send + '_;
}
