//! In-memory implementations of both store traits.
//!
//! Used to substitute the real backends in engine and HTTP tests. Data lives
//! behind `RwLock`s; no lock is held across an await point.

use std::{
  collections::HashMap,
  sync::{
    PoisonError, RwLock,
    atomic::{AtomicUsize, Ordering},
  },
};

use thiserror::Error;
use uuid::Uuid;

use crate::{
  record::{Appointment, AppointmentRecord, Doctor, Patient},
  session::{ChatMessage, ChatSession, SessionId, SessionPatch},
  store::{AppointmentQuery, RecordStore, SessionStore, SortOrder},
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("memory store unavailable: {0}")]
  Unavailable(&'static str),
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryRecordStore {
  patients:     RwLock<Vec<Patient>>,
  doctors:      RwLock<Vec<Doctor>>,
  appointments: RwLock<Vec<Appointment>>,
}

impl MemoryRecordStore {
  pub fn new() -> Self { Self::default() }

  pub fn add_patient(&self, patient: Patient) {
    write(&self.patients).push(patient);
  }

  pub fn add_doctor(&self, doctor: Doctor) { write(&self.doctors).push(doctor); }

  /// Inserted as-is; dangling patient or doctor references are allowed so
  /// integrity faults can be exercised.
  pub fn add_appointment(&self, appointment: Appointment) {
    write(&self.appointments).push(appointment);
  }
}

impl RecordStore for MemoryRecordStore {
  type Error = Error;

  async fn patient_by_id(&self, id: Uuid) -> Result<Option<Patient>, Error> {
    Ok(read(&self.patients).iter().find(|p| p.patient_id == id).cloned())
  }

  async fn patient_by_external_id(
    &self,
    external_id: &str,
  ) -> Result<Option<Patient>, Error> {
    Ok(
      read(&self.patients)
        .iter()
        .find(|p| p.external_id.as_deref() == Some(external_id))
        .cloned(),
    )
  }

  async fn patients_by_name(
    &self,
    fragment: &str,
    limit: usize,
  ) -> Result<Vec<Patient>, Error> {
    let needle = fragment.to_lowercase();
    let mut hits: Vec<Patient> = read(&self.patients)
      .iter()
      .filter(|p| p.full_name.to_lowercase().contains(&needle))
      .cloned()
      .collect();
    hits.sort_by(|a, b| a.full_name.cmp(&b.full_name));
    hits.truncate(limit);
    Ok(hits)
  }

  async fn appointments(
    &self,
    query: &AppointmentQuery,
  ) -> Result<Vec<AppointmentRecord>, Error> {
    let patients = read(&self.patients);
    let doctors = read(&self.doctors);

    let mut rows: Vec<Appointment> = read(&self.appointments)
      .iter()
      .filter(|a| a.patient_id == query.patient_id)
      .filter(|a| query.starting_from.is_none_or(|from| a.start_time >= from))
      .cloned()
      .collect();

    rows.sort_by_key(|a| a.start_time);
    if query.order == SortOrder::Descending {
      rows.reverse();
    }

    Ok(
      rows
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .map(|appointment| joined(&patients, &doctors, appointment))
        .collect(),
    )
  }

  async fn appointment_by_id(
    &self,
    id: Uuid,
  ) -> Result<Option<AppointmentRecord>, Error> {
    let patients = read(&self.patients);
    let doctors = read(&self.doctors);
    Ok(
      read(&self.appointments)
        .iter()
        .find(|a| a.appointment_id == id)
        .cloned()
        .map(|appointment| joined(&patients, &doctors, appointment)),
    )
  }
}

/// Left-join an appointment with its patient and doctor.
fn joined(
  patients: &[Patient],
  doctors: &[Doctor],
  appointment: Appointment,
) -> AppointmentRecord {
  let patient = patients.iter().find(|p| p.patient_id == appointment.patient_id);
  let doctor = doctors.iter().find(|d| d.doctor_id == appointment.doctor_id);
  AppointmentRecord {
    patient_name: patient.map(|p| p.full_name.clone()),
    doctor_name: doctor.map(|d| d.name.clone()),
    department_id: doctor.map(|d| d.department_id),
    appointment,
  }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

pub struct MemorySessionStore {
  sessions:       RwLock<HashMap<SessionId, ChatSession>>,
  messages:       RwLock<Vec<ChatMessage>>,
  /// Message inserts beyond this many fail with [`Error::Unavailable`].
  message_budget: AtomicUsize,
}

impl Default for MemorySessionStore {
  fn default() -> Self {
    Self {
      sessions:       RwLock::default(),
      messages:       RwLock::default(),
      message_budget: AtomicUsize::new(usize::MAX),
    }
  }
}

impl MemorySessionStore {
  pub fn new() -> Self { Self::default() }

  /// Accept only `n` more message inserts, then start failing.
  pub fn limit_message_writes(&self, n: usize) {
    self.message_budget.store(n, Ordering::SeqCst);
  }
}

impl SessionStore for MemorySessionStore {
  type Error = Error;

  async fn insert_session(&self, session: ChatSession) -> Result<(), Error> {
    write(&self.sessions).insert(session.session_id, session);
    Ok(())
  }

  async fn find_session(
    &self,
    id: SessionId,
  ) -> Result<Option<ChatSession>, Error> {
    Ok(read(&self.sessions).get(&id).cloned())
  }

  async fn update_active_session(
    &self,
    id: SessionId,
    patch: SessionPatch,
  ) -> Result<bool, Error> {
    let mut sessions = write(&self.sessions);
    match sessions.get_mut(&id) {
      Some(session) if !session.is_ended() => {
        patch.apply(session);
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn insert_message(&self, message: ChatMessage) -> Result<(), Error> {
    self
      .message_budget
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .map_err(|_| Error::Unavailable("message writes exhausted"))?;
    write(&self.messages).push(message);
    Ok(())
  }

  async fn messages(
    &self,
    session_id: SessionId,
  ) -> Result<Vec<ChatMessage>, Error> {
    let mut found: Vec<ChatMessage> = read(&self.messages)
      .iter()
      .filter(|m| m.session_id == session_id)
      .cloned()
      .collect();
    found.sort_by_key(|m| m.timestamp);
    Ok(found)
  }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
  lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
  lock.write().unwrap_or_else(PoisonError::into_inner)
}
