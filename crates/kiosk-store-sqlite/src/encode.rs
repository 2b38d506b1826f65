//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with microsecond
//! precision so that lexical order equals chronological order. UUIDs are
//! hyphenated lowercase strings. Session documents are stored as JSON.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use kiosk_core::{
  record::{Appointment, AppointmentRecord, AppointmentStatus, Patient},
  session::SessionPatch,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Dates ───────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── AppointmentStatus ───────────────────────────────────────────────────────

pub fn decode_status(s: &str) -> Result<AppointmentStatus> {
  s.parse().map_err(|_| Error::UnknownValue {
    column: "appointments.status",
    value:  s.to_owned(),
  })
}

// ─── Session patches ─────────────────────────────────────────────────────────

/// Flatten a patch into `(json path, json text)` pairs for `json_set`.
///
/// Context entries address individual keys, so a patch never replaces the
/// whole context object.
pub fn patch_assignments(patch: &SessionPatch) -> Result<Vec<(String, String)>> {
  let mut out = Vec::new();
  if let Some(status) = patch.status {
    out.push(("$.status".to_owned(), serde_json::to_string(&status)?));
  }
  if let Some(ended_at) = patch.ended_at {
    out.push(("$.ended_at".to_owned(), serde_json::to_string(&ended_at)?));
  }
  if let Some(patient_ref) = &patch.patient_ref {
    out.push(("$.patient_ref".to_owned(), serde_json::to_string(patient_ref)?));
  }
  for (key, value) in &patch.context {
    if key.is_empty()
      || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
      return Err(Error::ContextKey(key.clone()));
    }
    out.push((format!("$.context.\"{key}\""), serde_json::to_string(value)?));
  }
  Ok(out)
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const PATIENT_COLUMNS: &str =
  "patient_id, external_id, full_name, date_of_birth, phone, note";

/// Raw strings read directly from a `patients` row.
pub struct RawPatient {
  pub patient_id:    String,
  pub external_id:   Option<String>,
  pub full_name:     String,
  pub date_of_birth: Option<String>,
  pub phone:         Option<String>,
  pub note:          Option<String>,
}

impl RawPatient {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      patient_id:    row.get(0)?,
      external_id:   row.get(1)?,
      full_name:     row.get(2)?,
      date_of_birth: row.get(3)?,
      phone:         row.get(4)?,
      note:          row.get(5)?,
    })
  }

  pub fn into_patient(self) -> Result<Patient> {
    Ok(Patient {
      patient_id:    decode_uuid(&self.patient_id)?,
      external_id:   self.external_id,
      full_name:     self.full_name,
      date_of_birth: self.date_of_birth.as_deref().map(decode_date).transpose()?,
      phone:         self.phone,
      note:          self.note,
    })
  }
}

/// Raw strings read from an `appointments` row left-joined with `patients`
/// and `doctors`.
pub struct RawAppointmentRecord {
  pub appointment_id: String,
  pub patient_id:     String,
  pub doctor_id:      String,
  pub start_time:     String,
  pub end_time:       Option<String>,
  pub status:         String,
  // joins
  pub patient_name:   Option<String>,
  pub doctor_name:    Option<String>,
  pub department_id:  Option<String>,
}

impl RawAppointmentRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      appointment_id: row.get(0)?,
      patient_id:     row.get(1)?,
      doctor_id:      row.get(2)?,
      start_time:     row.get(3)?,
      end_time:       row.get(4)?,
      status:         row.get(5)?,
      patient_name:   row.get(6)?,
      doctor_name:    row.get(7)?,
      department_id:  row.get(8)?,
    })
  }

  pub fn into_record(self) -> Result<AppointmentRecord> {
    // Built field by field: a stored row is trusted to satisfy the time
    // range check already enforced by the table.
    let appointment = Appointment {
      appointment_id: decode_uuid(&self.appointment_id)?,
      patient_id:     decode_uuid(&self.patient_id)?,
      doctor_id:      decode_uuid(&self.doctor_id)?,
      start_time:     decode_dt(&self.start_time)?,
      end_time:       self.end_time.as_deref().map(decode_dt).transpose()?,
      status:         decode_status(&self.status)?,
    };
    Ok(AppointmentRecord {
      appointment,
      patient_name: self.patient_name,
      doctor_name: self.doctor_name,
      department_id: self.department_id.as_deref().map(decode_uuid).transpose()?,
    })
  }
}
