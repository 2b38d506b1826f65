//! Relational records: the hospital's patients, doctors, departments, and
//! appointments.
//!
//! The chat engine only ever reads these. Their lifecycle is owned by the
//! administrative CRUD surface, which lives outside this workspace.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Organisation ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
  pub department_id: Uuid,
  pub name:          String,
  /// Short floor label, e.g. "2", "GF", "L3".
  pub floor:         Option<String>,
  pub location_note: Option<String>,
}

/// A doctor belongs to exactly one department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
  pub doctor_id:     Uuid,
  pub department_id: Uuid,
  pub name:          String,
  pub specialty:     Option<String>,
  pub room:          Option<String>,
}

// ─── Patient ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
  /// Internal identity; always unique.
  pub patient_id:    Uuid,
  /// Hospital medical record number or card number. Unique when present.
  pub external_id:   Option<String>,
  pub full_name:     String,
  pub date_of_birth: Option<NaiveDate>,
  pub phone:         Option<String>,
  pub note:          Option<String>,
}

impl Patient {
  /// A patient with only a name; everything optional left empty.
  pub fn named(full_name: impl Into<String>) -> Self {
    Self {
      patient_id:    Uuid::new_v4(),
      external_id:   None,
      full_name:     full_name.into(),
      date_of_birth: None,
      phone:         None,
      note:          None,
    }
  }
}

// ─── Appointment ─────────────────────────────────────────────────────────────

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
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum AppointmentStatus {
  #[default]
  Pending,
  Confirmed,
  Cancelled,
}

impl AppointmentStatus {
  pub fn as_str(self) -> &'static str { self.into() }
}

/// An appointment references exactly one patient and exactly one doctor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
  pub appointment_id: Uuid,
  pub patient_id:     Uuid,
  pub doctor_id:      Uuid,
  pub start_time:     DateTime<Utc>,
  pub end_time:       Option<DateTime<Utc>>,
  pub status:         AppointmentStatus,
}

impl Appointment {
  /// Build an appointment, rejecting an end time earlier than the start.
  pub fn new(
    patient_id: Uuid,
    doctor_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    status: AppointmentStatus,
  ) -> Result<Self> {
    if end_time.is_some_and(|end| end < start_time) {
      return Err(Error::InvalidTimeRange);
    }
    Ok(Self {
      appointment_id: Uuid::new_v4(),
      patient_id,
      doctor_id,
      start_time,
      end_time,
      status,
    })
  }
}

/// One appointment row as read through the patient and doctor joins.
///
/// The joined columns are optional: a row whose patient or doctor has gone
/// missing is still returned so the caller can report the integrity fault
/// instead of losing it silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentRecord {
  pub appointment:   Appointment,
  pub patient_name:  Option<String>,
  pub doctor_name:   Option<String>,
  pub department_id: Option<Uuid>,
}

/// A fully-joined appointment ready for display.
///
/// Serialised with the field names kiosk clients render from; timestamps are
/// ISO-8601 and a missing end time is `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentView {
  #[serde(rename = "appointmentId")]
  pub appointment_id: Uuid,
  #[serde(rename = "patientName")]
  pub patient_name:   String,
  #[serde(rename = "doctorName")]
  pub doctor_name:    String,
  #[serde(rename = "departmentId")]
  pub department_id:  Uuid,
  pub start_time:     DateTime<Utc>,
  pub end_time:       Option<DateTime<Utc>>,
  pub status:         AppointmentStatus,
}

impl AppointmentRecord {
  /// Collapse into a view, or `None` if either join came back empty.
  pub fn into_view(self) -> Option<AppointmentView> {
    Some(AppointmentView {
      appointment_id: self.appointment.appointment_id,
      patient_name:   self.patient_name?,
      doctor_name:    self.doctor_name?,
      department_id:  self.department_id?,
      start_time:     self.appointment.start_time,
      end_time:       self.appointment.end_time,
      status:         self.appointment.status,
    })
  }
}
