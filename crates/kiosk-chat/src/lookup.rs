//! Appointment lookup for a resolved patient.
//!
//! The current time is always supplied by the caller. Rows whose patient or
//! doctor join came back empty are data-integrity faults: they are dropped
//! from the results and handed to a [`FaultReporter`].

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use kiosk_core::{
  record::{AppointmentRecord, AppointmentView, Patient},
  store::{AppointmentQuery, RecordStore, SortOrder},
};
use uuid::Uuid;

use crate::{Result, StoreKind, bounded::bounded};

pub const DEFAULT_LOOKUP_LIMIT: NonZeroUsize = NonZeroUsize::MIN.saturating_add(4);

// ─── Faults ──────────────────────────────────────────────────────────────────

/// An appointment that references a patient or doctor row that is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityFault {
  pub appointment_id:  Uuid,
  pub patient_id:      Uuid,
  pub doctor_id:       Uuid,
  pub missing_patient: bool,
  pub missing_doctor:  bool,
}

/// Monitoring collaborator that receives integrity faults.
pub trait FaultReporter: Send + Sync {
  fn report(&self, fault: &IntegrityFault);
}

/// Reports faults as `error`-level trace events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFaultReporter;

impl FaultReporter for TracingFaultReporter {
  fn report(&self, fault: &IntegrityFault) {
    tracing::error!(
      appointment_id = %fault.appointment_id,
      patient_id = %fault.patient_id,
      doctor_id = %fault.doctor_id,
      missing_patient = fault.missing_patient,
      missing_doctor = fault.missing_doctor,
      "appointment references a missing row"
    );
  }
}

// ─── Lookup ──────────────────────────────────────────────────────────────────

pub struct AppointmentLookup<R> {
  records: Arc<R>,
  timeout: Duration,
  faults:  Arc<dyn FaultReporter>,
}

impl<R: RecordStore> AppointmentLookup<R> {
  pub fn new(records: Arc<R>, timeout: Duration) -> Self {
    Self { records, timeout, faults: Arc::new(TracingFaultReporter) }
  }

  pub fn with_fault_reporter(mut self, faults: Arc<dyn FaultReporter>) -> Self {
    self.faults = faults;
    self
  }

  /// Appointments starting at or after `now`, soonest first, at most `limit`.
  pub async fn upcoming_for(
    &self,
    patient: &Patient,
    limit: NonZeroUsize,
    now: DateTime<Utc>,
  ) -> Result<Vec<AppointmentView>> {
    self
      .fetch(AppointmentQuery {
        patient_id:    patient.patient_id,
        starting_from: Some(now),
        order:         SortOrder::Ascending,
        limit:         limit.get(),
        offset:        0,
      })
      .await
  }

  /// A page of the patient's appointments, latest first. With `since` set
  /// only appointments starting at or after it are included.
  pub async fn history_for(
    &self,
    patient: &Patient,
    since: Option<DateTime<Utc>>,
    limit: NonZeroUsize,
    offset: usize,
  ) -> Result<Vec<AppointmentView>> {
    self
      .fetch(AppointmentQuery {
        patient_id: patient.patient_id,
        starting_from: since,
        order: SortOrder::Descending,
        limit: limit.get(),
        offset,
      })
      .await
  }

  /// A single appointment, or `None` if it does not exist or its joins are
  /// broken. A broken row is reported like any other.
  pub async fn by_id(&self, id: Uuid) -> Result<Option<AppointmentView>> {
    let row = bounded(
      StoreKind::Records,
      self.timeout,
      self.records.appointment_by_id(id),
    )
    .await?;
    Ok(row.and_then(|row| self.keep_joined(row)))
  }

  async fn fetch(&self, query: AppointmentQuery) -> Result<Vec<AppointmentView>> {
    let rows = bounded(
      StoreKind::Records,
      self.timeout,
      self.records.appointments(&query),
    )
    .await?;
    Ok(rows.into_iter().filter_map(|row| self.keep_joined(row)).collect())
  }

  fn keep_joined(&self, row: AppointmentRecord) -> Option<AppointmentView> {
    let fault = IntegrityFault {
      appointment_id:  row.appointment.appointment_id,
      patient_id:      row.appointment.patient_id,
      doctor_id:       row.appointment.doctor_id,
      missing_patient: row.patient_name.is_none(),
      missing_doctor:  row.doctor_name.is_none() || row.department_id.is_none(),
    };
    let view = row.into_view();
    if view.is_none() {
      self.faults.report(&fault);
    }
    view
  }
}
