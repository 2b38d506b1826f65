//! Patient identity resolution.
//!
//! A free-text token is matched in strict tiers: internal id, then exact
//! external identifier, then case-insensitive name fragment. The first tier
//! with any match wins and lower tiers are not consulted. A name fragment
//! that matches several patients is reported as ambiguous; it is never
//! narrowed to an arbitrary pick.

use std::{sync::Arc, time::Duration};

use kiosk_core::{record::Patient, store::RecordStore};
use uuid::Uuid;

use crate::{Result, StoreKind, bounded::bounded};

/// Upper bound on candidates carried by [`Resolution::Ambiguous`].
pub const DEFAULT_CANDIDATE_CAP: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  Unique(Patient),
  NotFound,
  Ambiguous(Vec<Patient>),
}

impl Resolution {
  /// Short label for logs and telemetry.
  pub fn outcome(&self) -> &'static str {
    match self {
      Self::Unique(_) => "unique",
      Self::NotFound => "not_found",
      Self::Ambiguous(_) => "ambiguous",
    }
  }
}

pub struct PatientResolver<R> {
  records:       Arc<R>,
  timeout:       Duration,
  candidate_cap: usize,
}

impl<R: RecordStore> PatientResolver<R> {
  pub fn new(records: Arc<R>, timeout: Duration) -> Self {
    Self { records, timeout, candidate_cap: DEFAULT_CANDIDATE_CAP }
  }

  pub fn with_candidate_cap(mut self, cap: usize) -> Self {
    self.candidate_cap = cap.max(1);
    self
  }

  /// Resolve `token` to zero, one, or several patients.
  ///
  /// A blank token is `NotFound` without touching the store.
  pub async fn resolve(&self, token: &str) -> Result<Resolution> {
    let token = token.trim();
    if token.is_empty() {
      return Ok(Resolution::NotFound);
    }

    if let Ok(id) = Uuid::parse_str(token) {
      let hit = bounded(
        StoreKind::Records,
        self.timeout,
        self.records.patient_by_id(id),
      )
      .await?;
      if let Some(patient) = hit {
        tracing::debug!(tier = "internal_id", "patient token resolved");
        return Ok(Resolution::Unique(patient));
      }
    }

    let hit = bounded(
      StoreKind::Records,
      self.timeout,
      self.records.patient_by_external_id(token),
    )
    .await?;
    if let Some(patient) = hit {
      tracing::debug!(tier = "external_id", "patient token resolved");
      return Ok(Resolution::Unique(patient));
    }

    // One extra row tells "exactly cap matches" apart from "more than cap".
    let mut hits = bounded(
      StoreKind::Records,
      self.timeout,
      self.records.patients_by_name(token, self.candidate_cap + 1),
    )
    .await?;

    Ok(match hits.len() {
      0 => Resolution::NotFound,
      1 => {
        tracing::debug!(tier = "name", "patient token resolved");
        Resolution::Unique(hits.remove(0))
      }
      _ => {
        hits.truncate(self.candidate_cap);
        Resolution::Ambiguous(hits)
      }
    })
  }
}
