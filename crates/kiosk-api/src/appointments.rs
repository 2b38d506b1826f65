//! Staff-facing appointment reads.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/appointments/check` | Body: `{"patientIdOrName":"..."}`; `?limit=&offset=&upcoming_only=` |
//! | `GET`  | `/appointments/{appointmentId}` | 404 if missing |
//!
//! The check resolves the token with the same tiers the chat engine uses, then pages
//! through the patient's appointments latest first. A token that matches
//! nobody or several patients returns no items; the `match` field says which.

use std::num::NonZeroUsize;

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, QueryRejection},
  },
};
use kiosk_chat::Resolution;
use kiosk_core::{
  record::AppointmentView,
  store::{RecordStore, SessionStore},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

const MAX_PAGE: usize = 200;

#[derive(Debug, Deserialize)]
pub struct CheckBody {
  #[serde(rename = "patientIdOrName", default)]
  pub patient_id_or_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckParams {
  #[serde(default = "default_limit")]
  pub limit:         usize,
  #[serde(default)]
  pub offset:        usize,
  #[serde(default)]
  pub upcoming_only: bool,
}

fn default_limit() -> usize { 20 }

#[derive(Debug, Serialize)]
pub struct CheckResponse {
  #[serde(rename = "match")]
  pub outcome: &'static str,
  pub items:   Vec<AppointmentView>,
}

/// `POST /appointments/check?limit=&offset=&upcoming_only=`
pub async fn check<R, D>(
  State(state): State<AppState<R, D>>,
  params: Result<Query<CheckParams>, QueryRejection>,
  body: Result<Json<CheckBody>, JsonRejection>,
) -> Result<Json<CheckResponse>, ApiError>
where
  R: RecordStore + 'static,
  D: SessionStore + 'static,
{
  let Query(params) = params?;
  let Json(body) = body?;

  let limit = NonZeroUsize::new(params.limit)
    .filter(|n| n.get() <= MAX_PAGE)
    .ok_or_else(|| ApiError::BadRequest(format!("limit must be 1 to {MAX_PAGE}")))?;

  let resolution = state.chat.resolver().resolve(&body.patient_id_or_name).await?;
  let outcome = resolution.outcome();
  tracing::info!(outcome, "appointment check");

  let items = match resolution {
    Resolution::Unique(patient) => {
      let since = params.upcoming_only.then(|| state.chat.now());
      state
        .chat
        .lookup()
        .history_for(&patient, since, limit, params.offset)
        .await?
    }
    Resolution::NotFound | Resolution::Ambiguous(_) => Vec::new(),
  };

  Ok(Json(CheckResponse { outcome, items }))
}

/// `GET /appointments/{appointmentId}`
pub async fn get_one<R, D>(
  State(state): State<AppState<R, D>>,
  Path(appointment_id): Path<String>,
) -> Result<Json<AppointmentView>, ApiError>
where
  R: RecordStore + 'static,
  D: SessionStore + 'static,
{
  let id = Uuid::parse_str(&appointment_id)
    .map_err(|_| ApiError::BadRequest("Invalid appointmentId".into()))?;
  state
    .chat
    .lookup()
    .by_id(id)
    .await?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound("Appointment not found".into()))
}
