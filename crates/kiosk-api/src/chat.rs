//! Handlers for `/chat` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `POST`  | `/chat/sessions` | Body: `{"deviceId":"kiosk-07","channel":"touch"}` |
//! | `GET`   | `/chat/sessions/{sessionId}` | The session document |
//! | `POST`  | `/chat/sessions/{sessionId}/messages` | Body: `{"role":"user","text":"..."}` |
//! | `GET`   | `/chat/sessions/{sessionId}/messages` | Oldest first |
//! | `PATCH` | `/chat/sessions/{sessionId}/attach-patient` | `?patientIdOrName=` |
//! | `POST`  | `/chat/sessions/{sessionId}/end` | Idempotent |
//!
//! Session ids are parsed before any store access; a malformed id is a 400.

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, QueryRejection},
  },
};
use chrono::{DateTime, Utc};
use kiosk_chat::Exchange;
use kiosk_core::{
  session::{Channel, ChatMessage, ChatSession, Role, SessionId},
  store::{RecordStore, SessionStore},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{AppState, error::ApiError};

fn parse_id(raw: &str) -> Result<SessionId, ApiError> { Ok(raw.parse::<SessionId>()?) }

// ─── Start ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBody {
  pub device_id: String,
  #[serde(default)]
  pub channel:   Channel,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Started {
  pub session_id: SessionId,
  pub started_at: DateTime<Utc>,
}

/// `POST /chat/sessions`
pub async fn start<R, D>(
  State(state): State<AppState<R, D>>,
  body: Result<Json<StartBody>, JsonRejection>,
) -> Result<Json<Started>, ApiError>
where
  R: RecordStore + 'static,
  D: SessionStore + 'static,
{
  let Json(body) = body?;
  let session = state.chat.start_session(&body.device_id, body.channel).await?;
  Ok(Json(Started {
    session_id: session.session_id,
    started_at: session.started_at,
  }))
}

// ─── Read ────────────────────────────────────────────────────────────────────

/// `GET /chat/sessions/{sessionId}`
pub async fn get_one<R, D>(
  State(state): State<AppState<R, D>>,
  Path(session_id): Path<String>,
) -> Result<Json<ChatSession>, ApiError>
where
  R: RecordStore + 'static,
  D: SessionStore + 'static,
{
  let id = parse_id(&session_id)?;
  Ok(Json(state.chat.sessions().get(id).await?))
}

/// `GET /chat/sessions/{sessionId}/messages`
pub async fn history<R, D>(
  State(state): State<AppState<R, D>>,
  Path(session_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, ApiError>
where
  R: RecordStore + 'static,
  D: SessionStore + 'static,
{
  let id = parse_id(&session_id)?;
  Ok(Json(state.chat.history(id).await?))
}

// ─── Messages ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MessageBody {
  pub role: Role,
  pub text: String,
}

/// `POST /chat/sessions/{sessionId}/messages`
pub async fn add_message<R, D>(
  State(state): State<AppState<R, D>>,
  Path(session_id): Path<String>,
  body: Result<Json<MessageBody>, JsonRejection>,
) -> Result<Json<Exchange>, ApiError>
where
  R: RecordStore + 'static,
  D: SessionStore + 'static,
{
  let id = parse_id(&session_id)?;
  let Json(body) = body?;
  Ok(Json(state.chat.handle(id, body.role, &body.text).await?))
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AttachParams {
  #[serde(rename = "patientIdOrName")]
  pub patient_id_or_name: String,
}

/// `PATCH /chat/sessions/{sessionId}/attach-patient?patientIdOrName=...`
pub async fn attach_patient<R, D>(
  State(state): State<AppState<R, D>>,
  Path(session_id): Path<String>,
  params: Result<Query<AttachParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError>
where
  R: RecordStore + 'static,
  D: SessionStore + 'static,
{
  let id = parse_id(&session_id)?;
  let Query(params) = params?;
  state.chat.attach_patient(id, &params.patient_id_or_name).await?;
  Ok(Json(json!({ "ok": true })))
}

/// `POST /chat/sessions/{sessionId}/end`
pub async fn end<R, D>(
  State(state): State<AppState<R, D>>,
  Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
  R: RecordStore + 'static,
  D: SessionStore + 'static,
{
  let id = parse_id(&session_id)?;
  state.chat.end_session(id).await?;
  Ok(Json(json!({ "ok": true })))
}
