//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::{JsonRejection, QueryRejection},
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// A store was slow or failing; the client may retry.
  #[error("unavailable: {0}")]
  Unavailable(String),
}

impl From<kiosk_chat::Error> for ApiError {
  fn from(err: kiosk_chat::Error) -> Self {
    use kiosk_chat::Error as E;
    match err {
      E::Validation(m) => ApiError::BadRequest(m),
      E::SessionNotFound(_) => ApiError::NotFound("Session not found".into()),
      E::SessionEnded(_) => ApiError::Conflict("Session already ended".into()),
      e @ (E::Timeout { .. } | E::Store(..)) => {
        tracing::warn!(error = %e, "store failure surfaced to client");
        ApiError::Unavailable(e.to_string())
      }
    }
  }
}

impl From<kiosk_core::Error> for ApiError {
  fn from(err: kiosk_core::Error) -> Self {
    match err {
      kiosk_core::Error::InvalidSessionId(_) => {
        ApiError::BadRequest("Invalid sessionId".into())
      }
      other => ApiError::BadRequest(other.to_string()),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    ApiError::BadRequest(rejection.body_text())
  }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self {
    ApiError::BadRequest(rejection.body_text())
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
    };
    let mut response = (status, Json(json!({ "error": message }))).into_response();
    if status == StatusCode::SERVICE_UNAVAILABLE {
      response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
    }
    response
  }
}
