//! Error type for `kiosk-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] kiosk_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A column held a value outside its enumeration.
  #[error("unexpected value in {column}: {value:?}")]
  UnknownValue { column: &'static str, value: String },

  /// Context keys become JSON paths and are restricted accordingly.
  #[error("context key {0:?} may only contain ASCII letters, digits, '_' and '-'")]
  ContextKey(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
