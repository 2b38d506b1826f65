//! Error types for `kiosk-chat`.

use std::{fmt, time::Duration};

use kiosk_core::session::SessionId;
use thiserror::Error;

/// Which collaborator a store failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
  Records,
  Sessions,
}

impl fmt::Display for StoreKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Records => "record",
      Self::Sessions => "session",
    })
  }
}

#[derive(Debug, Error)]
pub enum Error {
  /// Rejected before any store access.
  #[error("invalid input: {0}")]
  Validation(String),

  #[error("session not found: {0}")]
  SessionNotFound(SessionId),

  #[error("session {0} has already ended")]
  SessionEnded(SessionId),

  #[error("{store} store timed out after {after:?}")]
  Timeout { store: StoreKind, after: Duration },

  #[error("{0} store error: {1}")]
  Store(StoreKind, #[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Whether the caller may reasonably try the same request again. The
  /// engine itself never retries.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Timeout { .. } | Self::Store(..))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
