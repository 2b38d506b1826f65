//! Per-access time bounds on store calls.

use std::{future::Future, time::Duration};

use crate::{Error, Result, StoreKind};

/// Independent time limits for the two stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreTimeouts {
  pub records:  Duration,
  pub sessions: Duration,
}

impl StoreTimeouts {
  pub fn uniform(after: Duration) -> Self {
    Self { records: after, sessions: after }
  }
}

impl Default for StoreTimeouts {
  fn default() -> Self { Self::uniform(Duration::from_secs(3)) }
}

/// Run one store access, failing fast with [`Error::Timeout`] instead of
/// waiting indefinitely.
pub(crate) async fn bounded<T, E, F>(
  store: StoreKind,
  after: Duration,
  access: F,
) -> Result<T>
where
  F: Future<Output = Result<T, E>>,
  E: std::error::Error + Send + Sync + 'static,
{
  match tokio::time::timeout(after, access).await {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(e)) => Err(Error::Store(store, Box::new(e))),
    Err(_) => {
      tracing::warn!(%store, ?after, "store access timed out");
      Err(Error::Timeout { store, after })
    }
  }
}
