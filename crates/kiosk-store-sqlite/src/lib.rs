//! SQLite backends for the kiosk stores.
//!
//! [`SqliteRecordStore`] holds the relational records (patients, doctors,
//! departments, appointments). [`SqliteSessionStore`] keeps chat sessions and
//! messages as JSON documents. The two open separate database files and share
//! nothing, so either can fail without the other noticing.
//!
//! Both wrap [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime.

mod documents;
mod encode;
mod records;
mod schema;

pub mod error;

use std::time::Duration;

pub use documents::SqliteSessionStore;
pub use error::{Error, Result};
pub use records::SqliteRecordStore;

/// How long SQLite waits on a locked database before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(3);
