//! [`SqliteSessionStore`]: chat sessions and messages as JSON documents.
//!
//! Each session is one row holding its whole document. Patches are applied
//! with a single `UPDATE ... SET doc = json_set(...)` whose `WHERE` clause
//! requires the document to still be active, so a status change and a
//! concurrent write to the same session can never interleave.

use std::{path::Path, time::Duration};

use kiosk_core::{
  session::{ChatMessage, ChatSession, SessionId, SessionPatch},
  store::SessionStore,
};
use rusqlite::OptionalExtension as _;

use crate::{
  DEFAULT_BUSY_TIMEOUT, Error, Result,
  encode::{encode_dt, encode_uuid, patch_assignments},
  schema::SESSIONS_SCHEMA,
};

#[derive(Clone)]
pub struct SqliteSessionStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteSessionStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT).await
  }

  pub async fn open_with_timeout(
    path: impl AsRef<Path>,
    busy_timeout: Duration,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema(busy_timeout).await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema(DEFAULT_BUSY_TIMEOUT).await?;
    Ok(store)
  }

  async fn init_schema(&self, busy_timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SESSIONS_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── SessionStore impl ───────────────────────────────────────────────────────

impl SessionStore for SqliteSessionStore {
  type Error = Error;

  async fn insert_session(&self, session: ChatSession) -> Result<()> {
    let id_str = session.session_id.to_string();
    let doc = serde_json::to_string(&session)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO chat_sessions (session_id, doc) VALUES (?1, ?2)",
          rusqlite::params![id_str, doc],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn find_session(&self, id: SessionId) -> Result<Option<ChatSession>> {
    let id_str = id.to_string();

    let doc: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT doc FROM chat_sessions WHERE session_id = ?1",
            rusqlite::params![id_str],
            |row| row.get(0),
          )
          .optional()?)
      })
      .await?;

    Ok(doc.map(|d| serde_json::from_str(&d)).transpose()?)
  }

  async fn update_active_session(&self, id: SessionId, patch: SessionPatch) -> Result<bool> {
    let assignments = patch_assignments(&patch)?;

    // ?1 is the session id; each assignment binds a path and a JSON value.
    let mut set = String::from("json_set(doc");
    let mut params: Vec<String> = vec![id.to_string()];
    for (path, value) in assignments {
      let n = params.len();
      set.push_str(&format!(", ?{}, json(?{})", n + 1, n + 2));
      params.push(path);
      params.push(value);
    }
    set.push(')');
    let sql = format!(
      "UPDATE chat_sessions SET doc = {set}
       WHERE session_id = ?1 AND json_extract(doc, '$.status') = 'active'"
    );

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?)
      })
      .await?;
    Ok(changed == 1)
  }

  async fn insert_message(&self, message: ChatMessage) -> Result<()> {
    let id_str = encode_uuid(message.message_id);
    let session_str = message.session_id.to_string();
    let at_str = encode_dt(message.timestamp);
    let doc = serde_json::to_string(&message)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO messages (message_id, session_id, timestamp, doc)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, session_str, at_str, doc],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn messages(&self, session_id: SessionId) -> Result<Vec<ChatMessage>> {
    let session_str = session_id.to_string();

    let docs: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT doc FROM messages WHERE session_id = ?1
           ORDER BY timestamp, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![session_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    docs
      .iter()
      .map(|d| serde_json::from_str(d).map_err(Error::from))
      .collect()
  }
}
