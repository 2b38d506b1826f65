//! JSON HTTP surface for the hospital kiosk.
//!
//! Exposes an axum [`Router`] over a [`Conversation`] backed by any pair of
//! [`RecordStore`] and [`SessionStore`] implementations. Auth and TLS are the
//! deployment's responsibility.

pub mod appointments;
pub mod chat;
pub mod error;
pub mod seed;

use std::{num::NonZeroUsize, path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Json, Router,
  routing::{get, patch, post},
};
use kiosk_chat::{
  ChatSettings, Conversation, KeywordRules, ReplyContent, StoreTimeouts,
};
use kiosk_core::store::{RecordStore, SessionStore};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `KIOSK_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  /// Mount point of the JSON API. `/healthz` always sits at the root.
  pub api_prefix:         String,
  pub record_store_path:  PathBuf,
  pub session_store_path: PathBuf,
  /// Bound on every single store access, and the SQLite lock wait.
  pub store_timeout_ms:   u64,
  pub lookup_limit:       NonZeroUsize,
  pub candidate_cap:      usize,
  pub keywords:           KeywordRules,
  pub replies:            ReplyContent,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:               "127.0.0.1".into(),
      port:               8000,
      api_prefix:         "/api".into(),
      record_store_path:  PathBuf::from("kiosk-records.db"),
      session_store_path: PathBuf::from("kiosk-sessions.db"),
      store_timeout_ms:   3000,
      lookup_limit:       kiosk_chat::lookup::DEFAULT_LOOKUP_LIMIT,
      candidate_cap:      kiosk_chat::resolve::DEFAULT_CANDIDATE_CAP,
      keywords:           KeywordRules::default(),
      replies:            ReplyContent::default(),
    }
  }
}

impl ServerConfig {
  pub fn store_timeout(&self) -> Duration { Duration::from_millis(self.store_timeout_ms) }

  pub fn chat_settings(&self) -> ChatSettings {
    ChatSettings {
      timeouts:      StoreTimeouts::uniform(self.store_timeout()),
      lookup_limit:  self.lookup_limit,
      candidate_cap: self.candidate_cap,
      keywords:      self.keywords.clone(),
      replies:       self.replies.clone(),
    }
  }
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<R, D> {
  pub chat:   Arc<Conversation<R, D>>,
  pub config: Arc<ServerConfig>,
}

impl<R, D> Clone for AppState<R, D> {
  fn clone(&self) -> Self {
    Self { chat: self.chat.clone(), config: self.config.clone() }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full application router: the API under `config.api_prefix`
/// plus `/healthz`, with request tracing.
pub fn router<R, D>(state: AppState<R, D>) -> Router
where
  R: RecordStore + 'static,
  D: SessionStore + 'static,
{
  let prefix = state.config.api_prefix.trim_end_matches('/').to_owned();

  let api = Router::new()
    // Chat
    .route("/chat/sessions", post(chat::start::<R, D>))
    .route("/chat/sessions/{session_id}", get(chat::get_one::<R, D>))
    .route(
      "/chat/sessions/{session_id}/messages",
      get(chat::history::<R, D>).post(chat::add_message::<R, D>),
    )
    .route(
      "/chat/sessions/{session_id}/attach-patient",
      patch(chat::attach_patient::<R, D>),
    )
    .route("/chat/sessions/{session_id}/end", post(chat::end::<R, D>))
    // Appointments
    .route("/appointments/check", post(appointments::check::<R, D>))
    .route("/appointments/{appointment_id}", get(appointments::get_one::<R, D>))
    .with_state(state);

  let app = if prefix.is_empty() {
    Router::new().merge(api)
  } else {
    let prefix = if prefix.starts_with('/') { prefix } else { format!("/{prefix}") };
    Router::new().nest(&prefix, api)
  };

  app.route("/healthz", get(healthz)).layer(TraceLayer::new_for_http())
}

async fn healthz() -> Json<Value> { Json(json!({ "ok": true })) }

// ─── Integration tests ───────────────────────────────────────────────────────
