//! kiosk-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `KIOSK_*` environment variables, opens the record and session SQLite
//! stores, and serves the kiosk JSON API over HTTP.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use kiosk_api::{AppState, ServerConfig, seed::seed_demo};
use kiosk_chat::Conversation;
use kiosk_store_sqlite::{SqliteRecordStore, SqliteSessionStore};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Hospital kiosk chat server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Insert the demo dataset into the record store before serving.
  #[arg(long)]
  seed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("KIOSK")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let record_path = expand_tilde(&server_cfg.record_store_path);
  let session_path = expand_tilde(&server_cfg.session_store_path);
  let busy_timeout = server_cfg.store_timeout();
  ensure_parent_dir(&record_path)?;
  ensure_parent_dir(&session_path)?;

  let records = SqliteRecordStore::open_with_timeout(&record_path, busy_timeout)
    .await
    .with_context(|| format!("failed to open record store at {record_path:?}"))?;
  let sessions = SqliteSessionStore::open_with_timeout(&session_path, busy_timeout)
    .await
    .with_context(|| format!("failed to open session store at {session_path:?}"))?;

  if cli.seed {
    seed_demo(&records, chrono::Utc::now())
      .await
      .context("failed to seed demo data")?;
  }

  let chat = Conversation::new(
    Arc::new(records),
    Arc::new(sessions),
    server_cfg.chat_settings(),
  );
  let state = AppState { chat: Arc::new(chat), config: Arc::new(server_cfg.clone()) };

  let app = kiosk_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!(prefix = %server_cfg.api_prefix, "Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

/// Create the directory a store file lives in, if it has one.
fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create store directory {parent:?}"))?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn store_parent_dir_is_created() {
    let root = std::env::temp_dir().join(format!("kiosk-{}", uuid::Uuid::new_v4()));
    let store = root.join("nested/share/records.sqlite3");
    ensure_parent_dir(&store).unwrap();
    assert!(store.parent().unwrap().is_dir());
    // Existing directories and bare file names are fine.
    ensure_parent_dir(&store).unwrap();
    ensure_parent_dir(Path::new("records.sqlite3")).unwrap();
    std::fs::remove_dir_all(root).unwrap();
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/kiosk/a.db")), PathBuf::from(home).join("kiosk/a.db"));
    assert_eq!(expand_tilde(Path::new("data/a.db")), PathBuf::from("data/a.db"));
  }
}
