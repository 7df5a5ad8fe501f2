//! Wiring for the MentorLink server binary: configuration and the
//! top-level router.

use std::path::{Path, PathBuf};

use axum::Router;
use mentorlink_api::{AppState, api_router};
use mentorlink_core::{DEFAULT_LIVE_BUFFER, store::MatchStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `MENTORLINK_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:        String,
  #[serde(default = "default_port")]
  pub port:        u16,
  #[serde(default = "default_store_path")]
  pub store_path:  PathBuf,
  /// Snapshot queue depth of each live view.
  #[serde(default = "default_live_buffer")]
  pub live_buffer: usize,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/mentorlink/mentorlink.db") }

fn default_live_buffer() -> usize { DEFAULT_LIVE_BUFFER }

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The full application: the JSON API under `/api`, with request tracing.
pub fn app<S>(store: S, config: &ServerConfig) -> Router
where
  S: MatchStore + Clone + 'static,
{
  Router::new()
    .nest("/api", api_router(AppState::new(store, config.live_buffer)))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use config::{Config, File, FileFormat};
  use mentorlink_core::memory::MemoryStore;
  use tower::ServiceExt as _;

  use super::*;

  fn parse(toml: &str) -> ServerConfig {
    Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn missing_keys_take_defaults() {
    let cfg = parse("port = 9000");
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.live_buffer, DEFAULT_LIVE_BUFFER);
    assert_eq!(cfg.address(), "127.0.0.1:9000");
  }

  #[test]
  fn tilde_is_expanded_against_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    let expanded = expand_tilde(Path::new("~/data/ml.db"));
    assert_eq!(expanded, PathBuf::from(home).join("data/ml.db"));
    assert_eq!(expand_tilde(Path::new("/srv/ml.db")), PathBuf::from("/srv/ml.db"));
  }

  #[tokio::test]
  async fn api_is_nested_under_prefix() {
    let cfg = parse("live_buffer = 4");
    let app = app(MemoryStore::new(), &cfg);

    let req = Request::builder()
      .uri("/api/mentors")
      .header("x-user-id", "m1")
      .body(Body::empty())
      .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder().uri("/mentors").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }
}
