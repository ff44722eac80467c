//! Quizcast · Live-Classroom Question Generation Backend
//!
//! - Axum HTTP + WebSocket API
//! - Multi-provider question generation with a configurable fallback chain
//! - Embedding-based context retrieval to suppress duplicate questions
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   OPENAI_API_KEY    : enables the cloud provider (and embeddings)
//!   OPENAI_BASE_URL   : default "https://api.openai.com/v1"
//!   OPENAI_MODEL      : default "gpt-4o-mini"
//!   GROQ_API_KEY      : enables the fast-inference provider
//!   GROQ_MODEL        : default "llama-3.3-70b-versatile"
//!   OLLAMA_BASE_URL   : enables the local-model provider
//!   OLLAMA_MODEL      : default "llama3.1"
//!   EMBEDDINGS_MODEL  : default "text-embedding-3-small"
//!   GEN_CONFIG_PATH   : path to TOML config (prompts + generation tunables)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod embedding;
mod store;
mod context;
mod validator;
mod providers;
mod orchestrator;
mod notify;
mod state;
mod protocol;
mod routes;

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Load config and wire every component explicitly at startup.
  let config = AppConfig::load();
  let state = AppState::from_config(config)?;

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state);

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "quizcast_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
