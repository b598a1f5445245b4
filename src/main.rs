//! EvoCode · Coding Practice Backend
//!
//! - Axum HTTP + WebSocket API around per-user practice sessions
//! - Text generation through OpenAI or Gemini (via environment variables)
//! - Submission records to memory, a JSONL file, or an HTTP endpoint
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : enables OpenAI chat completions if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_MODEL        : default "gpt-4o-mini"
//!   GEMINI_API_KEY      : enables Gemini when no OpenAI key is set
//!   GEMINI_MODEL        : default "gemini-1.5-flash"
//!   GEMINI_BASE_URL     : default "https://generativelanguage.googleapis.com/v1beta"
//!   SUBMISSIONS_PATH    : append submission records to this JSONL file
//!   SUBMISSIONS_URL     : POST submission records to this endpoint
//!   EVOCODE_CONFIG_PATH : path to TOML config (prompts, model, session TTL)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod error;
mod markdown;
mod report;
mod prompt;
mod llm;
mod sink;
mod session;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: session registry, model client, submission sink, prompts.
  let state = Arc::new(AppState::new());
  // Sweeps abandoned HTTP sessions; stops when the state is dropped.
  let _reaper = state.spawn_reaper();

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "evocode_backend", %addr, model = state.model.name(), sink = state.sink.name(), "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "evocode_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "evocode_backend", error = %e, "Failed to listen for ctrl-c; running until killed");
    std::future::pending::<()>().await;
  }
  info!(target: "evocode_backend", "Shutdown signal received");
}
