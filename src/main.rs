//! Mastrius · English placement & coach backend
//!
//! - Axum HTTP + WebSocket API
//! - Adaptive CEFR placement test (one session per learner)
//! - Chat relay to an OpenAI-compatible provider (Groq by default)
//! - Lead / student records forwarded to a form collector
//! - Static SPA fallback (STATIC_DIR, default ./public)
//!
//! Important env variables:
//!   PORT                   : u16 (default 3000)
//!   LLM_PROVIDER           : "groq" (default) or "openai"
//!   GROQ_API_KEY / OPENAI_API_KEY : relay credential (RELAY_API_KEY overrides both)
//!   RELAY_BASE_URL         : provider base URL override
//!   RELAY_MODEL            : model override (else persona default, else llama-3.1-8b-instant)
//!   FORMSPREE_LEADS_URL    : collector form for leads
//!   FORMSPREE_STUDENTS_URL : collector form for student logins and chat telemetry
//!   STUDENT_PASSPHRASE     : required passphrase for /student (optional)
//!   QUESTION_BANK_PATH     : JSON question bank (else the built-in bank)
//!   PERSONA_PATH           : JSON persona (else the built-in persona)
//!   AGENT_CONFIG_PATH      : path to TOML config (prompts, placement, collector)
//!   STATIC_DIR             : front-end directory (default ./public)
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

mod bank;
mod collector;
mod config;
mod domain;
mod error;
mod logic;
mod persona;
mod placement;
mod protocol;
mod relay;
mod routes;
mod seeds;
mod state;
mod telemetry;
mod util;

#[cfg(test)]
mod test_support;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Bank and persona problems are fatal; a missing relay credential is not.
  let state = match AppState::from_env() {
    Ok(s) => Arc::new(s),
    Err(e) => {
      error!(target: "mastrius_backend", error = %e, "Startup failed");
      return Err(e.into());
    }
  };

  let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./public".into());
  let app = build_router(state.clone(), &static_dir);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "mastrius_backend", %addr, %static_dir, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
