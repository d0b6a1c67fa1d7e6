//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
  routing::{get, post},
  Router,
};
use tower_http::{
  cors::{Any, CorsLayer},
  services::{ServeDir, ServeFile},
  trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - chat endpoints the browser client calls directly (`/api/chat`, `/respond`, `/api/coach`)
/// - form endpoints (`/lead`, `/student`)
/// - placement and intake under `/api/v1/...`
/// - static SPA from `static_dir` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>, static_dir: &str) -> Router {
  let static_service = ServeDir::new(static_dir)
    .append_index_html_on_directories(true)
    .not_found_service(ServeFile::new(format!("{}/index.html", static_dir.trim_end_matches('/'))));

  Router::new()
    // WebSocket
    .route("/ws", get(ws::ws_upgrade))
    // Health
    .route("/health", get(http::http_health))
    .route("/api/v1/health", get(http::http_health))
    // Chat relay
    .route("/api/chat", post(http::http_post_chat))
    .route("/respond", post(http::http_post_respond))
    .route("/api/coach", post(http::http_post_coach))
    // Form collector
    .route("/lead", post(http::http_post_lead))
    .route("/student", post(http::http_post_student))
    // Placement + intake
    .route("/api/v1/placement", post(http::http_post_placement_start))
    .route("/api/v1/placement/answer", post(http::http_post_placement_answer))
    .route("/api/v1/intake/questions", get(http::http_get_intake_questions))
    .route("/api/v1/intake", post(http::http_post_intake))
    // State + CORS + HTTP tracing
    .with_state(state)
    .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
    // Frontend fallback
    .fallback_service(static_service)
}
