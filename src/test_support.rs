//! Test helpers: an in-process fake chat-completions / form-collector server.

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc, Mutex,
};

use axum::{
  body::Bytes,
  http::{header, HeaderMap, StatusCode},
  routing::post,
  Router,
};
use tokio::net::TcpListener;

#[derive(Default)]
struct Captured {
  bodies: Vec<serde_json::Value>,
  auth: Option<String>,
}

/// Answers every POST with a fixed status and body and records what it got.
pub struct MockUpstream {
  pub base_url: String,
  hits: Arc<AtomicUsize>,
  captured: Arc<Mutex<Captured>>,
}

impl MockUpstream {
  pub async fn spawn(status: StatusCode, body: String) -> Self {
    let hits = Arc::new(AtomicUsize::new(0));
    let captured = Arc::new(Mutex::new(Captured::default()));

    let h = hits.clone();
    let c = captured.clone();
    let handler = move |headers: HeaderMap, req: Bytes| {
      let h = h.clone();
      let c = c.clone();
      let body = body.clone();
      async move {
        h.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut cap) = c.lock() {
          cap.bodies.push(serde_json::from_slice(&req).unwrap_or(serde_json::Value::Null));
          cap.auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        }
        (status, [(header::CONTENT_TYPE, "application/json")], body)
      }
    };

    let app = Router::new()
      .route("/chat/completions", post(handler.clone()))
      .route("/collect", post(handler));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock upstream");
    let addr = listener.local_addr().expect("mock upstream addr");
    tokio::spawn(async move {
      let _ = axum::serve(listener, app).await;
    });

    Self { base_url: format!("http://{}", addr), hits, captured }
  }

  pub fn collect_url(&self) -> String {
    format!("{}/collect", self.base_url)
  }

  pub fn hits(&self) -> usize {
    self.hits.load(Ordering::SeqCst)
  }

  pub fn last_request(&self) -> Option<serde_json::Value> {
    self.captured.lock().ok()?.bodies.last().cloned()
  }

  pub fn auth_header(&self) -> Option<String> {
    self.captured.lock().ok()?.auth.clone()
  }

  /// Wait (briefly) until `n` requests arrived; for detached dispatches.
  pub async fn wait_for_hits(&self, n: usize) -> bool {
    for _ in 0..100 {
      if self.hits() >= n {
        return true;
      }
      tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
  }
}
