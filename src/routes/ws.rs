//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::logic::*;
use crate::protocol::{ClientWsMessage, PlacementAnswerIn, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "mastrius_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "mastrius_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "mastrius_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "mastrius_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => {
        let _ = socket.send(Message::Pong(payload)).await;
      }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "mastrius_backend", "WebSocket disconnected");
}

/// Same operations as the HTTP API; errors become `ServerWsMessage::Error`.
#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  let result = match msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,

    ClientWsMessage::StartPlacement { policy } => start_placement(state, policy)
      .await
      .map(|placement| ServerWsMessage::PlacementStarted { placement }),

    ClientWsMessage::PlacementAnswer { session_id, question_id, answer } => {
      answer_placement(state, PlacementAnswerIn { session_id, question_id, answer })
        .await
        .map(|outcome| ServerWsMessage::PlacementAnswer { outcome })
    }

    ClientWsMessage::Chat { messages, level } => chat_reply(state, messages, level, None)
      .await
      .map(|r| ServerWsMessage::ChatReply { ok: r.ok, text: r.text }),

    ClientWsMessage::IntakeReply { key, text } => intake_reply(state, &key, &text)
      .await
      .map(|text| ServerWsMessage::IntakeReply { key, text }),
  };
  result.unwrap_or_else(|e| ServerWsMessage::Error { message: e.to_string() })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::{json, Value};

  use crate::config::AgentConfig;
  use crate::seeds::{seed_bank, seed_persona};

  fn state() -> AppState {
    AppState::new(AgentConfig::default(), seed_bank().unwrap(), seed_persona().unwrap(), Err("no key".into()))
  }

  async fn roundtrip(st: &AppState, msg: Value) -> Value {
    let incoming: ClientWsMessage = serde_json::from_value(msg).unwrap();
    serde_json::to_value(handle_client_ws(incoming, st).await).unwrap()
  }

  #[tokio::test]
  async fn ping_and_placement_start() {
    let st = state();
    assert_eq!(roundtrip(&st, json!({ "type": "ping" })).await, json!({ "type": "pong" }));

    let out = roundtrip(&st, json!({ "type": "start_placement", "policy": "template" })).await;
    assert_eq!(out["type"], "placement_started");
    assert_eq!(out["placement"]["index"], 1);
    // Template step 1 is A2.
    assert_eq!(out["placement"]["question"]["level"], "A2");
  }

  #[tokio::test]
  async fn errors_come_back_as_error_messages() {
    let st = state();
    let out = roundtrip(&st, json!({ "type": "chat", "messages": [ { "role": "user", "content": "hi" } ] })).await;
    assert_eq!(out["type"], "error");
    assert!(out["message"].as_str().unwrap().contains("configuration"));

    let out = roundtrip(
      &st,
      json!({ "type": "placement_answer", "sessionId": "nope", "questionId": "a1-01", "answer": 1 }),
    )
    .await;
    assert_eq!(out["type"], "error");
  }
}
