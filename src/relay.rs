//! Chat relay: a minimal client for OpenAI-compatible chat.completions
//! endpoints (Groq by default, OpenAI selectable).
//!
//! One POST per call, no retry or backoff, and only the HTTP client's default
//! timeouts. `get_reply` never fails: upstream problems are logged and
//! replaced by a static fallback text.
//!
//! NOTE: We never log the API key; message contents are logged as sizes only.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::config::{env_non_empty, Prompts};
use crate::domain::{ChatMessage, ChatRole};
use crate::persona::{build_system_prompt, Persona, StudentProfile};

pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
const TEMPERATURE: f32 = 0.8;
const MAX_TOKENS: u32 = 400;

/// Which hosted provider the relay talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Provider {
  #[default]
  Groq,
  OpenAi,
}

impl Provider {
  /// `LLM_PROVIDER` = "groq" (default) | "openai".
  pub fn from_env() -> Self {
    match env_non_empty("LLM_PROVIDER").map(|v| v.to_lowercase()).as_deref() {
      Some("openai") => Provider::OpenAi,
      Some("groq") | None => Provider::Groq,
      Some(other) => {
        warn!(target: "relay", provider = %other, "Unknown LLM_PROVIDER; using groq");
        Provider::Groq
      }
    }
  }

  pub fn default_base_url(self) -> &'static str {
    match self {
      Provider::Groq => "https://api.groq.com/openai/v1",
      Provider::OpenAi => "https://api.openai.com/v1",
    }
  }

  pub fn key_var(self) -> &'static str {
    match self {
      Provider::Groq => "GROQ_API_KEY",
      Provider::OpenAi => "OPENAI_API_KEY",
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Provider::Groq => "groq",
      Provider::OpenAi => "openai",
    }
  }
}

#[derive(Clone)]
pub struct RelayClient {
  client: reqwest::Client,
  api_key: String,
  pub provider: Provider,
  pub base_url: String,
  pub model: String,
}

/// Text handed back to the caller; `ok == false` means a static text replaced the model reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Reply {
  pub ok: bool,
  pub text: String,
}

impl RelayClient {
  pub fn new(provider: Provider, base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      api_key: api_key.into(),
      provider,
      base_url: base_url.into().trim_end_matches('/').to_string(),
      model: model.into(),
    }
  }

  /// Build from the environment. Errors (with a descriptive message) when the
  /// credential is missing.
  ///
  /// Model precedence: `RELAY_MODEL`, then the persona's default model, then `DEFAULT_MODEL`.
  pub fn from_env(persona_model: Option<&str>) -> Result<Self, String> {
    let provider = Provider::from_env();
    let api_key = env_non_empty("RELAY_API_KEY")
      .or_else(|| env_non_empty(provider.key_var()))
      .ok_or_else(|| format!("{} is not set; the chat relay is disabled", provider.key_var()))?;
    let base_url = env_non_empty("RELAY_BASE_URL").unwrap_or_else(|| provider.default_base_url().to_string());
    let model = env_non_empty("RELAY_MODEL")
      .or_else(|| persona_model.map(str::to_string))
      .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    Ok(Self::new(provider, base_url, api_key, model))
  }

  /// One chat completion. `Ok(None)` when the provider answered without a
  /// `choices[0].message.content`.
  #[instrument(level = "info", skip(self, messages), fields(model = %self.model, provider = self.provider.name(), messages = messages.len()))]
  pub async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: &self.model,
      messages,
      temperature: TEMPERATURE,
      max_tokens: Some(MAX_TOKENS),
    };

    let start = std::time::Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "mastrius-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_provider_error(&body).unwrap_or(body);
      return Err(format!("{} HTTP {}: {}", self.provider.name(), status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| format!("malformed provider response: {e}"))?;
    if let Some(usage) = &body.usage {
      info!(target: "relay", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "Provider usage");
    }
    let text = body
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message)
      .and_then(|m| m.content)
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty());
    info!(target: "relay", elapsed = ?start.elapsed(), reply_len = text.as_ref().map(|t| t.len()).unwrap_or(0), "Provider reply received");
    Ok(text)
  }

  /// Persona-driven reply for a chat history (oldest first, newest user turn last).
  ///
  /// System entries in `history` are appended to the persona prompt as extra
  /// directives. Failures come back as `Reply { ok: false, .. }` with a static text.
  #[instrument(level = "info", skip_all, fields(history = history.len(), level = %profile.level_hint()))]
  pub async fn get_reply(
    &self,
    persona: &Persona,
    profile: &StudentProfile,
    history: &[ChatMessage],
    prompts: &Prompts,
  ) -> Reply {
    let mut system = build_system_prompt(persona, profile);
    for m in history.iter().filter(|m| m.role == ChatRole::System) {
      system.push_str("\n\n");
      system.push_str(m.content.trim());
    }

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::new(ChatRole::System, system));
    messages.extend(history.iter().filter(|m| m.role != ChatRole::System).cloned());

    match self.complete(&messages).await {
      Ok(Some(text)) => Reply { ok: true, text },
      Ok(None) => {
        warn!(target: "relay", "Provider reply had no content; sending no-reply text");
        Reply { ok: false, text: prompts.no_reply.clone() }
      }
      Err(e) => {
        error!(target: "relay", error = %e, "Relay call failed; sending fallback text");
        Reply { ok: false, text: prompts.fallback_reply.clone() }
      }
    }
  }

  /// Single-turn helper for short system-directed replies (intake, answer feedback).
  #[instrument(level = "info", skip(self, system, user), fields(user_len = user.len()))]
  pub async fn quick_reply(&self, system: &str, user: &str) -> Result<String, String> {
    let messages = [ChatMessage::new(ChatRole::System, system), ChatMessage::user(user)];
    self.complete(&messages).await?.ok_or_else(|| "empty provider reply".to_string())
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
  model: &'a str,
  messages: &'a [ChatMessage],
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)]
  choices: Vec<ChatChoice>,
  #[serde(default)]
  usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice {
  #[serde(default)]
  message: Option<ChatMessageResp>,
}
#[derive(Deserialize)]
struct ChatMessageResp {
  #[serde(default)]
  content: Option<String>,
}
#[derive(Deserialize)]
struct Usage {
  #[serde(default)]
  prompt_tokens: Option<u32>,
  #[serde(default)]
  completion_tokens: Option<u32>,
  #[serde(default)]
  total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_provider_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::http::StatusCode;
  use serde_json::json;

  use crate::seeds::seed_persona;
  use crate::test_support::MockUpstream;

  fn relay(base_url: &str) -> RelayClient {
    RelayClient::new(Provider::Groq, base_url, "test-key", "test-model")
  }

  fn completion(text: &str) -> serde_json::Value {
    json!({ "choices": [ { "message": { "role": "assistant", "content": text } } ] })
  }

  #[tokio::test]
  async fn reply_carries_persona_prompt_and_history() {
    let upstream = MockUpstream::spawn(StatusCode::OK, completion("  Great job!  ").to_string()).await;
    let history = vec![
      ChatMessage::new(ChatRole::System, "Answer in English."),
      ChatMessage::new(ChatRole::Assistant, "Welcome!"),
      ChatMessage::user("I go to work yesterday"),
    ];
    let reply = relay(&upstream.base_url)
      .get_reply(&seed_persona().unwrap(), &StudentProfile::with_level(Some("B1".into())), &history, &Prompts::default())
      .await;
    assert_eq!(reply, Reply { ok: true, text: "Great job!".into() });

    let sent = upstream.last_request().expect("request captured");
    let msgs = sent["messages"].as_array().unwrap();
    assert_eq!(msgs.len(), 3);
    assert_eq!(msgs[0]["role"], "system");
    let system = msgs[0]["content"].as_str().unwrap();
    assert!(system.contains("Level: B1"));
    assert!(system.ends_with("Answer in English."));
    assert_eq!(msgs[2]["content"], "I go to work yesterday");
    assert_eq!(sent["model"], "test-model");
    assert_eq!(upstream.auth_header().as_deref(), Some("Bearer test-key"));
  }

  #[tokio::test]
  async fn upstream_500_yields_fallback() {
    let upstream =
      MockUpstream::spawn(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": {"message": "boom"}}).to_string()).await;
    let prompts = Prompts::default();
    let reply = relay(&upstream.base_url)
      .get_reply(&seed_persona().unwrap(), &StudentProfile::default(), &[ChatMessage::user("hi")], &prompts)
      .await;
    assert!(!reply.ok);
    assert_eq!(reply.text, prompts.fallback_reply);
    assert_eq!(upstream.hits(), 1);
  }

  #[tokio::test]
  async fn missing_content_yields_no_reply_sentinel() {
    let upstream = MockUpstream::spawn(StatusCode::OK, json!({ "choices": [] }).to_string()).await;
    let prompts = Prompts::default();
    let reply = relay(&upstream.base_url)
      .get_reply(&seed_persona().unwrap(), &StudentProfile::default(), &[ChatMessage::user("hi")], &prompts)
      .await;
    assert_eq!(reply, Reply { ok: false, text: prompts.no_reply.clone() });
  }

  #[tokio::test]
  async fn non_json_body_is_an_upstream_error() {
    let upstream = MockUpstream::spawn(StatusCode::OK, "<html>gateway</html>".into()).await;
    let err = relay(&upstream.base_url).complete(&[ChatMessage::user("hi")]).await.unwrap_err();
    assert!(err.contains("malformed"));
  }

  #[tokio::test]
  async fn provider_error_message_is_extracted() {
    let upstream =
      MockUpstream::spawn(StatusCode::UNAUTHORIZED, json!({"error": {"message": "Invalid API Key"}}).to_string()).await;
    let err = relay(&upstream.base_url).quick_reply("sys", "hi").await.unwrap_err();
    assert!(err.contains("401"));
    assert!(err.ends_with("Invalid API Key"));
  }

  #[test]
  fn provider_defaults() {
    assert_eq!(Provider::default(), Provider::Groq);
    assert_eq!(Provider::Groq.key_var(), "GROQ_API_KEY");
    assert!(Provider::OpenAi.default_base_url().contains("openai.com"));
    let c = RelayClient::new(Provider::OpenAi, "http://x/v1/", "k", "m");
    assert_eq!(c.base_url, "http://x/v1");
  }
}
