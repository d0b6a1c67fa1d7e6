//! Loading agent configuration (prompts, placement settings, form collector) from TOML.
//!
//! Every section and field is optional; see `AgentConfig` for the schema.
//!
//! ```toml
//! [prompts]
//! fallback_reply = "Sorry, I had a connection problem. Please try again."
//!
//! [placement]
//! max_questions = 10
//! policy = "adaptive"        # or "template"
//! template = ["A2", "A1", "A2", "B1", "A2", "B1", "B2", "B1", "A2", "A1"]
//! feedback = true
//! session_ttl_secs = 3600
//!
//! [collector]
//! leads_url = "https://formspree.io/f/<form-id>"
//! students_url = "https://formspree.io/f/<form-id>"
//! student_passphrase = "..."
//! ```

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Level;
use crate::placement::{PlacementSession, SelectionPolicy, DEFAULT_MAX_QUESTIONS, DEFAULT_TEMPLATE};

const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub placement: PlacementConfig,
  #[serde(default)]
  pub collector: CollectorConfig,
}

/// Short directives and static texts used around relay calls.
/// Override them in TOML to tune tone or language.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  /// Appended to the persona prompt for free chat.
  pub chat_directive: String,
  /// System text for the one-sentence reaction to an intake answer.
  pub intake_system: String,
  /// System text for the one-sentence comment on a placement answer.
  pub feedback_system: String,
  pub feedback_user_template: String,
  /// Returned when the upstream call fails.
  pub fallback_reply: String,
  /// Returned when the upstream reply has no text.
  pub no_reply: String,
  pub intake_fallback: String,
  pub feedback_correct_fallback: String,
  pub feedback_incorrect_fallback: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      chat_directive: "Reply naturally, warmly and concisely in English, adjusting to the speaker's level.".into(),
      intake_system: "Give a short, empathetic, motivating reply. Portuguese. One sentence.".into(),
      feedback_system: "Give a concise, encouraging comment for a learner. Portuguese. One sentence.".into(),
      feedback_user_template: "Question: {question}\nOptions: {options}\nUser answer: {answer}\nIs correct (local check): {correct}".into(),
      fallback_reply: "Desculpe, tive um problema de conexão. Tente novamente.".into(),
      no_reply: "Sorry, I had trouble responding.".into(),
      intake_fallback: "Obrigado por compartilhar! Vamos transformar isso em progresso real.".into(),
      feedback_correct_fallback: "Boa! Resposta certa, continue assim.".into(),
      feedback_incorrect_fallback: "Quase! Cada erro é um passo no aprendizado.".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
  pub max_questions: usize,
  pub policy: SelectionPolicy,
  pub template: Vec<Level>,
  /// Ask the relay for a one-sentence comment on each answer.
  pub feedback: bool,
  /// Unanswered sessions older than this are evicted.
  pub session_ttl_secs: u64,
}

impl Default for PlacementConfig {
  fn default() -> Self {
    Self {
      max_questions: DEFAULT_MAX_QUESTIONS,
      policy: SelectionPolicy::Adaptive,
      template: DEFAULT_TEMPLATE.to_vec(),
      feedback: true,
      session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
    }
  }
}

impl PlacementConfig {
  /// Reject settings no session could be built from (checked once at startup).
  pub fn validate(&self) -> Result<(), String> {
    PlacementSession::new(self.policy, self.max_questions, self.template.clone())
      .map(|_| ())
      .map_err(|e| format!("[placement] config: {e}"))
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct CollectorConfig {
  pub leads_url: Option<String>,
  pub students_url: Option<String>,
  pub student_passphrase: Option<String>,
}

impl CollectorConfig {
  /// Environment variables win over TOML values.
  pub fn apply_env(mut self) -> Self {
    if let Some(v) = env_non_empty("FORMSPREE_LEADS_URL") {
      self.leads_url = Some(v);
    }
    if let Some(v) = env_non_empty("FORMSPREE_STUDENTS_URL") {
      self.students_url = Some(v);
    }
    if let Some(v) = env_non_empty("STUDENT_PASSPHRASE") {
      self.student_passphrase = Some(v);
    }
    self
  }
}

pub fn env_non_empty(key: &str) -> Option<String> {
  std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "mastrius_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "mastrius_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "mastrius_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
