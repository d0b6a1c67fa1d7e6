//! Application state: question bank, persona, prompts, relay client, form
//! collector, and the per-learner placement sessions.
//!
//! Each placement run lives in its own `PlacementSession`, keyed by a random
//! session id, so concurrent learners never share tally or pointer state.

use std::{
  collections::HashMap,
  sync::Arc,
  time::{Duration, Instant},
};

use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::bank::QuestionBank;
use crate::collector::FormCollector;
use crate::config::{load_agent_config_from_env, AgentConfig, PlacementConfig, Prompts};
use crate::domain::{Question, UserAnswer};
use crate::error::AppError;
use crate::persona::Persona;
use crate::placement::{AnswerOutcome, PlacementError, PlacementResult, PlacementSession, SelectionPolicy};
use crate::relay::RelayClient;

pub struct AppState {
  pub bank: Arc<QuestionBank>,
  pub persona: Persona,
  pub prompts: Prompts,
  pub placement: PlacementConfig,
  pub collector: FormCollector,
  pub student_passphrase: Option<String>,
  /// `Err` carries the reason the relay is disabled (e.g. missing credential).
  pub relay: Result<RelayClient, String>,
  pub placements: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

/// A stored session and the last time the learner touched it.
pub struct SessionEntry {
  pub session: PlacementSession,
  pub last_seen: Instant,
}

/// A freshly started placement run.
#[derive(Debug)]
pub struct PlacementStart {
  pub session_id: String,
  pub total: usize,
  pub question: Question,
}

/// What follows an answer: another question, or the final estimate.
#[derive(Debug)]
pub enum PlacementStep {
  Next(Question),
  Done(PlacementResult),
}

/// A graded answer together with the question it answered.
#[derive(Debug)]
pub struct AnsweredStep {
  pub question: Question,
  pub outcome: AnswerOutcome,
  pub step: PlacementStep,
}

impl AppState {
  /// Build state from env: TOML config, bank, persona, relay credential.
  ///
  /// A configured-but-unusable bank or persona file, or an invalid
  /// `[placement]` section, is fatal. A missing relay credential is not:
  /// relay-backed endpoints answer with a configuration error.
  #[instrument(level = "info", skip_all)]
  pub fn from_env() -> Result<Self, String> {
    let cfg = load_agent_config_from_env().unwrap_or_default();
    cfg.placement.validate()?;
    let bank = QuestionBank::from_env()?;
    let persona = Persona::from_env()?;
    let relay = RelayClient::from_env(persona.identity.default_model.as_deref());
    Ok(Self::new(cfg, bank, persona, relay))
  }

  pub fn new(cfg: AgentConfig, bank: QuestionBank, persona: Persona, relay: Result<RelayClient, String>) -> Self {
    let collector_cfg = cfg.collector.apply_env();

    match &relay {
      Ok(r) => info!(target: "mastrius_backend", provider = r.provider.name(), base_url = %r.base_url, model = %r.model, "Chat relay enabled."),
      Err(reason) => warn!(target: "mastrius_backend", %reason, "Chat relay disabled; chat endpoints will report a configuration error."),
    }
    if collector_cfg.leads_url.is_none() {
      warn!(target: "mastrius_backend", "FORMSPREE_LEADS_URL not set; /lead will report a configuration error.");
    }
    info!(
      target: "placement",
      questions = bank.len(),
      max_questions = cfg.placement.max_questions,
      policy = ?cfg.placement.policy,
      "Placement configured"
    );

    Self {
      bank: Arc::new(bank),
      persona,
      prompts: cfg.prompts,
      placement: cfg.placement,
      collector: FormCollector::new(&collector_cfg),
      student_passphrase: collector_cfg.student_passphrase,
      relay,
      placements: Arc::new(RwLock::new(HashMap::new())),
    }
  }

  /// The relay, or the configuration error explaining why there is none.
  pub fn relay(&self) -> Result<&RelayClient, AppError> {
    self.relay.as_ref().map_err(|reason| AppError::Configuration(reason.clone()))
  }

  /// Create a session, draw its first question, and register it.
  #[instrument(level = "info", skip(self))]
  pub async fn start_placement(&self, policy: Option<SelectionPolicy>) -> Result<PlacementStart, AppError> {
    let policy = policy.unwrap_or(self.placement.policy);
    let mut session = PlacementSession::new(policy, self.placement.max_questions, self.placement.template.clone())
      .map_err(|e| AppError::Configuration(e.to_string()))?;

    let mut rng = StdRng::from_entropy();
    let question = session.next_question(&self.bank, &mut rng).map_err(placement_error)?;

    let session_id = Uuid::new_v4().to_string();
    let total = session.total();
    let mut sessions = self.placements.write().await;
    evict_idle(&mut sessions, self.session_ttl());
    sessions.insert(session_id.clone(), SessionEntry { session, last_seen: Instant::now() });
    info!(target: "placement", %session_id, ?policy, first = %question.id, active = sessions.len(), "Placement started");
    Ok(PlacementStart { session_id, total, question })
  }

  /// Grade an answer, then either draw the next question or finish the
  /// session. Finished (or aborted) sessions are dropped from the store.
  #[instrument(level = "info", skip(self, answer), fields(%session_id, %question_id))]
  pub async fn answer_placement(
    &self,
    session_id: &str,
    question_id: &str,
    answer: &UserAnswer,
  ) -> Result<AnsweredStep, AppError> {
    let mut sessions = self.placements.write().await;
    let ttl = self.session_ttl();
    if sessions.get(session_id).is_some_and(|e| e.last_seen.elapsed() >= ttl) {
      sessions.remove(session_id);
      info!(target: "placement", %session_id, "Idle placement session expired");
    }
    let entry = sessions
      .get_mut(session_id)
      .ok_or_else(|| AppError::NotFound(format!("placement session '{}'", session_id)))?;
    entry.last_seen = Instant::now();
    let session = &mut entry.session;

    let question = session
      .pending()
      .cloned()
      .ok_or_else(|| AppError::Validation("no question is pending for this session".into()))?;
    let outcome = session.submit_answer(question_id, answer).map_err(placement_error)?;

    let step = if session.is_complete() {
      PlacementStep::Done(session.finalize())
    } else {
      let mut rng = StdRng::from_entropy();
      match session.next_question(&self.bank, &mut rng) {
        Ok(q) => PlacementStep::Next(q),
        Err(PlacementError::ExhaustedPool(level)) => {
          warn!(target: "placement", %session_id, %level, answered = session.answered(), "Pool exhausted; ending test early");
          PlacementStep::Done(session.finalize())
        }
        Err(e) => {
          sessions.remove(session_id);
          return Err(placement_error(e));
        }
      }
    };

    if let PlacementStep::Done(result) = &step {
      info!(target: "placement", %session_id, level = %result.level, answered = result.answered, ended_early = result.ended_early, "Placement finished");
      sessions.remove(session_id);
    }
    Ok(AnsweredStep { question, outcome, step })
  }

  fn session_ttl(&self) -> Duration {
    Duration::from_secs(self.placement.session_ttl_secs)
  }

  #[cfg(test)]
  pub async fn active_placements(&self) -> usize {
    self.placements.read().await.len()
  }
}

/// Drop sessions nobody has touched for `ttl`.
fn evict_idle(sessions: &mut HashMap<String, SessionEntry>, ttl: Duration) {
  let before = sessions.len();
  sessions.retain(|_, e| e.last_seen.elapsed() < ttl);
  let evicted = before - sessions.len();
  if evicted > 0 {
    info!(target: "placement", evicted, remaining = sessions.len(), "Evicted idle placement sessions");
  }
}

/// Exhaustion on a fresh session means the pool is empty, i.e. misconfigured.
fn placement_error(e: PlacementError) -> AppError {
  match e {
    PlacementError::MissingPool(_) | PlacementError::InvalidSetup(_) | PlacementError::ExhaustedPool(_) => {
      AppError::Configuration(e.to_string())
    }
    PlacementError::UnknownQuestion(_) | PlacementError::BlankAnswer | PlacementError::Finished => {
      AppError::Validation(e.to_string())
    }
  }
}
