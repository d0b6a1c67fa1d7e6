//! Static question bank: CEFR level -> pool of questions.
//!
//! Loaded once at startup (from `QUESTION_BANK_PATH` or the built-in seeds)
//! and shared read-only by every placement session.

use std::collections::{HashMap, HashSet};

use tracing::{info, instrument, warn};

use crate::domain::{AnswerKey, Level, Question, QuestionKind};
use crate::seeds::seed_bank;

#[derive(Clone, Debug, Default)]
pub struct QuestionBank {
  pools: HashMap<Level, Vec<Question>>,
}

impl QuestionBank {
  /// Parse and validate a bank document of the form `{ "A1": [ {..}, .. ], .. }`.
  pub fn from_json(s: &str) -> Result<Self, String> {
    let raw: HashMap<String, Vec<Question>> =
      serde_json::from_str(s).map_err(|e| format!("invalid question bank JSON: {e}"))?;

    let mut pools = HashMap::new();
    for (key, items) in raw {
      let level: Level = key.parse()?;
      let mut seen = HashSet::new();
      let mut pool = Vec::with_capacity(items.len());
      for mut q in items {
        validate_question(&q)?;
        if !seen.insert(q.id.clone()) {
          return Err(format!("duplicate question id '{}' in pool {}", q.id, level));
        }
        if let Some(declared) = q.level {
          if declared != level {
            warn!(target: "placement", id = %q.id, %declared, pool = %level, "Question level disagrees with its pool; using the pool level");
          }
        }
        q.level = Some(level);
        pool.push(q);
      }
      pools.insert(level, pool);
    }
    Ok(Self { pools })
  }

  #[instrument(level = "info")]
  pub fn load_from_path(path: &str) -> Result<Self, String> {
    let s = std::fs::read_to_string(path).map_err(|e| format!("cannot read question bank '{path}': {e}"))?;
    let bank = Self::from_json(&s).map_err(|e| format!("{path}: {e}"))?;
    bank.log_inventory(path);
    Ok(bank)
  }

  /// `QUESTION_BANK_PATH` if set (errors are fatal), otherwise the seed bank.
  pub fn from_env() -> Result<Self, String> {
    match std::env::var("QUESTION_BANK_PATH") {
      Ok(path) if !path.trim().is_empty() => Self::load_from_path(path.trim()),
      _ => {
        let bank = seed_bank()?;
        bank.log_inventory("built-in");
        Ok(bank)
      }
    }
  }

  /// Questions for a level; empty when the level has no pool.
  pub fn pool(&self, level: Level) -> &[Question] {
    self.pools.get(&level).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn len(&self) -> usize {
    self.pools.values().map(Vec::len).sum()
  }

  fn log_inventory(&self, source: &str) {
    for level in Level::ALL {
      info!(target: "placement", %source, %level, questions = self.pool(level).len(), "Question bank inventory");
    }
  }
}

fn validate_question(q: &Question) -> Result<(), String> {
  if q.id.trim().is_empty() {
    return Err("question with empty id".into());
  }
  if q.q.trim().is_empty() {
    return Err(format!("question '{}' has an empty prompt", q.id));
  }
  match (&q.kind, &q.answer) {
    (QuestionKind::MultipleChoice, AnswerKey::Index(i)) => {
      if q.options.len() < 2 {
        return Err(format!("multiple-choice question '{}' needs at least 2 options", q.id));
      }
      if *i >= q.options.len() {
        return Err(format!("question '{}' answer index {} out of range", q.id, i));
      }
    }
    (QuestionKind::MultipleChoice, AnswerKey::Text(_)) => {
      return Err(format!("multiple-choice question '{}' must store an option index", q.id));
    }
    (QuestionKind::GapFill, AnswerKey::Text(t)) if t.trim().is_empty() => {
      return Err(format!("gap-fill question '{}' has an empty answer", q.id));
    }
    (QuestionKind::GapFill, AnswerKey::Text(_)) => {}
    (QuestionKind::GapFill, AnswerKey::Index(_)) => {
      return Err(format!("gap-fill question '{}' must store a text answer", q.id));
    }
  }
  Ok(())
}
