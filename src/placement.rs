//! Adaptive CEFR placement test.
//!
//! A `PlacementSession` is owned by exactly one learner. Each step draws an
//! unseen question from the pool chosen by the selection policy, grades the
//! answer locally, bumps the per-level tally on success, and moves the
//! current-level pointer one rung up (correct) or down (incorrect).
//!
//! The tally decides the final level; the pointer only decides which pool the
//! next question comes from (and breaks ties at the end).

use std::collections::{BTreeMap, HashSet};

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::bank::QuestionBank;
use crate::domain::{AnswerKey, Level, Question, QuestionKind, UserAnswer};
use crate::util::loose_eq;

pub const DEFAULT_MAX_QUESTIONS: usize = 10;
pub const BASELINE_LEVEL: Level = Level::A2;
/// Starts mid-ladder and wanders; used as-is by the template policy.
pub const DEFAULT_TEMPLATE: [Level; 10] = [
  Level::A2,
  Level::A1,
  Level::A2,
  Level::B1,
  Level::A2,
  Level::B1,
  Level::B2,
  Level::B1,
  Level::A2,
  Level::A1,
];

/// Which pool the next question is drawn from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
  /// Follow the score-driven current-level pointer.
  #[default]
  Adaptive,
  /// Follow the fixed template, position by position.
  Template,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
  #[error("no question pool configured for level {0}")]
  MissingPool(Level),
  #[error("no unseen questions left for level {0}")]
  ExhaustedPool(Level),
  #[error("question '{0}' is not the pending question of this session")]
  UnknownQuestion(String),
  #[error("answer must not be blank")]
  BlankAnswer,
  #[error("placement test already finished")]
  Finished,
  #[error("invalid session setup: {0}")]
  InvalidSetup(String),
}

/// Per-answer feedback returned to the caller.
#[derive(Clone, Debug, Serialize)]
pub struct AnswerOutcome {
  pub correct: bool,
  /// Canonical correct answer, for display.
  pub expected: String,
  pub level: Level,
  pub current_level: Level,
  pub answered: usize,
  pub total: usize,
}

/// Final estimate.
#[derive(Clone, Debug, Serialize)]
pub struct PlacementResult {
  pub level: Level,
  pub strengths: &'static str,
  pub weaknesses: &'static str,
  pub tally: BTreeMap<Level, u32>,
  pub answered: usize,
  pub ended_early: bool,
}

#[derive(Clone, Debug)]
pub struct PlacementSession {
  policy: SelectionPolicy,
  template: Vec<Level>,
  max_questions: usize,
  answered: usize,
  current: Level,
  tally: BTreeMap<Level, u32>,
  asked: HashSet<String>,
  pending: Option<Question>,
  ended_early: bool,
}

impl PlacementSession {
  pub fn new(policy: SelectionPolicy, max_questions: usize, template: Vec<Level>) -> Result<Self, PlacementError> {
    if max_questions == 0 {
      return Err(PlacementError::InvalidSetup("max_questions must be at least 1".into()));
    }
    if template.len() < max_questions {
      return Err(PlacementError::InvalidSetup(format!(
        "template has {} entries but {} questions are required",
        template.len(),
        max_questions
      )));
    }
    Ok(Self::fresh(policy, max_questions, template))
  }

  /// Ten questions over the default template.
  #[cfg(test)]
  pub fn with_defaults(policy: SelectionPolicy) -> Self {
    Self::fresh(policy, DEFAULT_MAX_QUESTIONS, DEFAULT_TEMPLATE.to_vec())
  }

  fn fresh(policy: SelectionPolicy, max_questions: usize, template: Vec<Level>) -> Self {
    Self {
      policy,
      template,
      max_questions,
      answered: 0,
      current: BASELINE_LEVEL,
      tally: Level::ALL.iter().map(|l| (*l, 0)).collect(),
      asked: HashSet::new(),
      pending: None,
      ended_early: false,
    }
  }

  #[cfg(test)]
  pub fn current_level(&self) -> Level {
    self.current
  }

  pub fn answered(&self) -> usize {
    self.answered
  }

  pub fn total(&self) -> usize {
    self.max_questions
  }

  pub fn pending(&self) -> Option<&Question> {
    self.pending.as_ref()
  }

  pub fn is_complete(&self) -> bool {
    self.ended_early || self.answered >= self.max_questions
  }

  /// Level whose pool the next question comes from.
  fn step_level(&self) -> Level {
    match self.policy {
      SelectionPolicy::Adaptive => self.current,
      SelectionPolicy::Template => self.template.get(self.answered).copied().unwrap_or(BASELINE_LEVEL),
    }
  }

  /// Draw the next unseen question. Re-returns the pending one if it has not
  /// been answered yet.
  #[instrument(level = "debug", skip(self, bank, rng), fields(answered = self.answered, current = %self.current))]
  pub fn next_question<R: Rng + ?Sized>(&mut self, bank: &QuestionBank, rng: &mut R) -> Result<Question, PlacementError> {
    if self.is_complete() {
      return Err(PlacementError::Finished);
    }
    if let Some(q) = &self.pending {
      return Ok(q.clone());
    }

    let level = self.step_level();
    let pool = bank.pool(level);
    if pool.is_empty() {
      return Err(PlacementError::MissingPool(level));
    }

    let candidates: Vec<&Question> = pool.iter().filter(|q| !self.asked.contains(&q.id)).collect();
    let chosen = match candidates.choose(rng) {
      Some(q) => (*q).clone(),
      None => {
        self.ended_early = true;
        return Err(PlacementError::ExhaustedPool(level));
      }
    };

    debug!(target: "placement", %level, id = %chosen.id, remaining = candidates.len() - 1, "Question drawn");
    self.asked.insert(chosen.id.clone());
    self.pending = Some(chosen.clone());
    Ok(chosen)
  }

  /// Grade the answer to the pending question and update tally and pointer.
  #[instrument(level = "debug", skip(self, answer), fields(%question_id))]
  pub fn submit_answer(&mut self, question_id: &str, answer: &UserAnswer) -> Result<AnswerOutcome, PlacementError> {
    let question = match &self.pending {
      Some(q) if q.id == question_id => q.clone(),
      _ => return Err(PlacementError::UnknownQuestion(question_id.to_string())),
    };
    if let UserAnswer::Text(t) = answer {
      if t.trim().is_empty() {
        return Err(PlacementError::BlankAnswer);
      }
    }

    let correct = grade(&question, answer);
    let level = question.level();
    if correct {
      *self.tally.entry(level).or_insert(0) += 1;
      self.current = self.current.up();
    } else {
      self.current = self.current.down();
    }
    self.answered += 1;
    self.pending = None;

    debug!(target: "placement", id = %question.id, %level, correct, current = %self.current, answered = self.answered, "Answer graded");
    Ok(AnswerOutcome {
      correct,
      expected: question.expected_text(),
      level,
      current_level: self.current,
      answered: self.answered,
      total: self.max_questions,
    })
  }

  /// Level with the highest tally; ties resolved around the current pointer.
  pub fn finalize(&self) -> PlacementResult {
    let level = pick_level(&self.tally, self.current);
    PlacementResult {
      level,
      strengths: strengths(level),
      weaknesses: weaknesses(level),
      tally: self.tally.clone(),
      answered: self.answered,
      ended_early: self.ended_early,
    }
  }
}

/// Local correctness check.
///
/// Multiple choice compares option indexes (a numeric text counts as an index);
/// gap fill compares trimmed text case-insensitively.
pub fn grade(question: &Question, answer: &UserAnswer) -> bool {
  match (&question.kind, &question.answer) {
    (QuestionKind::MultipleChoice, AnswerKey::Index(expected)) => match answer {
      UserAnswer::Index(i) => i == expected,
      UserAnswer::Text(t) => t.trim().parse::<usize>().map(|i| i == *expected).unwrap_or(false),
    },
    (_, AnswerKey::Text(expected)) => match answer {
      UserAnswer::Text(t) => loose_eq(t, expected),
      UserAnswer::Index(i) => loose_eq(&i.to_string(), expected),
    },
    (QuestionKind::GapFill, AnswerKey::Index(expected)) => match answer {
      UserAnswer::Index(i) => i == expected,
      UserAnswer::Text(t) => loose_eq(t, &expected.to_string()),
    },
  }
}

fn pick_level(tally: &BTreeMap<Level, u32>, pointer: Level) -> Level {
  let best = tally.values().copied().max().unwrap_or(0);
  let tied: Vec<Level> = Level::ALL
    .iter()
    .copied()
    .filter(|l| tally.get(l).copied().unwrap_or(0) == best)
    .collect();
  if tied.contains(&pointer) {
    return pointer;
  }
  // Ladder order is ascending, so min_by_key keeps the lower level on equal distance.
  tied
    .into_iter()
    .min_by_key(|l| l.rank().abs_diff(pointer.rank()))
    .unwrap_or(pointer)
}

pub fn strengths(level: Level) -> &'static str {
  match level {
    Level::A1 => "basic vocabulary and clarity",
    Level::A2 => "familiar topics and daily routine",
    Level::B1 => "giving opinions and connecting ideas",
    Level::B2 => "consistency and autonomy across varied topics",
  }
}

pub fn weaknesses(level: Level) -> &'static str {
  match level {
    Level::A1 => "basic verbs and prepositions",
    Level::A2 => "collocations and verb tenses",
    Level::B1 => "grammatical accuracy and lexical variety",
    Level::B2 => "advanced naturalness and lexical finesse",
  }
}
