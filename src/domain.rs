//! Domain models: CEFR levels, placement questions, answers, and chat messages.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// CEFR ladder, truncated to the four levels the placement test covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
  A1,
  A2,
  B1,
  B2,
}

impl Level {
  /// Ladder order, lowest first.
  pub const ALL: [Level; 4] = [Level::A1, Level::A2, Level::B1, Level::B2];

  /// One step up the ladder, saturating at B2.
  pub fn up(self) -> Self {
    match self {
      Level::A1 => Level::A2,
      Level::A2 => Level::B1,
      Level::B1 | Level::B2 => Level::B2,
    }
  }

  /// One step down the ladder, saturating at A1.
  pub fn down(self) -> Self {
    match self {
      Level::B2 => Level::B1,
      Level::B1 => Level::A2,
      Level::A2 | Level::A1 => Level::A1,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Level::A1 => "A1",
      Level::A2 => "A2",
      Level::B1 => "B1",
      Level::B2 => "B2",
    }
  }

  /// Position on the ladder (A1 = 0).
  pub fn rank(self) -> usize {
    self as usize
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Level {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "A1" => Ok(Level::A1),
      "A2" => Ok(Level::A2),
      "B1" => Ok(Level::B1),
      "B2" => Ok(Level::B2),
      other => Err(format!("unknown CEFR level '{}'", other)),
    }
  }
}

/// How a question is answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
  /// Pick one option by index.
  #[serde(rename = "mc", alias = "multiple-choice", alias = "multiple_choice")]
  MultipleChoice,
  /// Type the missing word(s).
  #[serde(rename = "gap", alias = "gap-fill", alias = "gap_fill")]
  GapFill,
}

/// Stored correct answer: an option index for multiple choice, text for gap fill.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerKey {
  Index(usize),
  Text(String),
}

/// A question from the static bank. Read-only once loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
  pub id: String,
  /// Optional in the bank file; the pool key fills it in at load time.
  #[serde(rename = "lvl", default)]
  pub level: Option<Level>,
  #[serde(rename = "type")]
  pub kind: QuestionKind,
  /// Prompt text shown to the learner.
  pub q: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<String>,
  pub answer: AnswerKey,
}

impl Question {
  /// Level after bank normalization. Unreachable fallback is the baseline.
  pub fn level(&self) -> Level {
    self.level.unwrap_or(Level::A2)
  }

  /// Canonical answer text for display (option text for multiple choice).
  pub fn expected_text(&self) -> String {
    match (&self.kind, &self.answer) {
      (QuestionKind::MultipleChoice, AnswerKey::Index(i)) => {
        self.options.get(*i).cloned().unwrap_or_default()
      }
      (_, AnswerKey::Text(t)) => t.trim().to_string(),
      (QuestionKind::GapFill, AnswerKey::Index(i)) => i.to_string(),
    }
  }
}

/// Answer as submitted by a learner.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserAnswer {
  Index(usize),
  Text(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
  System,
  User,
  Assistant,
}

/// One entry of a chat history (oldest first).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: ChatRole,
  pub content: String,
}

impl ChatMessage {
  pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
    Self { role, content: content.into() }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self::new(ChatRole::User, content)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ladder_saturates_at_both_ends() {
    assert_eq!(Level::B2.up(), Level::B2);
    assert_eq!(Level::A1.down(), Level::A1);
    assert_eq!(Level::A1.up().up().up(), Level::B2);
    assert_eq!(Level::B2.down().down().down(), Level::A1);
  }

  #[test]
  fn level_parses_loosely() {
    assert_eq!(" b1 ".parse::<Level>().unwrap(), Level::B1);
    assert!("C1".parse::<Level>().is_err());
  }

  #[test]
  fn question_accepts_both_kind_spellings() {
    let mc: Question = serde_json::from_str(
      r#"{"id":"x","type":"multiple-choice","q":"?","options":["a","b"],"answer":1}"#,
    )
    .unwrap();
    assert_eq!(mc.kind, QuestionKind::MultipleChoice);
    assert_eq!(mc.expected_text(), "b");

    let gap: Question =
      serde_json::from_str(r#"{"id":"y","type":"gap","q":"I ___ home","answer":"go","lvl":"A1"}"#).unwrap();
    assert_eq!(gap.kind, QuestionKind::GapFill);
    assert_eq!(gap.level, Some(Level::A1));
    assert_eq!(gap.expected_text(), "go");
  }
}
