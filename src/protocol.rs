//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Field names are camelCase on the wire to match the browser client.

use serde::{Deserialize, Serialize};

use crate::domain::{ChatMessage, Level, Question, QuestionKind, UserAnswer};
use crate::persona::IntakeData;
use crate::placement::{AnswerOutcome, PlacementResult, SelectionPolicy};
use crate::relay::Reply;
use crate::seeds::IntakeQuestion;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
  Ping,
  StartPlacement {
    #[serde(default)]
    policy: Option<SelectionPolicy>,
  },
  PlacementAnswer {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "questionId")]
    question_id: String,
    answer: UserAnswer,
  },
  Chat {
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    level: Option<String>,
  },
  IntakeReply {
    key: String,
    text: String,
  },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
  Pong,
  PlacementStarted {
    placement: PlacementStartOut,
  },
  PlacementAnswer {
    outcome: PlacementAnswerOut,
  },
  ChatReply {
    ok: bool,
    text: String,
  },
  IntakeReply {
    key: String,
    text: String,
  },
  Error {
    message: String,
  },
}

/// A question as shown to the learner: everything but the answer key.
#[derive(Debug, Serialize)]
pub struct QuestionOut {
  pub id: String,
  pub level: Level,
  #[serde(rename = "type")]
  pub kind: QuestionKind,
  pub q: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<String>,
}

pub fn to_out(q: &Question) -> QuestionOut {
  QuestionOut {
    id: q.id.clone(),
    level: q.level(),
    kind: q.kind,
    q: q.q.clone(),
    options: q.options.clone(),
  }
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
}

/// Who is chatting; only used for telemetry.
#[derive(Debug, Deserialize)]
pub struct StudentRef {
  #[serde(default)]
  pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatIn {
  #[serde(default)]
  pub messages: Vec<ChatMessage>,
  #[serde(default)]
  pub level: Option<String>,
  #[serde(default)]
  pub student: Option<StudentRef>,
}

/// `{ ok, text, choices: [{ message: { content } }] }`; `choices` keeps
/// clients written against the raw provider shape working.
#[derive(Debug, Serialize)]
pub struct ChatOut {
  pub ok: bool,
  pub text: String,
  pub choices: Vec<ChoiceOut>,
}

#[derive(Debug, Serialize)]
pub struct ChoiceOut {
  pub message: ChoiceMessageOut,
}

#[derive(Debug, Serialize)]
pub struct ChoiceMessageOut {
  pub content: String,
}

impl From<Reply> for ChatOut {
  fn from(r: Reply) -> Self {
    Self {
      ok: r.ok,
      choices: vec![ChoiceOut { message: ChoiceMessageOut { content: r.text.clone() } }],
      text: r.text,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct RespondIn {
  #[serde(default)]
  pub text: String,
  #[serde(default)]
  pub level: Option<String>,
}

/// One earlier turn of a coach conversation. Any role other than "user" is
/// treated as the coach.
#[derive(Debug, Deserialize)]
pub struct PriorTurn {
  #[serde(default)]
  pub role: String,
  #[serde(default)]
  pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachIn {
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub student_name: Option<String>,
  #[serde(default)]
  pub student_level: Option<String>,
  #[serde(default)]
  pub focus_areas: Vec<String>,
  #[serde(default)]
  pub theme: Option<String>,
  #[serde(default)]
  pub previous_messages: Vec<PriorTurn>,
  #[serde(default)]
  pub intake_data: Option<IntakeData>,
}

#[derive(Debug, Serialize)]
pub struct CoachOut {
  pub response: String,
}

/// Lead form. Unknown fields are kept and forwarded as-is.
#[derive(Debug, Default, Deserialize)]
pub struct LeadIn {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub whats: Option<String>,
  #[serde(default)]
  pub level: Option<String>,
  #[serde(default)]
  pub situation: Option<String>,
  #[serde(default)]
  pub problem: Option<String>,
  #[serde(default)]
  pub implication: Option<String>,
  #[serde(default)]
  pub need: Option<String>,
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct StudentIn {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub passphrase: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OkOut {
  pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct StudentOut {
  pub ok: bool,
  pub login: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlacementStartIn {
  #[serde(default)]
  pub policy: Option<SelectionPolicy>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementStartOut {
  pub session_id: String,
  pub total: usize,
  /// 1-based position of `question`.
  pub index: usize,
  pub question: QuestionOut,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementAnswerIn {
  pub session_id: String,
  pub question_id: String,
  pub answer: UserAnswer,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementAnswerOut {
  pub correct: bool,
  pub expected: String,
  pub current_level: Level,
  pub answered: usize,
  pub total: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub feedback: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub next: Option<QuestionOut>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result: Option<PlacementResultOut>,
}

impl PlacementAnswerOut {
  pub fn from_outcome(o: &AnswerOutcome) -> Self {
    Self {
      correct: o.correct,
      expected: o.expected.clone(),
      current_level: o.current_level,
      answered: o.answered,
      total: o.total,
      feedback: None,
      next: None,
      result: None,
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementResultOut {
  pub level: Level,
  pub strengths: String,
  pub weaknesses: String,
  pub tally: std::collections::BTreeMap<Level, u32>,
  pub answered: usize,
  pub ended_early: bool,
}

impl From<PlacementResult> for PlacementResultOut {
  fn from(r: PlacementResult) -> Self {
    Self {
      level: r.level,
      strengths: r.strengths.to_string(),
      weaknesses: r.weaknesses.to_string(),
      tally: r.tally,
      answered: r.answered,
      ended_early: r.ended_early,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct IntakeQuestionsOut {
  pub questions: Vec<IntakeQuestion>,
}

#[derive(Debug, Deserialize)]
pub struct IntakeIn {
  #[serde(default)]
  pub key: String,
  #[serde(default)]
  pub text: String,
}

#[derive(Debug, Serialize)]
pub struct IntakeOut {
  pub key: String,
  pub text: String,
}
