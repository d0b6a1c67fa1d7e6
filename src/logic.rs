//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Chat relay calls (free chat, single-message respond, coach transcript)
//!   - Placement start / answer, with optional one-sentence feedback
//!   - Intake replies
//!   - Lead and student records forwarded to the form collector

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::collector::FormKind;
use crate::domain::{AnswerKey, ChatMessage, ChatRole, Question, UserAnswer};
use crate::error::AppError;
use crate::persona::StudentProfile;
use crate::placement::SelectionPolicy;
use crate::protocol::{
  to_out, CoachIn, LeadIn, PlacementAnswerIn, PlacementAnswerOut, PlacementResultOut, PlacementStartOut, StudentIn,
  StudentRef,
};
use crate::relay::Reply;
use crate::seeds::intake_question;
use crate::state::{AppState, PlacementStep};
use crate::util::{fill_template, login_slug};

/// Persona reply for a chat history. Validation happens before any network call.
#[instrument(level = "info", skip(state, messages, student), fields(messages = messages.len()))]
pub async fn chat_reply(
  state: &AppState,
  messages: Vec<ChatMessage>,
  level: Option<String>,
  student: Option<&StudentRef>,
) -> Result<Reply, AppError> {
  if messages.is_empty() {
    return Err(AppError::Validation("messages must not be empty".into()));
  }
  let last_user = messages
    .iter()
    .rev()
    .find(|m| m.role == ChatRole::User && !m.content.trim().is_empty())
    .map(|m| m.content.chars().count())
    .ok_or_else(|| AppError::Validation("messages must contain a non-empty user message".into()))?;
  let relay = state.relay()?;

  let mut history = Vec::with_capacity(messages.len() + 1);
  if !state.prompts.chat_directive.trim().is_empty() {
    history.push(ChatMessage::new(ChatRole::System, state.prompts.chat_directive.clone()));
  }
  history.extend(messages);

  let profile = StudentProfile::with_level(level);
  let reply = relay.get_reply(&state.persona, &profile, &history, &state.prompts).await;

  if let Some(student) = student.filter(|s| !s.name.trim().is_empty()) {
    state.collector.dispatch_detached(
      FormKind::Student,
      json!({ "name": student.name.trim(), "textLen": last_user, "ts": Utc::now().to_rfc3339() }),
    );
  }
  info!(target: "relay", ok = reply.ok, reply_len = reply.text.len(), "Chat reply ready");
  Ok(reply)
}

/// Single user message variant of `chat_reply`.
pub async fn respond(state: &AppState, text: &str, level: Option<String>) -> Result<Reply, AppError> {
  if text.trim().is_empty() {
    return Err(AppError::Validation("text must not be empty".into()));
  }
  chat_reply(state, vec![ChatMessage::user(text.trim())], level, None).await
}

/// Coach reply: earlier turns are flattened into a Student/Coach transcript
/// sent as one user message.
#[instrument(level = "info", skip(state, body), fields(prior = body.previous_messages.len(), message_len = body.message.len()))]
pub async fn coach_reply(state: &AppState, body: CoachIn) -> Result<String, AppError> {
  if body.message.trim().is_empty() {
    return Err(AppError::Validation("message must not be empty".into()));
  }
  let relay = state.relay()?;

  let profile = StudentProfile {
    name: body.student_name,
    level: body.student_level,
    focus_areas: body.focus_areas,
    theme: body.theme,
    intake: body.intake_data,
  };
  let transcript = coach_transcript(&body.previous_messages, &body.message);
  let reply = relay
    .get_reply(&state.persona, &profile, &[ChatMessage::user(transcript)], &state.prompts)
    .await;
  Ok(reply.text)
}

fn coach_transcript(prior: &[crate::protocol::PriorTurn], message: &str) -> String {
  let mut out = String::new();
  for turn in prior.iter().filter(|t| !t.content.trim().is_empty()) {
    let who = if turn.role.eq_ignore_ascii_case("user") { "Student" } else { "Coach" };
    out.push_str(&format!("{}: {}\n", who, turn.content.trim()));
  }
  out.push_str(&format!("Student: {}", message.trim()));
  out
}

/// Short empathetic reaction to one intake answer. Needs the relay; only an
/// upstream failure falls back to the static text.
#[instrument(level = "info", skip(state, text), fields(%key, text_len = text.len()))]
pub async fn intake_reply(state: &AppState, key: &str, text: &str) -> Result<String, AppError> {
  let question = intake_question(key).ok_or_else(|| AppError::Validation(format!("unknown intake key '{}'", key)))?;
  if text.trim().is_empty() {
    return Err(AppError::Validation("text must not be empty".into()));
  }

  let relay = state.relay()?;
  let user = format!("Pergunta: {}\nResposta: {}", question.q, text.trim());
  match relay.quick_reply(&state.prompts.intake_system, &user).await {
    Ok(t) => Ok(t),
    Err(e) => {
      warn!(target: "relay", error = %e, "Intake reply failed; static text used");
      Ok(state.prompts.intake_fallback.clone())
    }
  }
}

pub async fn start_placement(state: &AppState, policy: Option<SelectionPolicy>) -> Result<PlacementStartOut, AppError> {
  let start = state.start_placement(policy).await?;
  Ok(PlacementStartOut {
    session_id: start.session_id,
    total: start.total,
    index: 1,
    question: to_out(&start.question),
  })
}

/// Grade one answer and return either the next question or the final result.
#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id, question_id = %body.question_id))]
pub async fn answer_placement(state: &AppState, body: PlacementAnswerIn) -> Result<PlacementAnswerOut, AppError> {
  let answered = state
    .answer_placement(&body.session_id, &body.question_id, &body.answer)
    .await?;

  let mut out = PlacementAnswerOut::from_outcome(&answered.outcome);
  if state.placement.feedback {
    out.feedback = answer_feedback(state, &answered.question, &body.answer, answered.outcome.correct).await;
  }
  match answered.step {
    PlacementStep::Next(q) => out.next = Some(to_out(&q)),
    PlacementStep::Done(result) => out.result = Some(PlacementResultOut::from(result)),
  }
  Ok(out)
}

/// One-sentence comment on an answer. Omitted without a relay; static text
/// when the relay call fails.
async fn answer_feedback(state: &AppState, question: &Question, answer: &UserAnswer, correct: bool) -> Option<String> {
  let Ok(relay) = state.relay() else {
    debug!(target: "placement", "No relay; answer feedback omitted");
    return None;
  };
  let fallback = if correct {
    &state.prompts.feedback_correct_fallback
  } else {
    &state.prompts.feedback_incorrect_fallback
  };

  let options = question.options.join(" | ");
  let answer_text = display_answer(question, answer);
  let user = fill_template(
    &state.prompts.feedback_user_template,
    &[
      ("question", question.q.as_str()),
      ("options", options.as_str()),
      ("answer", answer_text.as_str()),
      ("correct", if correct { "yes" } else { "no" }),
    ],
  );
  match relay.quick_reply(&state.prompts.feedback_system, &user).await {
    Ok(t) => Some(t),
    Err(e) => {
      warn!(target: "relay", error = %e, "Answer feedback failed; static text used");
      Some(fallback.clone())
    }
  }
}

/// The learner's answer as text: an option index becomes the option label.
fn display_answer(question: &Question, answer: &UserAnswer) -> String {
  match (answer, &question.answer) {
    (UserAnswer::Index(i), AnswerKey::Index(_)) => {
      question.options.get(*i).cloned().unwrap_or_else(|| i.to_string())
    }
    (UserAnswer::Index(i), _) => i.to_string(),
    (UserAnswer::Text(t), _) => t.trim().to_string(),
  }
}

/// Forward a lead record to the collector and wait for it.
#[instrument(level = "info", skip(state, body))]
pub async fn submit_lead(state: &AppState, body: LeadIn) -> Result<(), AppError> {
  let name = body.name.trim();
  let email = body.email.trim();
  if name.is_empty() || email.is_empty() {
    return Err(AppError::Validation("name and email are required".into()));
  }
  if state.collector.url_for(FormKind::Lead).is_none() {
    return Err(AppError::Configuration("FORMSPREE_LEADS_URL is not set".into()));
  }

  let mut record = body.extra;
  let opt = |v: &Option<String>| Value::String(v.as_deref().unwrap_or("").trim().to_string());
  record.insert("name".into(), json!(name));
  record.insert("email".into(), json!(email));
  record.insert("whats".into(), opt(&body.whats));
  record.insert("level".into(), opt(&body.level));
  record.insert("situation".into(), opt(&body.situation));
  record.insert("problem".into(), opt(&body.problem));
  record.insert("implication".into(), opt(&body.implication));
  record.insert("need".into(), opt(&body.need));
  record.insert("finishedAt".into(), json!(Utc::now().to_rfc3339()));

  state
    .collector
    .submit(FormKind::Lead, &Value::Object(record))
    .await
    .map_err(AppError::Upstream)?;
  info!(target: "collector", level = ?body.level, "Lead forwarded");
  Ok(())
}

/// Check the passphrase (when configured) and record the login. Returns the login slug.
#[instrument(level = "info", skip(state, body))]
pub async fn student_login(state: &AppState, body: StudentIn) -> Result<String, AppError> {
  let name = body.name.trim();
  if name.is_empty() {
    return Err(AppError::Validation("name is required".into()));
  }
  if let Some(expected) = &state.student_passphrase {
    if body.passphrase.as_deref().map(str::trim) != Some(expected.as_str()) {
      return Err(AppError::Unauthorized("invalid passphrase".into()));
    }
  }

  let login = login_slug(name);
  if state.collector.url_for(FormKind::Student).is_some() {
    let record = json!({ "name": name, "login": login, "loginAt": Utc::now().to_rfc3339() });
    state
      .collector
      .submit(FormKind::Student, &record)
      .await
      .map_err(AppError::Upstream)?;
  } else {
    debug!(target: "collector", "No students URL; login not recorded");
  }
  info!(target: "mastrius_backend", %login, "Student logged in");
  Ok(login)
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::http::StatusCode;

  use crate::config::AgentConfig;
  use crate::protocol::PriorTurn;
  use crate::relay::{Provider, RelayClient};
  use crate::seeds::{seed_bank, seed_persona};
  use crate::test_support::MockUpstream;

  fn completion(text: &str) -> String {
    json!({ "choices": [ { "message": { "content": text } } ] }).to_string()
  }

  fn state_with(up: Option<&MockUpstream>, passphrase: Option<&str>) -> AppState {
    let mut cfg = AgentConfig::default();
    let relay = match up {
      Some(u) => {
        cfg.collector.leads_url = Some(u.collect_url());
        cfg.collector.students_url = Some(u.collect_url());
        Ok(RelayClient::new(Provider::Groq, u.base_url.clone(), "k", "m"))
      }
      None => Err("GROQ_API_KEY is not set".to_string()),
    };
    cfg.collector.student_passphrase = passphrase.map(str::to_string);
    AppState::new(cfg, seed_bank().unwrap(), seed_persona().unwrap(), relay)
  }

  #[tokio::test]
  async fn empty_messages_fail_before_any_call() {
    let up = MockUpstream::spawn(StatusCode::OK, completion("hi")).await;
    let st = state_with(Some(&up), None);
    let err = chat_reply(&st, vec![], None, None).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let err = chat_reply(&st, vec![ChatMessage::new(ChatRole::System, "x")], None, None).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(up.hits(), 0);
  }

  #[tokio::test]
  async fn chat_without_credential_is_configuration_error() {
    let st = state_with(None, None);
    let err = chat_reply(&st, vec![ChatMessage::user("hi")], None, None).await.unwrap_err();
    assert!(matches!(err, AppError::Configuration(_)));
  }

  #[tokio::test]
  async fn chat_with_student_dispatches_telemetry() {
    let up = MockUpstream::spawn(StatusCode::OK, completion("Hello!")).await;
    let st = state_with(Some(&up), None);
    let student = StudentRef { name: "Ana".into() };
    let reply = chat_reply(&st, vec![ChatMessage::user("hello there")], Some("A2".into()), Some(&student))
      .await
      .unwrap();
    assert_eq!(reply, Reply { ok: true, text: "Hello!".into() });
    // one relay call + one detached telemetry post
    assert!(up.wait_for_hits(2).await);
  }

  #[test]
  fn transcript_labels_turns() {
    let prior = vec![
      PriorTurn { role: "user".into(), content: "I like music".into() },
      PriorTurn { role: "assistant".into(), content: "Great, which kind?".into() },
    ];
    assert_eq!(
      coach_transcript(&prior, " Rock "),
      "Student: I like music\nCoach: Great, which kind?\nStudent: Rock"
    );
  }

  #[tokio::test]
  async fn coach_sends_transcript_as_one_user_message() {
    let up = MockUpstream::spawn(StatusCode::OK, completion("Keep going!")).await;
    let st = state_with(Some(&up), None);
    let body: CoachIn = serde_json::from_value(json!({
      "message": "How do I improve?",
      "studentName": "Ana",
      "studentLevel": "B1",
      "previousMessages": [ { "role": "user", "content": "Hi" }, { "role": "coach", "content": "Hello" } ]
    }))
    .unwrap();
    assert_eq!(coach_reply(&st, body).await.unwrap(), "Keep going!");
    let sent = up.last_request().unwrap();
    let msgs = sent["messages"].as_array().unwrap();
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[1]["content"], "Student: Hi\nCoach: Hello\nStudent: How do I improve?");
    assert!(msgs[0]["content"].as_str().unwrap().contains("Name: Ana"));
  }

  #[tokio::test]
  async fn intake_without_credential_is_configuration_error() {
    let st = state_with(None, None);
    let err = intake_reply(&st, "problem", "Falta de tempo").await.unwrap_err();
    assert!(matches!(err, AppError::Configuration(_)));
    assert!(matches!(intake_reply(&st, "nope", "x").await, Err(AppError::Validation(_))));
    assert!(matches!(intake_reply(&st, "need", "  ").await, Err(AppError::Validation(_))));
  }

  #[tokio::test]
  async fn intake_falls_back_on_upstream_failure() {
    let up = MockUpstream::spawn(StatusCode::INTERNAL_SERVER_ERROR, "{}".into()).await;
    let st = state_with(Some(&up), None);
    let text = intake_reply(&st, "problem", "Falta de tempo").await.unwrap();
    assert_eq!(text, st.prompts.intake_fallback);
    assert_eq!(up.hits(), 1);
  }

  #[tokio::test]
  async fn placement_feedback_is_omitted_without_credential() {
    let st = state_with(None, None);
    let start = start_placement(&st, None).await.unwrap();
    let body = PlacementAnswerIn {
      session_id: start.session_id,
      question_id: start.question.id.clone(),
      answer: UserAnswer::Text("definitely not the answer".into()),
    };
    let out = answer_placement(&st, body).await.unwrap();
    assert!(out.feedback.is_none());
    assert_eq!(out.answered, 1);
  }

  #[tokio::test]
  async fn lead_requires_name_and_email_and_forwards_fields() {
    let up = MockUpstream::spawn(StatusCode::OK, "{}".into()).await;
    let st = state_with(Some(&up), None);
    let missing = LeadIn { name: "Ana".into(), ..Default::default() };
    assert!(matches!(submit_lead(&st, missing).await, Err(AppError::Validation(_))));
    assert_eq!(up.hits(), 0);

    let body: LeadIn = serde_json::from_value(json!({
      "name": " Ana ", "email": "ana@example.com", "level": "B1", "problem": "tempo", "source": "landing"
    }))
    .unwrap();
    submit_lead(&st, body).await.unwrap();
    let sent = up.last_request().unwrap();
    assert_eq!(sent["name"], "Ana");
    assert_eq!(sent["level"], "B1");
    assert_eq!(sent["whats"], "");
    assert_eq!(sent["source"], "landing");
    assert!(sent["finishedAt"].is_string());
  }

  #[tokio::test]
  async fn lead_reports_collector_problems() {
    let st = state_with(None, None);
    let body = LeadIn { name: "Ana".into(), email: "a@b.c".into(), ..Default::default() };
    assert!(matches!(submit_lead(&st, body).await, Err(AppError::Configuration(_))));

    let up = MockUpstream::spawn(StatusCode::INTERNAL_SERVER_ERROR, "{}".into()).await;
    let st = state_with(Some(&up), None);
    let body = LeadIn { name: "Ana".into(), email: "a@b.c".into(), ..Default::default() };
    assert!(matches!(submit_lead(&st, body).await, Err(AppError::Upstream(_))));
  }

  #[tokio::test]
  async fn student_login_checks_passphrase_and_slugs_name() {
    let up = MockUpstream::spawn(StatusCode::OK, "{}".into()).await;
    let st = state_with(Some(&up), Some("destrave"));
    let wrong = StudentIn { name: "Ana Maria".into(), passphrase: Some("nope".into()) };
    assert!(matches!(student_login(&st, wrong).await, Err(AppError::Unauthorized(_))));

    let ok = StudentIn { name: "Ana Maria".into(), passphrase: Some("destrave".into()) };
    assert_eq!(student_login(&st, ok).await.unwrap(), "anamaria");
    assert_eq!(up.last_request().unwrap()["login"], "anamaria");
  }

  #[tokio::test]
  async fn placement_feedback_falls_back_on_upstream_failure() {
    let up = MockUpstream::spawn(StatusCode::INTERNAL_SERVER_ERROR, "{}".into()).await;
    let st = state_with(Some(&up), None);
    let start = start_placement(&st, None).await.unwrap();
    let body = PlacementAnswerIn {
      session_id: start.session_id,
      question_id: start.question.id.clone(),
      answer: UserAnswer::Text("definitely not the answer".into()),
    };
    let out = answer_placement(&st, body).await.unwrap();
    assert!(!out.correct);
    assert_eq!(out.feedback.as_deref(), Some(st.prompts.feedback_incorrect_fallback.as_str()));
    assert!(out.next.is_some());
    assert_eq!(out.answered, 1);
  }
}
