//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; errors become `{ error, detail }` via `AppError`.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::logic::*;
use crate::protocol::*;
use crate::seeds::SPIN_QUESTIONS;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state, body), fields(messages = body.messages.len(), has_student = body.student.is_some()))]
pub async fn http_post_chat(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ChatIn>,
) -> Result<Json<ChatOut>, AppError> {
  let reply = chat_reply(&state, body.messages, body.level, body.student.as_ref()).await?;
  Ok(Json(ChatOut::from(reply)))
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.len()))]
pub async fn http_post_respond(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RespondIn>,
) -> Result<Json<ChatOut>, AppError> {
  let reply = respond(&state, &body.text, body.level).await?;
  Ok(Json(ChatOut::from(reply)))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_coach(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CoachIn>,
) -> Result<Json<CoachOut>, AppError> {
  let response = coach_reply(&state, body).await?;
  Ok(Json(CoachOut { response }))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_lead(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LeadIn>,
) -> Result<Json<OkOut>, AppError> {
  submit_lead(&state, body).await?;
  Ok(Json(OkOut { ok: true }))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_student(
  State(state): State<Arc<AppState>>,
  Json(body): Json<StudentIn>,
) -> Result<Json<StudentOut>, AppError> {
  let login = student_login(&state, body).await?;
  Ok(Json(StudentOut { ok: true, login }))
}

/// The body is optional; without one the configured policy applies.
#[instrument(level = "info", skip(state, body))]
pub async fn http_post_placement_start(
  State(state): State<Arc<AppState>>,
  body: Option<Json<PlacementStartIn>>,
) -> Result<Json<PlacementStartOut>, AppError> {
  let policy = body.and_then(|Json(b)| b.policy);
  let out = start_placement(&state, policy).await?;
  info!(target: "placement", session_id = %out.session_id, first = %out.question.id, "HTTP placement started");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id, question_id = %body.question_id))]
pub async fn http_post_placement_answer(
  State(state): State<Arc<AppState>>,
  Json(body): Json<PlacementAnswerIn>,
) -> Result<Json<PlacementAnswerOut>, AppError> {
  let out = answer_placement(&state, body).await?;
  info!(target: "placement", correct = out.correct, answered = out.answered, done = out.result.is_some(), "HTTP placement answer graded");
  Ok(Json(out))
}

#[instrument(level = "info")]
pub async fn http_get_intake_questions() -> impl IntoResponse {
  Json(IntakeQuestionsOut { questions: SPIN_QUESTIONS.to_vec() })
}

#[instrument(level = "info", skip(state, body), fields(key = %body.key, text_len = body.text.len()))]
pub async fn http_post_intake(
  State(state): State<Arc<AppState>>,
  Json(body): Json<IntakeIn>,
) -> Result<Json<IntakeOut>, AppError> {
  let text = intake_reply(&state, &body.key, &body.text).await?;
  Ok(Json(IntakeOut { key: body.key, text }))
}
