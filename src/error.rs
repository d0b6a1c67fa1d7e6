//! Service error taxonomy and its HTTP mapping.
//!
//! Handlers return `Result<_, AppError>`; axum turns the error into a
//! `{ "error": <code>, "detail": <message> }` body with a matching status.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum AppError {
  /// Missing credential, collector URL, or an unusable data file.
  #[error("configuration error: {0}")]
  Configuration(String),

  /// Non-2xx or malformed reply from the model provider or the form collector.
  #[error("upstream error: {0}")]
  Upstream(String),

  /// Missing or blank required input.
  #[error("validation error: {0}")]
  Validation(String),

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("not found: {0}")]
  NotFound(String),
}

impl AppError {
  fn status_and_code(&self) -> (StatusCode, &'static str) {
    match self {
      AppError::Configuration(_) => (StatusCode::SERVICE_UNAVAILABLE, "configuration_error"),
      AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
      AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
      AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
      AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
    }
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let (status, code) = self.status_and_code();
    match &self {
      AppError::Configuration(msg) => error!(target: "mastrius_backend", detail = %msg, "Configuration error"),
      AppError::Upstream(msg) => error!(target: "mastrius_backend", detail = %msg, "Upstream error"),
      other => warn!(target: "mastrius_backend", error = %other, "Request rejected"),
    }
    let detail = match self {
      AppError::Configuration(msg)
      | AppError::Upstream(msg)
      | AppError::Validation(msg)
      | AppError::Unauthorized(msg)
      | AppError::NotFound(msg) => msg,
    };
    (status, Json(json!({ "error": code, "detail": detail }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn validation_maps_to_bad_request() {
    let res = AppError::Validation("messages must not be empty".into()).into_response();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  }

  #[test]
  fn missing_credential_is_service_unavailable() {
    let res = AppError::Configuration("GROQ_API_KEY is not set".into()).into_response();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
  }
}
