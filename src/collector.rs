//! Form-collector (Formspree) forwarding for lead, student, and chat telemetry records.
//!
//! Lead and student submissions are awaited so the caller can report failure.
//! Chat telemetry goes through `dispatch_detached`: a spawned task whose
//! outcome is only logged, so a slow or failing collector never delays a reply.

use reqwest::header::ACCEPT;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::CollectorConfig;

/// Which collector form a record belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormKind {
  Lead,
  Student,
}

impl FormKind {
  pub fn as_str(self) -> &'static str {
    match self {
      FormKind::Lead => "lead",
      FormKind::Student => "student",
    }
  }
}

#[derive(Clone)]
pub struct FormCollector {
  client: reqwest::Client,
  leads_url: Option<String>,
  students_url: Option<String>,
}

impl FormCollector {
  pub fn new(cfg: &CollectorConfig) -> Self {
    Self {
      client: reqwest::Client::new(),
      leads_url: cfg.leads_url.clone(),
      students_url: cfg.students_url.clone(),
    }
  }

  pub fn url_for(&self, kind: FormKind) -> Option<&str> {
    match kind {
      FormKind::Lead => self.leads_url.as_deref(),
      FormKind::Student => self.students_url.as_deref(),
    }
  }

  /// POST one record and wait for the collector's answer.
  #[instrument(level = "info", skip(self, payload), fields(kind = kind.as_str()))]
  pub async fn submit<T: Serialize + ?Sized>(&self, kind: FormKind, payload: &T) -> Result<(), String> {
    let url = self
      .url_for(kind)
      .ok_or_else(|| format!("no collector URL configured for {} records", kind.as_str()))?;
    let res = self
      .client
      .post(url)
      .header(ACCEPT, "application/json")
      .json(payload)
      .send()
      .await
      .map_err(|e| e.to_string())?;
    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      return Err(format!("collector HTTP {}: {}", status, crate::util::trunc_for_log(&body, 200)));
    }
    debug!(target: "collector", kind = kind.as_str(), "Record accepted");
    Ok(())
  }

  /// Best-effort submission on a detached task. Returns immediately; failures
  /// are logged at `warn` and otherwise dropped. Skipped when no URL is set.
  pub fn dispatch_detached(&self, kind: FormKind, payload: serde_json::Value) {
    if self.url_for(kind).is_none() {
      debug!(target: "collector", kind = kind.as_str(), "No collector URL; telemetry skipped");
      return;
    }
    let collector = self.clone();
    tokio::spawn(async move {
      if let Err(e) = collector.submit(kind, &payload).await {
        warn!(target: "collector", kind = kind.as_str(), error = %e, "Detached collector post failed");
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::http::StatusCode;
  use serde_json::json;

  use crate::test_support::MockUpstream;

  fn collector(leads: Option<String>, students: Option<String>) -> FormCollector {
    FormCollector::new(&CollectorConfig { leads_url: leads, students_url: students, student_passphrase: None })
  }

  #[tokio::test]
  async fn submit_posts_payload() {
    let up = MockUpstream::spawn(StatusCode::OK, json!({"ok": true}).to_string()).await;
    let c = collector(Some(up.collect_url()), None);
    c.submit(FormKind::Lead, &json!({"name": "Ana"})).await.unwrap();
    assert_eq!(up.last_request().unwrap()["name"], "Ana");
  }

  #[tokio::test]
  async fn submit_reports_collector_failure_and_missing_url() {
    let up = MockUpstream::spawn(StatusCode::UNPROCESSABLE_ENTITY, json!({"error": "bad"}).to_string()).await;
    let c = collector(Some(up.collect_url()), None);
    let err = c.submit(FormKind::Lead, &json!({})).await.unwrap_err();
    assert!(err.contains("422"));
    let err = c.submit(FormKind::Student, &json!({})).await.unwrap_err();
    assert!(err.contains("student"));
  }

  #[tokio::test]
  async fn detached_dispatch_swallows_failures() {
    let up = MockUpstream::spawn(StatusCode::INTERNAL_SERVER_ERROR, "{}".into()).await;
    let c = collector(None, Some(up.collect_url()));
    c.dispatch_detached(FormKind::Student, json!({"name": "Ana", "textLen": 12}));
    assert!(up.wait_for_hits(1).await);
    assert_eq!(up.last_request().unwrap()["textLen"], 12);
  }
}
