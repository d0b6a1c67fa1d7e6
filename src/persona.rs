//! Coach persona ("teacher brain") and system-prompt construction.
//!
//! The persona is static JSON (see `data/teacher-brain.json`). The system
//! prompt is plain template filling: the only inputs that vary per request are
//! the student profile fields, most importantly the CEFR level hint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::seeds::seed_persona;
use crate::util::fill_template;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Persona {
  pub identity: Identity,
  pub pedagogical_framework: PedagogicalFramework,
  pub communication_style: CommunicationStyle,
  pub coaching_model: CoachingModel,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Identity {
  pub name: String,
  pub role: String,
  pub archetype: String,
  pub mission: String,
  #[serde(default)]
  pub default_model: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PedagogicalFramework {
  /// Rendered in key order.
  #[serde(default)]
  pub core_principles: BTreeMap<String, String>,
  #[serde(default)]
  pub influences: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommunicationStyle {
  pub tone: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoachingModel {
  #[serde(default)]
  pub structure: Vec<String>,
}

impl Persona {
  #[tracing::instrument(level = "info")]
  pub fn load_from_path(path: &str) -> Result<Self, String> {
    let s = std::fs::read_to_string(path).map_err(|e| format!("cannot read persona '{path}': {e}"))?;
    let p: Persona = serde_json::from_str(&s).map_err(|e| format!("invalid persona '{path}': {e}"))?;
    info!(target: "mastrius_backend", %path, name = %p.identity.name, "Loaded persona");
    Ok(p)
  }

  /// `PERSONA_PATH` if set (errors are fatal), otherwise the built-in persona.
  pub fn from_env() -> Result<Self, String> {
    match std::env::var("PERSONA_PATH") {
      Ok(path) if !path.trim().is_empty() => Self::load_from_path(path.trim()),
      _ => seed_persona(),
    }
  }
}

/// Intake answers collected before the chat (pain / dream / motivation).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeData {
  #[serde(default)]
  pub pain_point: String,
  #[serde(default)]
  pub dream_scenario: String,
  #[serde(default)]
  pub motivation: String,
}

/// Who the coach is talking to. Every field is optional on the wire.
#[derive(Clone, Debug, Default)]
pub struct StudentProfile {
  pub name: Option<String>,
  pub level: Option<String>,
  pub focus_areas: Vec<String>,
  pub theme: Option<String>,
  pub intake: Option<IntakeData>,
}

impl StudentProfile {
  pub fn with_level(level: Option<String>) -> Self {
    Self { level, ..Default::default() }
  }

  /// Level hint with the A1 default applied.
  pub fn level_hint(&self) -> &str {
    non_blank(self.level.as_deref()).unwrap_or("A1")
  }
}

const SYSTEM_PROMPT_TEMPLATE: &str = "You are {name}, {role}.
Archetype: {archetype}.
Mission: {mission}.

Teaching Philosophy: {principles}.
Influences: {influences}.

Student Profile:
- Name: {student_name}
- Level: {level}
- Focus Areas: {focus_areas}
- Theme: {theme}
{intake}
Level Adaptation: speak to a CEFR {level} learner; keep vocabulary and grammar within reach of {level}, stretching one small step beyond it.

Response Style:
- Tone: {tone}
{structure}
Always end with a motivational or reflective challenge.";

/// Build the system instruction for one relay call.
pub fn build_system_prompt(persona: &Persona, profile: &StudentProfile) -> String {
  let principles = persona
    .pedagogical_framework
    .core_principles
    .values()
    .cloned()
    .collect::<Vec<_>>()
    .join(" | ");
  let influences = persona.pedagogical_framework.influences.join(", ");
  let focus_areas = if profile.focus_areas.is_empty() {
    "General Improvement".to_string()
  } else {
    profile.focus_areas.join(", ")
  };
  let intake = profile
    .intake
    .as_ref()
    .map(|i| format!("Pain: {} | Dream: {} | Motivation: {}\n", i.pain_point, i.dream_scenario, i.motivation))
    .unwrap_or_default();
  let structure = persona
    .coaching_model
    .structure
    .iter()
    .map(|s| format!("- {}", s))
    .collect::<Vec<_>>()
    .join("\n");

  fill_template(
    SYSTEM_PROMPT_TEMPLATE,
    &[
      ("name", persona.identity.name.as_str()),
      ("role", persona.identity.role.as_str()),
      ("archetype", persona.identity.archetype.as_str()),
      ("mission", persona.identity.mission.as_str()),
      ("principles", principles.as_str()),
      ("influences", influences.as_str()),
      ("student_name", non_blank(profile.name.as_deref()).unwrap_or("New Learner")),
      ("level", profile.level_hint()),
      ("focus_areas", focus_areas.as_str()),
      ("theme", non_blank(profile.theme.as_deref()).unwrap_or("Conversation")),
      ("intake", intake.as_str()),
      ("tone", persona.communication_style.tone.as_str()),
      ("structure", structure.as_str()),
    ],
  )
}

fn non_blank(s: Option<&str>) -> Option<&str> {
  s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn persona() -> Persona {
    seed_persona().unwrap()
  }

  #[test]
  fn prompt_names_persona_and_level() {
    let out = build_system_prompt(&persona(), &StudentProfile::with_level(Some("B1".into())));
    assert!(out.starts_with("You are Sr. Mastrius"));
    assert!(out.contains("- Level: B1"));
    assert!(out.contains("speak to a CEFR B1 learner"));
    assert!(!out.contains('{'), "unfilled placeholder in: {out}");
  }

  #[test]
  fn defaults_apply_for_missing_profile_fields() {
    let out = build_system_prompt(&persona(), &StudentProfile::with_level(Some("  ".into())));
    assert!(out.contains("- Name: New Learner"));
    assert!(out.contains("- Level: A1"));
    assert!(out.contains("- Focus Areas: General Improvement"));
    assert!(out.contains("- Theme: Conversation"));
    assert!(!out.contains("Pain:"));
  }

  #[test]
  fn intake_line_only_when_present() {
    let profile = StudentProfile {
      name: Some("Ana".into()),
      intake: Some(IntakeData {
        pain_point: "freezes in meetings".into(),
        dream_scenario: "presenting abroad".into(),
        motivation: "promotion".into(),
      }),
      ..Default::default()
    };
    let out = build_system_prompt(&persona(), &profile);
    assert!(out.contains("Pain: freezes in meetings | Dream: presenting abroad | Motivation: promotion"));
  }
}
