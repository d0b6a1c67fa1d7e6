//! Built-in content that keeps the app useful without external data files:
//! a seed question bank, a default persona, and the SPIN intake questions.

use crate::bank::QuestionBank;
use crate::persona::Persona;

const SEED_BANK_JSON: &str = include_str!("../data/questions.json");
const SEED_PERSONA_JSON: &str = include_str!("../data/teacher-brain.json");

/// One intake (SPIN selling) question shown before the placement test.
#[derive(Clone, Copy, Debug, serde::Serialize)]
pub struct IntakeQuestion {
  pub key: &'static str,
  pub q: &'static str,
}

/// Situation, Problem, Implication, Need, asked in this order.
pub const SPIN_QUESTIONS: [IntakeQuestion; 4] = [
  IntakeQuestion {
    key: "situation",
    q: "Qual é sua situação atual com o inglês? (rotina, uso no trabalho/viagem)",
  },
  IntakeQuestion {
    key: "problem",
    q: "O que mais te trava quando tenta usar ou estudar inglês?",
  },
  IntakeQuestion {
    key: "implication",
    q: "Como isso tem impactado seu trabalho, estudos ou oportunidades?",
  },
  IntakeQuestion {
    key: "need",
    q: "Se você resolvesse isso nos próximos meses, o que mudaria pra você?",
  },
];

pub fn intake_question(key: &str) -> Option<&'static IntakeQuestion> {
  SPIN_QUESTIONS.iter().find(|q| q.key == key)
}

/// Seed bank compiled into the binary.
pub fn seed_bank() -> Result<QuestionBank, String> {
  QuestionBank::from_json(SEED_BANK_JSON).map_err(|e| format!("built-in question bank: {e}"))
}

/// Default coach persona compiled into the binary.
pub fn seed_persona() -> Result<Persona, String> {
  serde_json::from_str(SEED_PERSONA_JSON).map_err(|e| format!("built-in persona: {e}"))
}
