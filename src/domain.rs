//! Domain models: task kinds, difficulty rating, the structured report and the
//! record handed to the submission sink.

use serde::{Deserialize, Serialize};

/// Sentinel used for the correctness note when no verdict line was found.
pub const UNKNOWN_NOTE: &str = "unknown";
/// Sentinel used for complexity fields when no label was found.
pub const UNKNOWN_COMPLEXITY: &str = "Unknown";

/// What the text service is asked to do.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
  /// Produce one random coding question.
  #[default]
  Question,
  /// Assess a learner's code against a question.
  Evaluate,
}

/// Learner-declared difficulty, attached to every submission record.
/// Also reused as the level requested when generating a question.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  #[default]
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub fn as_str(self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

/// Binary verdict. Hedged answers ("partially correct") are forced into one side.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
  Yes,
  No,
}

/// Structured record derived from a normalized assessment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredReport {
  pub is_correct: Verdict,
  pub correctness_note: String,
  pub time_complexity: String,
  pub space_complexity: String,
}

impl Default for StructuredReport {
  fn default() -> Self {
    Self {
      is_correct: Verdict::No,
      correctness_note: UNKNOWN_NOTE.into(),
      time_complexity: UNKNOWN_COMPLEXITY.into(),
      space_complexity: UNKNOWN_COMPLEXITY.into(),
    }
  }
}

/// Normalized feedback text plus the report extracted from it.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
  pub feedback: String,
  pub report: StructuredReport,
}

/// Optional knobs for question generation.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct QuestionParams {
  #[serde(default)] pub topic: Option<String>,
  #[serde(default)] pub level: Option<Difficulty>,
  /// Replaces the configured question template entirely.
  #[serde(default)] pub instruction: Option<String>,
}

/// Payload written to the submission sink once per completed evaluation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
  pub question: String,
  pub code: String,
  pub report: StructuredReport,
  pub difficulty: Difficulty,
}
