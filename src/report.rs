//! Report extraction: turns a normalized assessment into a `StructuredReport`.
//!
//! The evaluate prompt asks the model to answer with one labeled line per
//! field. The label texts below are shared with `prompt.rs`; both sides are
//! tested together at the bottom of this file.
//!
//! Extraction never fails. Each label is matched independently (order,
//! surrounding prose and extra labels do not matter) and a missing label
//! falls back to a sentinel value.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::domain::{StructuredReport, Verdict, UNKNOWN_COMPLEXITY, UNKNOWN_NOTE};

pub const CORRECTNESS_LABEL: &str = "Correctness";
pub const TIME_LABEL: &str = "Time complexity";
pub const SPACE_LABEL: &str = "Space complexity";

struct LabelPatterns {
  correctness: Regex,
  time: Regex,
  space: Regex,
}

fn patterns() -> &'static LabelPatterns {
  static PATTERNS: OnceLock<LabelPatterns> = OnceLock::new();
  PATTERNS.get_or_init(|| LabelPatterns {
    correctness: label_regex(r"correct(?:ness)?"),
    time: label_regex(r"time[ \t]+complexity"),
    space: label_regex(r"space[ \t]+complexity"),
  })
}

// Case-insensitive, anchored at a line start, captures the rest of the line.
fn label_regex(label: &str) -> Regex {
  let pattern = format!(r"(?im)^[ \t]*{label}[ \t]*:[ \t]*(.*)$");
  Regex::new(&pattern).unwrap_or_else(|e| panic!("invalid built-in label pattern {pattern:?}: {e}"))
}

fn capture(re: &Regex, text: &str) -> Option<String> {
  re.captures(text)
    .and_then(|c| c.get(1))
    .map(|m| m.as_str().trim().to_string())
    .filter(|s| !s.is_empty())
}

/// Lossy binary verdict: anything mentioning "yes" or "correct" counts as yes.
pub fn derive_verdict(note: &str) -> Verdict {
  let lower = note.to_lowercase();
  if lower.contains("yes") || lower.contains("correct") {
    Verdict::Yes
  } else {
    Verdict::No
  }
}

#[instrument(level = "debug", skip(normalized), fields(text_len = normalized.len()))]
pub fn extract(normalized: &str) -> StructuredReport {
  let p = patterns();

  let note = capture(&p.correctness, normalized);
  let time = capture(&p.time, normalized);
  let space = capture(&p.space, normalized);

  if note.is_none() || time.is_none() || space.is_none() {
    debug!(
      target: "session",
      has_correctness = note.is_some(),
      has_time = time.is_some(),
      has_space = space.is_some(),
      "Assessment is missing labels; using defaults"
    );
  }

  // Absence yields "no", never a third state.
  let is_correct = note.as_deref().map(derive_verdict).unwrap_or(Verdict::No);

  StructuredReport {
    is_correct,
    correctness_note: note.unwrap_or_else(|| UNKNOWN_NOTE.into()),
    time_complexity: time.unwrap_or_else(|| UNKNOWN_COMPLEXITY.into()),
    space_complexity: space.unwrap_or_else(|| UNKNOWN_COMPLEXITY.into()),
  }
}
