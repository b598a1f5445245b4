//! Markdown normalization for model output.
//!
//! `normalize` turns markdown-flavoured text into plain prose and is
//! idempotent: `normalize(normalize(x)) == normalize(x)`. Steps run in an
//! order where no later step can re-create input for an earlier one.

use std::sync::OnceLock;

use regex::Regex;

/// Characters removed outright: headings, emphasis, inline code, quotes, rules.
const MARKUP_CHARS: &[char] = &['#', '*', '_', '`', '>', '-'];

fn link_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap_or_else(|e| panic!("invalid link pattern: {e}")))
}

fn blank_run_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap_or_else(|e| panic!("invalid newline pattern: {e}")))
}

pub fn normalize(text: &str) -> String {
  let mut out: String = text.chars().filter(|c| !MARKUP_CHARS.contains(c)).collect();

  // Collapsing one link can expose another (`[[a](b)](c)`), so run to a fixpoint.
  // Every replacement shortens the string, which bounds the loop.
  loop {
    let next = link_re().replace_all(&out, "$1");
    if next == out {
      break;
    }
    out = next.into_owned();
  }

  let out = out.replace("\r\n", "\n").replace('\r', "\n");
  let out = blank_run_re().replace_all(&out, "\n\n");
  out.trim().to_string()
}
