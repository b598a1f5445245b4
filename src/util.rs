//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// Values are inserted in a single left-to-right pass, so a value that itself
/// contains `{key}` text is never expanded again.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let replaced = after.find('}').and_then(|close| {
      let key = &after[..close];
      pairs
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| (*v, close))
    });
    match replaced {
      Some((value, close)) => {
        out.push_str(value);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge prompts or model answers.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}

/// Longest run of consecutive backticks in `s`.
pub fn longest_backtick_run(s: &str) -> usize {
  let mut best = 0;
  let mut current = 0;
  for ch in s.chars() {
    if ch == '`' {
      current += 1;
      best = best.max(current);
    } else {
      current = 0;
    }
  }
  best
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_known_keys_only() {
    let out = fill_template("a {x} b {y} c {z}", &[("x", "1"), ("y", "2")]);
    assert_eq!(out, "a 1 b 2 c {z}");
  }

  #[test]
  fn fill_template_does_not_expand_inserted_values() {
    let out = fill_template("Q: {question}\nC: {code}", &[("question", "uses {code}"), ("code", "x")]);
    assert_eq!(out, "Q: uses {code}\nC: x");
  }

  #[test]
  fn fill_template_keeps_unbalanced_braces() {
    assert_eq!(fill_template("fn main() {", &[("x", "1")]), "fn main() {");
  }

  #[test]
  fn trunc_for_log_respects_char_boundaries() {
    let s = "ééééé";
    let t = trunc_for_log(s, 2);
    assert!(t.starts_with("éé…"));
    assert_eq!(trunc_for_log("short", 10), "short");
  }

  #[test]
  fn longest_backtick_run_counts_fences() {
    assert_eq!(longest_backtick_run("no ticks"), 0);
    assert_eq!(longest_backtick_run("a `b` ```c``` ``d"), 3);
  }
}
