//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Normalize an answer or option string for comparison:
/// lowercase, trimmed, inner whitespace runs collapsed to single spaces.
pub fn normalize_answer(s: &str) -> String {
  s.split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs and error messages with huge model payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while end > 0 && !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}

/// Strip a markdown code fence (``` or ```json) wrapper, if present.
pub fn strip_code_fence(s: &str) -> &str {
  let t = s.trim();
  let Some(rest) = t.strip_prefix("```") else { return t };
  // Drop the info string ("json", "JSON", ...) up to the first newline.
  let rest = match rest.find('\n') {
    Some(idx) => &rest[idx + 1..],
    None => rest,
  };
  rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Extract the first complete JSON array or object from free text.
///
/// Models wrap their JSON in prose or code fences often enough that a plain
/// `serde_json::from_str` on the whole reply is not reliable. We scan for the
/// first `[` or `{` and bracket-match to its closing delimiter, honoring
/// string literals and escapes.
pub fn extract_first_json(s: &str) -> Option<&str> {
  let s = strip_code_fence(s);
  let start = s.find(|c| c == '[' || c == '{')?;
  let bytes = s.as_bytes();
  let open = bytes[start];
  let close = if open == b'[' { b']' } else { b'}' };

  let mut depth = 0usize;
  let mut in_string = false;
  let mut escaped = false;
  for (i, &b) in bytes.iter().enumerate().skip(start) {
    if in_string {
      if escaped {
        escaped = false;
      } else if b == b'\\' {
        escaped = true;
      } else if b == b'"' {
        in_string = false;
      }
      continue;
    }
    match b {
      b'"' => in_string = true,
      _ if b == open => depth += 1,
      _ if b == close => {
        depth -= 1;
        if depth == 0 {
          return Some(&s[start..=i]);
        }
      }
      _ => {}
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_all_occurrences() {
    let out = fill_template("{n} of {n} at {place}", &[("n", "3"), ("place", "home")]);
    assert_eq!(out, "3 of 3 at home");
  }

  #[test]
  fn normalize_answer_collapses_case_and_whitespace() {
    assert_eq!(normalize_answer("  The  Mitochondria "), "the mitochondria");
    assert_eq!(normalize_answer("TRUE"), "true");
  }

  #[test]
  fn strip_code_fence_handles_info_string() {
    let fenced = "```json\n{\"a\": 1}\n```";
    assert_eq!(strip_code_fence(fenced), "{\"a\": 1}");
    assert_eq!(strip_code_fence("plain"), "plain");
  }

  #[test]
  fn extract_first_json_finds_array_in_prose() {
    let text = "Here are your questions:\n[{\"q\": \"a]b\"}, {\"q\": \"two\"}]\nEnjoy!";
    assert_eq!(
      extract_first_json(text),
      Some("[{\"q\": \"a]b\"}, {\"q\": \"two\"}]")
    );
  }

  #[test]
  fn extract_first_json_handles_nested_objects_and_escapes() {
    let text = "{\"outer\": {\"inner\": \"brace } quote \\\" here\"}} trailing";
    assert_eq!(
      extract_first_json(text),
      Some("{\"outer\": {\"inner\": \"brace } quote \\\" here\"}}")
    );
  }

  #[test]
  fn extract_first_json_returns_none_for_unbalanced_input() {
    assert_eq!(extract_first_json("no json here"), None);
    assert_eq!(extract_first_json("{\"open\": true"), None);
  }

  #[test]
  fn trunc_for_log_keeps_short_strings_intact() {
    assert_eq!(trunc_for_log("short", 10), "short");
    assert!(trunc_for_log(&"x".repeat(100), 10).contains("100 bytes total"));
  }
}
