//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// No nested or conditional logic.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Case-insensitive comparison after trimming both sides.
pub fn loose_eq(a: &str, b: &str) -> bool {
  a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Student login handle: lowercase name with all whitespace removed.
pub fn login_slug(name: &str) -> String {
  name.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect()
}

/// Log-safe truncation for large strings (char-boundary aware).
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_replaces_every_occurrence() {
    let out = fill_template("{a}-{b}-{a}", &[("a", "x"), ("b", "y")]);
    assert_eq!(out, "x-y-x");
  }

  #[test]
  fn loose_eq_ignores_case_and_padding() {
    assert!(loose_eq("Go", "go"));
    assert!(loose_eq(" go ", "go"));
    assert!(!loose_eq("goes", "go"));
  }

  #[test]
  fn slug_strips_whitespace() {
    assert_eq!(login_slug("Ana  Maria\tSouza"), "anamariasouza");
  }

  #[test]
  fn truncation_respects_multibyte_chars() {
    let s = "ção".repeat(10);
    let out = trunc_for_log(&s, 4);
    assert!(out.starts_with("ção"));
    assert!(out.contains("bytes total"));
  }
}
