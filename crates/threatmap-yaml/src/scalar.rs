//! Scalar rendering and reading for in-place YAML edits.
//!
//! Values written by the patch engine go through [`Value::render`], which
//! quotes a string only when the plain form would be read back as something
//! else (a number, a boolean, a comment, a nested mapping).

use std::{fmt, sync::LazyLock};

use regex::Regex;

static NUMERIC_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?(\.inf|\.Inf|\.INF|\.nan|\.NaN|\.NAN|0x[0-9a-fA-F_]+|0o[0-7_]+|0b[01_]+|[0-9][0-9_]*(\.[0-9_]*)?([eE][-+]?[0-9]+)?|\.[0-9_]+([eE][-+]?[0-9]+)?)$")
        .expect("valid regex")
});

const RESERVED_WORDS: &[&str] = &[
    "~", "null", "true", "false", "yes", "no", "on", "off", "y", "n",
];

const LEADING_INDICATORS: &[char] = &[
    '-', '?', ':', ',', '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '"', '%', '@',
    '`',
];

/// A value the patch engine can write into a field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A string scalar, quoted only when needed.
    Text(String),
    /// A number, written unquoted. Integral values drop the fraction.
    Number(f64),
    /// A list of refs, written as an inline flow sequence.
    List(Vec<String>),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Renders the value as it appears after `key: `.
    pub fn render(&self) -> String {
        match self {
            Value::Text(s) => quote_if_needed(s),
            Value::Number(n) => format_number(*n),
            Value::List(items) => render_flow_list(items),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

/// Formats a number the way a person would type it: `200`, not `200.0`.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else if n.is_nan() {
        ".nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { ".inf" } else { "-.inf" }.to_string()
    } else {
        format!("{n}")
    }
}

/// Returns `true` if `s` must be quoted to read back as the same string.
pub fn needs_quotes(s: &str) -> bool {
    if s.is_empty() || s.trim() != s {
        return true;
    }
    if s.starts_with(LEADING_INDICATORS) {
        return true;
    }
    if s.contains(": ") || s.contains(" #") || s.ends_with(':') {
        return true;
    }
    if s.chars().any(|c| c.is_control()) {
        return true;
    }
    let lowered = s.to_ascii_lowercase();
    RESERVED_WORDS.contains(&lowered.as_str()) || NUMERIC_LIKE.is_match(s)
}

pub fn quote_if_needed(s: &str) -> String {
    if needs_quotes(s) {
        double_quote(s)
    } else {
        s.to_string()
    }
}

fn double_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Renders one element of a flow sequence.
///
/// Flow context reserves `,` and brackets in addition to the block rules.
pub fn render_flow_element(s: &str) -> String {
    if needs_quotes(s) || s.contains([',', '[', ']', '{', '}']) {
        double_quote(s)
    } else {
        s.to_string()
    }
}

pub fn render_flow_list(items: &[String]) -> String {
    let parts: Vec<String> = items.iter().map(|s| render_flow_element(s)).collect();
    format!("[{}]", parts.join(", "))
}

/// Strips one level of YAML quoting from a raw scalar.
pub fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        let inner = &raw[1..raw.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        out
    } else if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        raw[1..raw.len() - 1].replace("''", "'")
    } else {
        raw.to_string()
    }
}

/// Splits a raw value into `(value, comment)`, where `comment` keeps its
/// leading whitespace (`"  # note"`). Quote-aware.
pub fn split_comment(raw: &str) -> (&str, &str) {
    let bytes = raw.as_bytes();
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    for (idx, &b) in bytes.iter().enumerate() {
        if in_double {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_double = false,
                _ => {}
            }
            continue;
        }
        if in_single {
            if b == b'\'' {
                in_single = false;
            }
            continue;
        }
        match b {
            b'"' => in_double = true,
            b'\'' => in_single = true,
            b'#' if idx == 0 || bytes[idx - 1].is_ascii_whitespace() => {
                let value_end = raw[..idx].trim_end().len();
                return (&raw[..value_end], &raw[value_end..]);
            }
            _ => {}
        }
    }
    (raw.trim_end(), &raw[raw.trim_end().len()..])
}

/// Splits the inside of a flow sequence (`a, "b", c`) into raw elements.
pub fn split_flow_elements(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    for (idx, c) in inner.char_indices() {
        if in_double {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_double = false,
                _ => {}
            }
            continue;
        }
        match c {
            '\'' => in_single = !in_single,
            '"' if !in_single => in_double = true,
            ',' if !in_single => {
                parts.push(inner[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    let last = inner[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts.retain(|p| !p.is_empty());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_are_unquoted() {
        assert_eq!(Value::Number(200.0).render(), "200");
        assert_eq!(Value::Number(-15.0).render(), "-15");
        assert_eq!(Value::Number(12.5).render(), "12.5");
    }

    #[test]
    fn test_quoting_rules() {
        assert_eq!(quote_if_needed("API Gateway"), "API Gateway");
        assert_eq!(quote_if_needed("api->db"), "api->db");
        assert_eq!(quote_if_needed(""), "\"\"");
        assert_eq!(quote_if_needed("200"), "\"200\"");
        assert_eq!(quote_if_needed("1e3"), "\"1e3\"");
        assert_eq!(quote_if_needed("yes"), "\"yes\"");
        assert_eq!(quote_if_needed("Null"), "\"Null\"");
        assert_eq!(quote_if_needed("key: value"), "\"key: value\"");
        assert_eq!(quote_if_needed("see #4"), "\"see #4\"");
        assert_eq!(quote_if_needed("issue#4"), "issue#4");
        assert_eq!(quote_if_needed(" padded"), "\" padded\"");
        assert_eq!(quote_if_needed("-leading"), "\"-leading\"");
        assert_eq!(quote_if_needed("say \"hi\""), "say \"hi\"");
        assert_eq!(quote_if_needed("*star"), "\"*star\"");
    }

    #[test]
    fn test_flow_list() {
        let items = vec!["a".to_string(), "b,c".to_string(), "T01".to_string()];
        assert_eq!(render_flow_list(&items), r#"[a, "b,c", T01]"#);
        assert_eq!(render_flow_list(&[]), "[]");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote(r#""say \"hi\"""#), r#"say "hi""#);
        assert_eq!(unquote("'it''s'"), "it's");
        assert_eq!(unquote("  plain  "), "plain");
    }

    #[test]
    fn test_split_comment() {
        assert_eq!(split_comment("api  # the api"), ("api", "  # the api"));
        assert_eq!(split_comment("\"a # b\" # c"), ("\"a # b\"", " # c"));
        assert_eq!(split_comment("issue#4"), ("issue#4", ""));
        assert_eq!(split_comment("value   "), ("value", "   "));
    }

    #[test]
    fn test_split_flow_elements() {
        assert_eq!(split_flow_elements(" a, 'b, c' ,\"d\" "), vec!["a", "'b, c'", "\"d\""]);
        assert!(split_flow_elements("  ").is_empty());
    }
}
