//! Path templates
//!
//! Endpoint paths carry `{{ name }}` placeholders, e.g.
//! `v2/logs/{{ request_handle }}/` or `v1/app/{{ branch_key }}`.
//! Values are percent-encoded as single path segments.

use crate::error::{Error, Result};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}\}").expect("valid placeholder regex")
});

/// Named values substituted into a path template
#[derive(Debug, Clone, Default)]
pub struct PathParams {
    values: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Substitute every placeholder; unknown names are an error
pub fn render_path(template: &str, params: &PathParams) -> Result<String> {
    let mut missing = Vec::new();

    let rendered = PLACEHOLDER_REGEX.replace_all(template, |caps: &Captures<'_>| {
        let name = &caps[1];
        match params.get(name) {
            Some(value) => encode_segment(value),
            None => {
                missing.push(name.to_string());
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(Error::undefined_var(missing.join(", ")))
    }
}

/// Placeholder names in order of appearance
pub fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER_REGEX
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn encode_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_request_handle() {
        let params = PathParams::new().with("request_handle", "abc-123");
        assert_eq!(
            render_path("v2/logs/{{ request_handle }}/", &params).unwrap(),
            "v2/logs/abc-123/"
        );
    }

    #[test]
    fn test_whitespace_variants() {
        let params = PathParams::new().with("branch_key", "key_live_x");
        assert_eq!(render_path("v1/app/{{branch_key}}", &params).unwrap(), "v1/app/key_live_x");
        assert_eq!(render_path("v1/app/{{  branch_key }}", &params).unwrap(), "v1/app/key_live_x");
    }

    #[test]
    fn test_values_are_encoded_as_one_segment() {
        let params = PathParams::new().with("request_handle", "a/b c");
        assert_eq!(
            render_path("v2/logs/{{ request_handle }}/", &params).unwrap(),
            "v2/logs/a%2Fb%20c/"
        );
    }

    #[test]
    fn test_missing_value_is_error() {
        let err = render_path("v2/logs/{{ request_handle }}/", &PathParams::new()).unwrap_err();
        assert!(err.to_string().contains("request_handle"));
    }

    #[test]
    fn test_no_placeholders() {
        assert_eq!(render_path("v2/logs/", &PathParams::new()).unwrap(), "v2/logs/");
        assert!(placeholders("v2/logs/").is_empty());
        assert_eq!(placeholders("v1/app/{{ branch_key }}"), vec!["branch_key"]);
    }
}
