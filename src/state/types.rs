//! State types for tracking sync progress
//!
//! The document is Singer-compatible:
//! `{"bookmarks": {"<stream>": {"<key>": "<value>"}}, "currently_syncing": "<stream>"}`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Bookmarks for one stream, keyed by replication key
pub type StreamBookmarks = BTreeMap<String, Value>;

/// Complete state for a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Per-stream bookmarks
    #[serde(default)]
    pub bookmarks: BTreeMap<String, StreamBookmarks>,

    /// Stream that was in progress when the state was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currently_syncing: Option<String>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bookmark value for a stream and key, if one is stored as a string
    pub fn get_bookmark(&self, stream: &str, key: &str) -> Option<&str> {
        self.bookmarks.get(stream)?.get(key)?.as_str()
    }

    /// Store a bookmark value
    pub fn set_bookmark(&mut self, stream: &str, key: &str, value: impl Into<String>) {
        self.bookmarks
            .entry(stream.to_string())
            .or_default()
            .insert(key.to_string(), Value::String(value.into()));
    }

    /// Drop every bookmark of a stream
    pub fn clear_stream(&mut self, stream: &str) {
        self.bookmarks.remove(stream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_default() {
        let state = State::new();
        assert!(state.bookmarks.is_empty());
        assert!(state.currently_syncing.is_none());
    }

    #[test]
    fn test_state_bookmark() {
        let mut state = State::new();
        assert!(state.get_bookmark("eo_open", "timestamp").is_none());

        state.set_bookmark("eo_open", "timestamp", "2024-01-01T00:00:00Z");
        assert_eq!(
            state.get_bookmark("eo_open", "timestamp"),
            Some("2024-01-01T00:00:00Z")
        );
        assert!(state.get_bookmark("eo_click", "timestamp").is_none());
    }

    #[test]
    fn test_state_singer_format() {
        let mut state = State::new();
        state.set_bookmark("eo_open", "timestamp", "2024-01-01T00:00:00Z");
        state.currently_syncing = Some("eo_click".to_string());

        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({
                "bookmarks": {"eo_open": {"timestamp": "2024-01-01T00:00:00Z"}},
                "currently_syncing": "eo_click"
            })
        );
    }

    #[test]
    fn test_state_tolerates_missing_and_foreign_values() {
        let state: State = serde_json::from_str("{}").unwrap();
        assert!(state.bookmarks.is_empty());

        let state: State =
            serde_json::from_str(r#"{"bookmarks": {"eo_open": {"timestamp": 12}}}"#).unwrap();
        assert!(state.get_bookmark("eo_open", "timestamp").is_none());
    }
}
