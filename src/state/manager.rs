//! State manager implementation
//!
//! Provides file-based state persistence with atomic writes.

use super::types::State;
use crate::error::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// State manager for reading, updating and persisting bookmarks
#[derive(Debug)]
pub struct StateManager {
    /// Path to the state file (empty for in-memory)
    path: PathBuf,
    /// Current state
    state: Arc<RwLock<State>>,
}

impl StateManager {
    /// Create a state manager that writes to `path`, starting empty
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: Arc::new(RwLock::new(State::new())),
        }
    }

    /// Create an in-memory state manager (no file persistence)
    pub fn in_memory() -> Self {
        Self::with_state(State::new())
    }

    /// Create an in-memory state manager seeded with `state`
    pub fn with_state(state: State) -> Self {
        Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Create a state manager from a file, loading existing state if present
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::state(format!("Failed to read state file: {e}")))?;
            if contents.trim().is_empty() {
                State::new()
            } else {
                serde_json::from_str(&contents)
                    .map_err(|e| Error::state(format!("Failed to parse state file: {e}")))?
            }
        } else {
            State::new()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Create a state manager from inline JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let state: State = serde_json::from_str(json)
            .map_err(|e| Error::state(format!("Failed to parse state JSON: {e}")))?;
        Ok(Self::with_state(state))
    }

    /// Bookmark for a stream and key, or `default` when none is stored
    pub async fn get_bookmark(&self, stream: &str, key: &str, default: &str) -> String {
        let state = self.state.read().await;
        state
            .get_bookmark(stream, key)
            .unwrap_or(default)
            .to_string()
    }

    /// Update a bookmark in memory. Call [`StateManager::persist`] to make it durable.
    pub async fn set_bookmark(&self, stream: &str, key: &str, value: impl Into<String>) {
        let mut state = self.state.write().await;
        state.set_bookmark(stream, key, value);
    }

    /// Stream recorded as in progress
    pub async fn currently_syncing(&self) -> Option<String> {
        self.state.read().await.currently_syncing.clone()
    }

    /// Record (or clear) the stream in progress
    pub async fn set_currently_syncing(&self, stream: Option<&str>) {
        let mut state = self.state.write().await;
        state.currently_syncing = stream.map(ToString::to_string);
    }

    /// Write the state to its file (when file-backed) and return the
    /// persisted document
    pub async fn persist(&self) -> Result<Value> {
        let snapshot = self.snapshot().await?;

        if !self.is_in_memory() {
            write_atomic(&self.path, &snapshot).await?;
            debug!("State written to {}", self.path.display());
        }

        Ok(snapshot)
    }

    /// Current state as JSON
    pub async fn snapshot(&self) -> Result<Value> {
        let state = self.state.read().await;
        serde_json::to_value(&*state)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))
    }

    /// Save state to a specific file path
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.snapshot().await?;
        write_atomic(path.as_ref(), &snapshot).await
    }

    /// Get a read lock on the current state
    pub async fn state(&self) -> tokio::sync::RwLockReadGuard<'_, State> {
        self.state.read().await
    }

    /// Export state as pretty-printed JSON string
    pub async fn to_json_pretty(&self) -> Result<String> {
        let state = self.state.read().await;
        serde_json::to_string_pretty(&*state)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))
    }

    /// Get the state file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if using in-memory mode
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

/// Write to a temp file first, then rename over the target
async fn write_atomic(path: &Path, value: &Value) -> Result<()> {
    let contents = serde_json::to_string_pretty(value)
        .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))?;

    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, &contents)
        .await
        .map_err(|e| Error::state(format!("Failed to write state file: {e}")))?;

    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| Error::state(format!("Failed to rename state file: {e}")))?;

    Ok(())
}
