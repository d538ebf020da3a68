//! State management module
//!
//! Handles bookmark tracking, checkpointing, and resumability.
//! State is persisted between sync runs to enable incremental syncs.
//!
//! # Overview
//!
//! The state module provides:
//! - `State` - Singer-compatible bookmarks plus the stream in progress
//! - `StateManager` - File-based state persistence
//! - Checkpointing after every export window

mod manager;
mod types;

pub use manager::StateManager;
pub use types::{State, StreamBookmarks};
