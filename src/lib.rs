// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]

//! # Branch export connector
//!
//! Pulls marketing-attribution event data out of Branch through its
//! asynchronous export API and writes it as Singer messages.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use branch_export::config::TapConfig;
//! use branch_export::engine::SyncEngine;
//! use branch_export::http::HttpClient;
//! use branch_export::output::JsonLinesSink;
//! use branch_export::state::StateManager;
//! use branch_export::streams::find_stream;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> branch_export::Result<()> {
//!     let config = TapConfig::from_file("config.json")?;
//!     let http = Arc::new(HttpClient::with_config(config.http_config()?)?);
//!     let state = StateManager::from_file("state.json")?;
//!
//!     let mut engine = SyncEngine::new(http, config.credentials(), state)
//!         .with_config(config.sync_config()?);
//!     let mut sink = JsonLinesSink::stdout();
//!
//!     let stream = find_stream("eo_open")?;
//!     engine
//!         .sync_export_stream(&stream, config.start_date()?, true, &mut sink)
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         SyncEngine                           │
//! │  readiness → create job → poll → decode → advance bookmark   │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//! ┌───────────┬──────────────┬───┴────────┬───────────┬──────────┐
//! │  Export   │    HTTP      │   Decode   │  State    │  Output  │
//! ├───────────┼──────────────┼────────────┼───────────┼──────────┤
//! │ Readiness │ GET/POST     │ gzip       │ Bookmarks │ SCHEMA   │
//! │ Create    │ Classify     │ JSON Lines │ Atomic    │ RECORD   │
//! │ Poll      │ Retry/backoff│ Streaming  │ writes    │ STATE    │
//! └───────────┴──────────────┴────────────┴───────────┴──────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types and the HTTP status taxonomy
pub mod error;

/// Common types and datetime helpers
pub mod types;

/// HTTP client with classification, retry and rate limiting
pub mod http;

/// Export job protocol
pub mod export;

/// Gzip JSON Lines result decoding
pub mod decode;

/// Bookmark state and persistence
pub mod state;

/// Stream schemas, field lists and record transformation
pub mod schema;

/// Stream catalog
pub mod streams;

/// Message sinks
pub mod output;

/// Main execution engine
pub mod engine;

/// Connector configuration
pub mod config;

/// Request timers and record counters
pub mod metrics;

/// Path template interpolation
pub mod template;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
