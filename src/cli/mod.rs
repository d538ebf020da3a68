//! CLI module
//!
//! # Commands
//!
//! - `sync` - Run export and full-table streams
//! - `streams` - List stream names

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::Runner;
