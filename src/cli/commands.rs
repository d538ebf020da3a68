//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Branch export connector
#[derive(Parser, Debug)]
#[command(name = "branch-export")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (JSON)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Inline config JSON
    #[arg(long, global = true)]
    pub config_json: Option<String>,

    /// State file (JSON), rewritten after every export window
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Inline state JSON
    #[arg(long, global = true)]
    pub state_json: Option<String>,

    /// Read stream schemas from this directory instead of the built-in ones
    #[arg(long, global = true)]
    pub schema_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync streams, writing Singer messages to stdout
    Sync {
        /// Streams to sync (comma-separated, empty = all)
        #[arg(long)]
        streams: Option<String>,

        /// Stop at the first failing stream
        #[arg(long)]
        fail_fast: bool,
    },

    /// List available stream names
    Streams,
}
