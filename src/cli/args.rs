//! Command-line argument parsing for the router
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use crate::router::RequestKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// localai-router - Route AI requests to local services with deterministic fallbacks
#[derive(Parser, Debug)]
#[command(name = "localai-router")]
#[command(version)]
#[command(about = "Prefer local AI services, fall back when they are not there", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: default (info), -v (debug), -vv (trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect local capabilities and print the deployment profile
    Detect,

    /// Probe every service once and print its status
    Health,

    /// Generate text for a prompt
    Ask {
        /// Prompt text
        prompt: String,

        /// Model to use instead of automatic selection
        #[arg(short, long)]
        model: Option<String>,

        /// Print tokens as they arrive (local inference only)
        #[arg(long)]
        stream: bool,
    },

    /// Embed one or more texts
    Embed {
        /// Texts to embed
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Semantic search over a collection
    Search {
        /// Query text
        query: String,

        /// Collection name
        #[arg(long)]
        collection: Option<String>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// JSON file of documents for the offline search
        #[arg(long)]
        documents: Option<PathBuf>,
    },

    /// Analyze a piece of text
    Analyze {
        /// Text to analyze
        text: String,
    },

    /// Route a raw request of any kind
    Route {
        /// Request kind (generation, embedding, vector-search, semantic-analysis)
        kind: RequestKind,

        /// Request input
        input: String,
    },

    /// Manage state snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommand),

    /// Run monitoring, model refresh and scheduled snapshots until Ctrl-C
    Run,

    /// Display current configuration
    Config {
        /// Write the default configuration file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Snapshot subcommands
#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Capture the current runtime state if it changed
    Capture,

    /// Capture a state unconditionally
    Manual {
        /// Why the snapshot is taken
        #[arg(short, long)]
        reason: String,

        /// JSON file to snapshot instead of the runtime state
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Record the snapshot as taken before a migration
        #[arg(long)]
        pre_migration: bool,
    },

    /// List stored snapshots, oldest first
    List,

    /// Remove a stored snapshot
    Delete {
        /// Snapshot id
        id: String,
    },

    /// Print or write out a stored state
    Restore {
        /// Snapshot id
        id: String,

        /// Write the state here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
