//! CLI command definitions for the `recall` binary.
//!
//! Uses clap derive macros. Every command opens the engine against the data
//! directory, runs, and shuts the engine down so background work and state
//! are flushed before exit.

pub mod context;
pub mod graph;
pub mod memory;
pub mod session;
pub mod status;
pub mod temporal;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Long-term memory and context assembly for conversational agents.
#[derive(Parser)]
#[command(name = "recall", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory (defaults to $RECALL_DATA_DIR or ~/.recall).
    #[arg(long, global = true, env = "RECALL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Context budget tier used by `context`.
    #[arg(long, global = true)]
    pub tier: Option<String>,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a throwaway directory with an in-memory vector index.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Export tracing spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Detailed logging on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Assemble the memory context for a query.
    Context {
        /// The user query.
        query: String,

        /// System prompt placed first in the context.
        #[arg(long)]
        system: Option<String>,
    },

    /// Append a message to the working buffer.
    Say {
        /// Speaker: user, assistant or system.
        role: String,

        /// Message text.
        content: String,
    },

    /// Store a long-term memory.
    Remember {
        /// Memory text.
        content: String,

        /// Memory type: conversation, fact, preference, insight or semantic.
        #[arg(long = "type", default_value = "fact")]
        memory_type: String,

        /// Importance in 0.0..=1.0.
        #[arg(long, default_value = "0.5")]
        importance: f64,

        /// Store even if the promotion policy would reject it.
        #[arg(long)]
        force: bool,

        /// Comma-separated topic tags.
        #[arg(long, value_delimiter = ',')]
        topics: Vec<String>,
    },

    /// Run decay consolidation and episodic-to-semantic generalization.
    Consolidate,

    /// Evict low-value memories.
    Evict {
        /// Report candidates without deleting.
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect the knowledge graph.
    Graph {
        #[command(subcommand)]
        action: graph::GraphCommand,
    },

    /// Resolve a time expression to a date filter.
    #[command(name = "parse-date")]
    ParseDate {
        /// Text containing a time expression.
        text: String,

        /// Evaluate relative to this day instead of today (YYYY-MM-DD).
        #[arg(long)]
        today: Option<chrono::NaiveDate>,
    },

    /// Archive the current conversation and start a new session.
    #[command(name = "end-session")]
    EndSession,

    /// Show engine status.
    Status,
}
