//! recall CLI entry point.
//!
//! Binary name: `recall`
//!
//! Parses CLI arguments, opens the context engine against the data directory,
//! then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use recall_observe::tracing_setup::{init_tracing, shutdown_tracing, verbosity_directive};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(verbosity_directive(cli.verbose), cli.otel) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Date parsing doesn't need engine state
    if let Commands::ParseDate { text, today } = &cli.command {
        return cli::temporal::parse_date(text, *today, cli.json);
    }

    let state = AppState::init(cli.data_dir, cli.ephemeral).await?;
    let json = cli.json;

    let result = match cli.command {
        Commands::Context { query, system } => {
            cli::context::build_context(&state, &query, cli.tier.as_deref(), system.as_deref(), json)
                .await
        }
        Commands::Say { role, content } => cli::session::say(&state, &role, &content, json).await,
        Commands::Remember {
            content,
            memory_type,
            importance,
            force,
            topics,
        } => {
            cli::memory::remember(&state, &content, &memory_type, importance, force, topics, json)
                .await
        }
        Commands::Consolidate => cli::memory::consolidate(&state, json).await,
        Commands::Evict { dry_run } => cli::memory::evict(&state, dry_run, json).await,
        Commands::Graph { action } => cli::graph::run(&state, action, json).await,
        Commands::EndSession => cli::session::end_session(&state, json).await,
        Commands::Status => cli::status::status(&state, json).await,
        Commands::ParseDate { .. } => unreachable!("handled above"),
    };

    // Persist even when the command failed; report the command error first.
    let closed = state.close().await;
    result.and(closed)
}
