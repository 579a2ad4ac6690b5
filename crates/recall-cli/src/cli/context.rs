//! `recall context`: assemble and print the memory context for a query.

use anyhow::Result;
use chrono::Utc;
use console::style;

use crate::state::AppState;

/// Build the context for `query` and print it with its assembly stats.
///
/// # Examples
///
/// ```bash
/// recall context "what did we plan last week?"
/// recall context "trip budget" --tier compact --json
/// ```
pub async fn build_context(
    state: &AppState,
    query: &str,
    tier: Option<&str>,
    system_prompt: Option<&str>,
    json: bool,
) -> Result<()> {
    let _turn = state.lock_turn().await;
    let (context, stats) = state
        .engine
        .build_context(query, tier, system_prompt, Utc::now())
        .await;

    if json {
        let output = serde_json::json!({
            "query": query,
            "tier": tier.unwrap_or(&state.engine.config().context.default_tier),
            "context": context,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{context}");
    println!();
    println!(
        "  {} {} sections, {} truncated, {} summarized, {} dropped ({} -> {} chars)",
        style("i").blue().bold(),
        stats.sections_added,
        stats.sections_truncated,
        stats.sections_summarized,
        stats.sections_dropped,
        stats.total_chars_raw,
        stats.total_chars_final,
    );
    Ok(())
}
