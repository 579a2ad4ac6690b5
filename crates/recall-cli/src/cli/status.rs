//! Engine status dashboard.

use anyhow::Result;
use console::style;

use crate::state::AppState;

/// Display working buffer, episodic store and graph status.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let status = state.engine.status().await?;

    if json {
        let output = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "ephemeral": state.ephemeral,
            "status": status,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  {} recall v{}", style("◆").bold(), env!("CARGO_PKG_VERSION"));
    println!("  {}", style(state.data_dir.display()).dim());
    if state.ephemeral {
        println!("  {}", style("ephemeral: nothing will be kept").yellow());
    }
    println!();

    println!("  {}", style("── Session ──").dim());
    println!("  Id:       {}", style(&status.session_id).cyan());
    println!("  Messages: {}", status.working_messages);
    println!("  Turns:    {}", style(status.turn_count).bold());
    println!();

    println!("  {}", style("── Long-term Memory ──").dim());
    println!("  Total:     {}", style(status.episodic.total).bold());
    for (memory_type, count) in &status.episodic.by_type {
        println!("    {:<12} {}", memory_type, count);
    }
    println!("  Preserved: {}", style(status.episodic.preserved).green());
    println!(
        "  Pending access updates: {}",
        status.episodic.pending_access_updates
    );
    println!();

    println!("  {}", style("── Knowledge Graph ──").dim());
    println!("  Entities:  {}", style(status.graph.total_entities).bold());
    println!("  Relations: {}", style(status.graph.total_relations).bold());
    if status.background_tasks > 0 {
        println!();
        println!("  Background tasks: {}", status.background_tasks);
    }
    println!();
    Ok(())
}
