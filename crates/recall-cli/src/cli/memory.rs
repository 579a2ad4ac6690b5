//! Long-term memory commands: remember, consolidate, evict.

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use recall_core::memory::episodic::{AddOutcome, NewMemory};
use recall_types::memory::MemoryType;

use crate::state::AppState;

/// Offer a memory to the episodic store.
///
/// # Examples
///
/// ```bash
/// recall remember "prefers window seats" --type preference --importance 0.7
/// recall remember "passport expires 2027-03" --force
/// ```
pub async fn remember(
    state: &AppState,
    content: &str,
    memory_type: &str,
    importance: f64,
    force: bool,
    topics: Vec<String>,
    json: bool,
) -> Result<()> {
    let memory_type: MemoryType = memory_type.parse().map_err(|e: String| anyhow!(e))?;
    if !(0.0..=1.0).contains(&importance) {
        bail!("importance must be between 0.0 and 1.0, got {importance}");
    }

    let mut memory = NewMemory::new(content, memory_type)
        .with_importance(importance)
        .with_topics(topics);
    memory.force = force;

    let outcome = state.engine.remember(memory, Utc::now()).await?;

    let (status, id) = match outcome {
        AddOutcome::Inserted(id) => ("inserted", Some(id)),
        AddOutcome::Merged(id) => ("merged", Some(id)),
        AddOutcome::Rejected => ("rejected", None),
    };

    if json {
        let output = serde_json::json!({ "status": status, "id": id });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match outcome {
        AddOutcome::Inserted(id) => println!(
            "  {} Stored {} memory {}",
            style("✓").green().bold(),
            memory_type,
            style(id).dim()
        ),
        AddOutcome::Merged(id) => println!(
            "  {} Already known; repetition recorded on {}",
            style("↺").cyan().bold(),
            style(id).dim()
        ),
        AddOutcome::Rejected => println!(
            "  {} Below the promotion threshold (use --force to store anyway)",
            style("✗").yellow().bold()
        ),
    }
    Ok(())
}

/// Run decay consolidation and, when a generator is configured, semantic
/// generalization.
pub async fn consolidate(state: &AppState, json: bool) -> Result<()> {
    let report = state.engine.consolidate(Utc::now()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("── Consolidation ──").dim());
    println!("  Checked:   {}", style(report.episodic.checked).bold());
    println!("  Deleted:   {}", style(report.episodic.deleted).red());
    println!("  Preserved: {}", style(report.episodic.preserved).green());
    println!("  Updated:   {}", report.episodic.surviving_updated);
    match &report.semantic {
        Some(semantic) => {
            println!();
            println!("  {}", style("── Semantic ──").dim());
            println!("  Groups:  {}", semantic.groups_considered);
            println!("  Created: {}", style(semantic.created).green());
            println!("  Merged:  {}", semantic.merged);
            println!("  Skipped: {}", semantic.skipped);
        }
        None => println!(
            "  {}",
            style("Semantic consolidation skipped (no generator configured)").dim()
        ),
    }
    if report.graph_weights_changed > 0 {
        println!("  Graph weights changed: {}", report.graph_weights_changed);
    }
    println!();
    Ok(())
}

/// Evict low-value memories, or list what would go with `--dry-run`.
pub async fn evict(state: &AppState, dry_run: bool, json: bool) -> Result<()> {
    let report = state.engine.evict(dry_run, Utc::now()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Total").fg(Color::White),
        Cell::new("Candidates").fg(Color::White),
        Cell::new(if dry_run { "Would evict" } else { "Evicted" }).fg(Color::White),
        Cell::new("Graph pruned").fg(Color::White),
    ]);
    table.add_row(vec![
        Cell::new(report.total),
        Cell::new(report.candidates).fg(Color::Yellow),
        Cell::new(report.evicted).fg(Color::Red),
        Cell::new(report.graph_entities_pruned).fg(Color::DarkGrey),
    ]);
    println!("{table}");

    if dry_run {
        for id in &report.evicted_ids {
            println!("    {}", style(id).dim());
        }
        println!();
        println!("  {}", style("Dry run: nothing was deleted.").dim());
    }
    println!();
    Ok(())
}
