//! Knowledge graph inspection: stats, neighbors, path.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use recall_types::graph::Entity;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum GraphCommand {
    /// Entity and relation counts by type.
    Stats,

    /// Entities reachable from an entity.
    Neighbors {
        /// Entity id or display name.
        entity: String,

        /// Maximum number of hops.
        #[arg(long, default_value = "1")]
        depth: usize,
    },

    /// Shortest relation path between two entities.
    Path {
        /// Start entity id or display name.
        from: String,

        /// End entity id or display name.
        to: String,

        /// Maximum number of hops (defaults to the configured graph depth).
        #[arg(long)]
        max_depth: Option<usize>,
    },
}

pub async fn run(state: &AppState, command: GraphCommand, json: bool) -> Result<()> {
    match command {
        GraphCommand::Stats => stats(state, json),
        GraphCommand::Neighbors { entity, depth } => neighbors(state, &entity, depth, json),
        GraphCommand::Path { from, to, max_depth } => {
            let max_depth = max_depth.unwrap_or(state.engine.graph().config().max_depth);
            path(state, &from, &to, max_depth, json)
        }
    }
}

fn stats(state: &AppState, json: bool) -> Result<()> {
    let stats = state.engine.graph().stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("── Knowledge Graph ──").dim());
    println!("  Entities:  {}", style(stats.total_entities).bold());
    println!("  Relations: {}", style(stats.total_relations).bold());
    println!("  Avg. connections: {:.2}", stats.avg_connections);

    if !stats.entity_types.is_empty() {
        println!();
        for (entity_type, count) in &stats.entity_types {
            println!("  {:<16} {}", style(entity_type).cyan(), count);
        }
    }
    if !stats.relation_types.is_empty() {
        println!();
        for (relation_type, count) in &stats.relation_types {
            println!("  {:<16} {}", style(relation_type).magenta(), count);
        }
    }
    println!();
    Ok(())
}

fn neighbors(state: &AppState, entity: &str, depth: usize, json: bool) -> Result<()> {
    let id = Entity::id_for(entity);
    let graph = state.engine.graph().read();
    let Some(origin) = graph.entity(&id) else {
        anyhow::bail!("entity '{entity}' not found");
    };
    let found: Vec<&Entity> = graph
        .neighbors(&id, depth)
        .iter()
        .filter_map(|neighbor| graph.entity(neighbor))
        .collect();

    if json {
        let output = serde_json::json!({
            "entity": origin,
            "depth": depth,
            "neighbors": found,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if found.is_empty() {
        println!(
            "  {} '{}' has no neighbors within {} hop(s)",
            style("i").blue().bold(),
            style(&origin.name).cyan(),
            depth
        );
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Entity").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Mentions").fg(Color::White),
        Cell::new("Degree").fg(Color::White),
    ]);
    for neighbor in &found {
        table.add_row(vec![
            Cell::new(&neighbor.name).fg(Color::Cyan),
            Cell::new(&neighbor.entity_type),
            Cell::new(neighbor.mentions).fg(Color::Yellow),
            Cell::new(graph.degree(&neighbor.id)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("  Neighbors of '{}'", style(&origin.name).cyan().bold());
    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn path(state: &AppState, from: &str, to: &str, max_depth: usize, json: bool) -> Result<()> {
    let graph = state.engine.graph().read();
    let ids = graph.find_path(&Entity::id_for(from), &Entity::id_for(to), max_depth);
    let names: Vec<String> = ids
        .iter()
        .map(|id| graph.entity(id).map_or_else(|| id.clone(), |e| e.name.clone()))
        .collect();

    if json {
        let output = serde_json::json!({ "from": from, "to": to, "path": ids });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if names.is_empty() {
        println!(
            "  {} No path from '{}' to '{}' within {} hop(s)",
            style("i").blue().bold(),
            from,
            to,
            max_depth
        );
    } else {
        println!("  {}", names.join(" -> "));
    }
    Ok(())
}
