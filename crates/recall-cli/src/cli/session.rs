//! Working-buffer commands: `say` and `end-session`.

use anyhow::{Result, anyhow};
use chrono::Utc;
use console::style;

use recall_types::working::Role;

use crate::state::AppState;

/// Append a message to the working buffer.
///
/// Accepts `user`, `assistant` (or `ai`) and `system`.
pub async fn say(state: &AppState, role: &str, content: &str, json: bool) -> Result<()> {
    let role: Role = role.parse().map_err(|e: String| anyhow!(e))?;
    if content.trim().is_empty() {
        return Err(anyhow!("message content is empty"));
    }

    let _turn = state.lock_turn().await;
    state.engine.add_message(role, content, Utc::now()).await;
    let turns = state.engine.get_turn_count().await;

    if json {
        let output = serde_json::json!({
            "session_id": state.engine.session_id().await,
            "role": role,
            "turn_count": turns,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "  {} {} message recorded (turn {})",
            style("✓").green().bold(),
            role,
            style(turns).bold()
        );
    }
    Ok(())
}

/// Archive the current conversation and start a fresh session.
pub async fn end_session(state: &AppState, json: bool) -> Result<()> {
    let _turn = state.lock_turn().await;
    let summary = state.engine.end_session(Utc::now()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    match summary {
        Some(summary) => {
            println!();
            println!(
                "  {} Archived session {} ({} messages)",
                style("✓").green().bold(),
                style(&summary.session_id).cyan(),
                summary.message_count
            );
            println!();
            for line in summary.summary.lines() {
                println!("    {line}");
            }
            println!();
        }
        None => {
            println!(
                "  {} Nothing to archive; the working buffer is empty.",
                style("i").blue().bold()
            );
        }
    }
    Ok(())
}
