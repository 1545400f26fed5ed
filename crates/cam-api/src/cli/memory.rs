//! Memory management CLI commands: list, count, clear.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use crate::state::AppState;

/// Longest memory text shown in a table cell.
const MAX_CELL_CHARS: usize = 60;

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_CELL_CHARS {
        let head: String = text.chars().take(MAX_CELL_CHARS - 3).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// List the newest memories.
///
/// ```bash
/// cam memory list
/// cam memory list -n 5 --json
/// ```
pub async fn list_memories(state: &AppState, limit: usize, json: bool) -> Result<()> {
    let memories = state
        .pipeline
        .store()
        .peek(limit)
        .await
        .context("Failed to read memories")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&memories)?);
        return Ok(());
    }

    if memories.is_empty() {
        println!();
        println!(
            "  {} No memories yet. Facts you share in chat are remembered.",
            style("i").blue().bold(),
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Memory").fg(Color::White),
        Cell::new("Tag").fg(Color::White),
        Cell::new("Topic").fg(Color::White),
        Cell::new("Recalled").fg(Color::White),
        Cell::new("Stored").fg(Color::White),
    ]);

    for memory in &memories {
        table.add_row(vec![
            Cell::new(truncate(&memory.text)).fg(Color::White),
            Cell::new(memory.metadata.tag).fg(Color::Cyan),
            Cell::new(&memory.metadata.topic).fg(Color::Cyan),
            Cell::new(memory.metadata.access_count).fg(Color::Yellow),
            Cell::new(memory.metadata.timestamp.format("%Y-%m-%d %H:%M")).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} memor{} shown",
        style(memories.len()).bold(),
        if memories.len() == 1 { "y" } else { "ies" }
    );
    println!();

    Ok(())
}

pub async fn count_memories(state: &AppState, json: bool) -> Result<()> {
    let count = state
        .pipeline
        .store()
        .count()
        .await
        .context("Failed to count memories")?;

    if json {
        println!("{}", serde_json::json!({ "count": count }));
    } else {
        println!("  {} memor{}", style(count).bold(), if count == 1 { "y" } else { "ies" });
    }
    Ok(())
}

/// Delete every memory, after confirmation unless `force` or `json`.
pub async fn clear_memories(state: &AppState, force: bool, json: bool) -> Result<()> {
    let store = state.pipeline.store();
    let count = store.count().await.context("Failed to count memories")?;

    if count == 0 {
        if json {
            println!("{}", serde_json::json!({ "deleted": 0 }));
        } else {
            println!("  {} No memories to delete.", style("i").blue().bold());
        }
        return Ok(());
    }

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Wipe all {} memories? This cannot be undone.",
                style(count).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let deleted = store
        .delete_all()
        .await
        .context("Failed to delete memories")?;

    if json {
        println!("{}", serde_json::json!({ "deleted": deleted }));
    } else {
        println!(
            "  {} Wiped {} memor{}.",
            style("x").red().bold(),
            deleted,
            if deleted == 1 { "y" } else { "ies" }
        );
    }

    Ok(())
}
