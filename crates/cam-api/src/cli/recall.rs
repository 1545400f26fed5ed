//! Read-only views of the gates: `recall` and `classify`.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use cam_core::gate::retrieval::{RetrievalOptions, render};
use cam_core::gate::usefulness::WriteDecision;
use cam_types::memory::RetrievalMode;

use crate::state::AppState;

/// Show the candidates and rendered context a query would receive.
pub async fn recall(
    state: &AppState,
    query: &str,
    mode: RetrievalMode,
    meta: bool,
    plain: bool,
    k: Option<usize>,
    json: bool,
) -> Result<()> {
    let k = k.unwrap_or(state.config.current().retrieval.top_k);
    let mut options = RetrievalOptions::new(k, mode);
    if meta {
        options = options.with_meta();
    }
    if plain {
        options = options.plain();
    }

    let candidates = state.pipeline.retrieval().retrieve(query, k, mode).await;
    let context = render(&candidates, &options);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "query": query,
                "mode": mode,
                "candidates": candidates,
                "context": context,
            }))?
        );
        return Ok(());
    }

    let Some(context) = context else {
        println!();
        println!(
            "  {} No memory passes the {} threshold.",
            style("i").blue().bold(),
            mode
        );
        println!();
        return Ok(());
    };

    if plain {
        println!("{context}");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Distance").fg(Color::White),
        Cell::new("Tag").fg(Color::White),
        Cell::new("Memory").fg(Color::White),
    ]);
    for candidate in &candidates {
        table.add_row(vec![
            Cell::new(format!("{:.3}", candidate.distance)).fg(Color::Yellow),
            Cell::new(candidate.metadata.tag).fg(Color::Cyan),
            Cell::new(&candidate.text).fg(Color::White),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!("  {}", style("Injected context:").bold());
    for line in context.lines() {
        println!("  {}", style(line).dim());
    }
    println!();
    Ok(())
}

/// Show how each gate judges a prompt. Nothing is stored.
pub async fn classify(state: &AppState, prompt: &str, json: bool) -> Result<()> {
    let intent = state.pipeline.classifier().classify(prompt).await;
    let continued = state.pipeline.decider().should_retrieve(prompt).await;
    let decision = state.pipeline.write_gate().evaluate(prompt, intent).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "prompt": prompt,
                "intent": intent,
                "topic_continued": continued,
                "write": decision,
            }))?
        );
        return Ok(());
    }

    println!();
    println!("  {}  {}", style("Intent:").bold(), style(intent).cyan());
    println!("  {}  {}", style("On topic:").bold(), continued);
    match decision {
        WriteDecision::Accept => {
            println!("  {}  {}", style("Store:").bold(), style("yes").green());
        }
        WriteDecision::Reject(reason) => {
            println!(
                "  {}  {} ({})",
                style("Store:").bold(),
                style("no").red(),
                reason
            );
        }
    }
    println!();
    Ok(())
}
