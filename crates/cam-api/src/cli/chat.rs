//! Interactive chat and one-shot `ask`.
//!
//! Every turn goes through the memory pipeline: the prompt is classified,
//! memory is injected when relevant, the model answers, and the prompt is
//! stored afterwards if the write gate accepts it.

use anyhow::Result;
use console::style;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use cam_core::pipeline::{CommitOutcome, TurnOutcome};

use crate::state::AppState;

/// What a line typed into the chat loop asks for.
#[derive(Debug, PartialEq)]
pub enum ChatInput {
    Exit,
    /// `clear memory` or `reset memory`.
    ClearMemory,
    Empty,
    Prompt(String),
}

pub fn parse_input(line: &str) -> ChatInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ChatInput::Empty;
    }
    match trimmed.to_lowercase().as_str() {
        "exit" | "quit" | "/exit" | "/quit" => ChatInput::Exit,
        "clear memory" | "reset memory" => ChatInput::ClearMemory,
        _ => ChatInput::Prompt(trimmed.to_string()),
    }
}

/// Run the interactive chat loop until `exit` or end of input.
pub async fn run_chat(state: &AppState, json: bool) -> Result<()> {
    let provider = state.require_provider()?;

    if !json {
        println!();
        println!("  {}", style("CAM chat").cyan().bold());
        println!(
            "  {}  {}",
            style("Model:").bold(),
            style(provider.name()).dim()
        );
        if state.ephemeral {
            println!("  {}", style("Ephemeral memory: nothing is saved").yellow());
        } else {
            println!(
                "  {} {}",
                style("Memory:").bold(),
                style(state.data_dir.display()).dim()
            );
        }
        println!();
        println!(
            "  {}",
            style("Type 'exit' to quit, 'clear memory' to forget everything").dim()
        );
        println!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        if !json {
            stdout.write_all(b"You: ").await?;
            stdout.flush().await?;
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            ChatInput::Empty => continue,
            ChatInput::Exit => break,
            ChatInput::ClearMemory => {
                let deleted = state.pipeline.store().delete_all().await?;
                if json {
                    println!("{}", serde_json::json!({ "deleted": deleted }));
                } else {
                    println!(
                        "  {} Forgot {} memor{}.",
                        style("x").red().bold(),
                        deleted,
                        if deleted == 1 { "y" } else { "ies" }
                    );
                }
            }
            ChatInput::Prompt(prompt) => {
                let outcome = state.pipeline.run_turn(&prompt, provider).await;
                print_turn(&outcome, json, false)?;
            }
        }
    }

    if !json {
        println!();
        println!("  Bye.");
    }
    Ok(())
}

/// Answer a single prompt.
pub async fn ask(state: &AppState, prompt: &str, json: bool, verbose: bool) -> Result<()> {
    let provider = state.require_provider()?;
    let outcome = state.pipeline.run_turn(prompt, provider).await;
    print_turn(&outcome, json, verbose)
}

fn print_turn(outcome: &TurnOutcome, json: bool, verbose: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(outcome)?);
        return Ok(());
    }

    if verbose {
        println!(
            "  {} intent={} continued={} memories={}",
            style("~").dim(),
            outcome.turn.intent,
            outcome.turn.topic_continued,
            outcome.turn.candidates.len()
        );
    }

    println!("{} {}", style("AI:").green().bold(), outcome.answer);

    if let CommitOutcome::Stored { memory } = &outcome.commit {
        println!(
            "  {} {}",
            style("remembered").dim(),
            style(format!("[{}]", memory.metadata.tag)).dim()
        );
    }
    Ok(())
}
