//! CLI command definitions for the `cam` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;
pub mod memory;
pub mod recall;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use cam_types::memory::RetrievalMode;

/// Context-augmented memory for LLM conversations.
#[derive(Parser)]
#[command(name = "cam", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed logs (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Config file (default: {data_dir}/config.toml).
    #[arg(long, global = true, env = "CAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Keep memory in process only; nothing is written to disk.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// LLM provider: openai, anthropic, gemini or mistral (any name with --base-url).
    #[arg(long, global = true, env = "CAM_PROVIDER", default_value = "openai")]
    pub provider: String,

    /// Model used for answers and gating judgements.
    #[arg(long, global = true, env = "CAM_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    /// Base URL of an OpenAI-compatible endpoint, or an Anthropic proxy.
    #[arg(long, global = true, env = "CAM_BASE_URL")]
    pub base_url: Option<String>,

    /// API key for the provider. Without one, the judges fall back to their defaults.
    #[arg(long, global = true, env = "CAM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive chat with memory.
    Chat,

    /// Answer a single prompt with memory, then store it if useful.
    Ask {
        prompt: String,
    },

    /// Show what memory would be injected for a query.
    Recall {
        query: String,

        /// Retrieval mode.
        #[arg(long, value_enum, default_value_t = ModeArg::Global)]
        mode: ModeArg,

        /// Annotate each record with its stored time and prompt.
        #[arg(long, conflicts_with = "plain")]
        meta: bool,

        /// Print only the best record's text.
        #[arg(long)]
        plain: bool,

        /// Number of candidates to fetch (default: retrieval.top_k).
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Show how the gates judge a prompt, without storing anything.
    Classify {
        prompt: String,
    },

    /// Inspect or wipe stored memories.
    Memory {
        #[command(subcommand)]
        action: MemoryCommand,
    },

    /// Start the memory-augmenting proxy server.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// List the newest memories.
    List {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Count stored memories.
    Count,

    /// Delete every memory.
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Continuity,
    Global,
}

impl From<ModeArg> for RetrievalMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Continuity => RetrievalMode::Continuity,
            ModeArg::Global => RetrievalMode::Global,
        }
    }
}
