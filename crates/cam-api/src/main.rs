//! CAM command line and proxy server entry point.
//!
//! Binary name: `cam`
//!
//! Parses CLI arguments, installs tracing, wires the memory pipeline, then
//! dispatches to the command handler or starts the HTTP proxy.

mod cli;
mod http;
mod state;

use clap::Parser;

use cam_observe::tracing_setup::{LogFormat, init_tracing, shutdown_tracing, verbosity_filter};

use cli::{Cli, Commands, MemoryCommand};
use state::{AppState, StateOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(verbosity_filter(cli.verbose), format, cli.otel)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut state = AppState::init(StateOptions::from_cli(&cli)).await?;

    match cli.command {
        Commands::Chat => {
            state.watch_config()?;
            cli::chat::run_chat(&state, cli.json).await?;
        }

        Commands::Ask { prompt } => {
            cli::chat::ask(&state, &prompt, cli.json, cli.verbose > 0).await?;
        }

        Commands::Recall {
            query,
            mode,
            meta,
            plain,
            k,
        } => {
            cli::recall::recall(&state, &query, mode.into(), meta, plain, k, cli.json).await?;
        }

        Commands::Classify { prompt } => {
            cli::recall::classify(&state, &prompt, cli.json).await?;
        }

        Commands::Memory { action } => match action {
            MemoryCommand::List { limit } => {
                cli::memory::list_memories(&state, limit, cli.json).await?;
            }
            MemoryCommand::Count => {
                cli::memory::count_memories(&state, cli.json).await?;
            }
            MemoryCommand::Clear { force } => {
                cli::memory::clear_memories(&state, force, cli.json).await?;
            }
        },

        Commands::Serve { host, port } => {
            state.watch_config()?;

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(%addr, ephemeral = state.ephemeral, "proxy listening");

            println!(
                "  {} CAM proxy listening on {}",
                console::style(">").bold(),
                console::style(format!("http://{addr}/v1")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            println!("\n  Server stopped.");
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
