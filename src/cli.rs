use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use crate::core::logging;
use crate::server::router::router;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(
    name = "healthify-backend",
    version,
    about = "Medical question-answering backend for the Healthify app"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API (default).
    Serve {
        /// Interface to bind; overrides `server.host`.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind; overrides `server.port`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Chunk, embed and upsert every PDF in a directory.
    Ingest {
        /// Directory containing `*.pdf` files (not searched recursively).
        dir: PathBuf,
    },
    /// Answer a single question and exit.
    Ask {
        question: String,
    },
    /// Print credential and pipeline status as JSON.
    Status,
}

impl Default for Command {
    fn default() -> Self {
        Command::Serve {
            host: None,
            port: None,
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    logging::init(&state.paths);

    match cli.command.unwrap_or_default() {
        Command::Serve { host, port } => serve(state, host, port).await,
        Command::Ingest { dir } => {
            if !dir.is_dir() {
                bail!("{} is not a directory", dir.display());
            }
            let report = state.pipeline.ingest_directory(&dir).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Ask { question } => {
            let answer = state.pipeline.answer(&question).await?;
            println!("{}", answer.text);
            for source in &answer.sources {
                tracing::debug!("source {} (score {:.3})", source.source, source.score);
            }
            Ok(())
        }
        Command::Status => {
            println!(
                "{}",
                serde_json::to_string_pretty(&state.pipeline.status())?
            );
            Ok(())
        }
    }
}

async fn serve(state: Arc<AppState>, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| state.settings.server.host.clone());
    let port = port.unwrap_or(state.settings.server.port);
    let bind_addr = format!("{}:{}", host, port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    let credentials = &state.settings.credentials;
    if !credentials.has_llm_api_key() || !credentials.has_index_api_key() {
        let status = state.pipeline.status();
        tracing::warn!(
            "Missing credentials (gemini {}, pinecone {}); questions may fail until they are set",
            status.gemini_api_key,
            status.pinecone_api_key
        );
    }
    tracing::info!("Listening on {}", addr);

    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
