//! Proposal drafting API server.
//!
//! Serves the grantsmith pipeline over HTTP for a browser frontend.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run -p grantsmith-web
//! OPENROUTER_KEY=sk-... cargo run -p grantsmith-web -- --port 8080 \
//!   --partners-file partners.json --knowledge-file kb.json
//! ```
//!
//! Then point the frontend (or curl) at the printed URL:
//!
//! ```bash
//! curl -X POST http://127.0.0.1:3001/api/proposals/generate \
//!   -H 'content-type: application/json' \
//!   -d '{"idea":"Smart irrigation","constraints":{"targetBudget":250000}}'
//! ```

use std::path::PathBuf;

use clap::Parser;
use grantsmith::draft::DrafterConfig;
use grantsmith::model::{KnowledgeChunk, Partner};
use grantsmith::{DEFAULT_MODEL, GenerationClient};
use grantsmith_web::{build_state, spawn_web};
use tracing::info;

/// Proposal drafting API server.
#[derive(Parser)]
#[command(about = "HTTP API for the grantsmith proposal drafting engine")]
struct Args {
    /// Port to bind
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Data directory for proposals and attachments
    #[arg(long, default_value = ".grantsmith")]
    data_dir: PathBuf,

    /// Model to use for generation and edits
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// JSON file holding the partner registry
    #[arg(long)]
    partners_file: Option<PathBuf>,

    /// JSON file holding knowledge fragments for grounding
    #[arg(long)]
    knowledge_file: Option<PathBuf>,

    /// Directory holding section template files
    #[arg(long)]
    templates_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    // 1. Provider client.
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key")?;
    let client = GenerationClient::new(api_key)?;

    // 2. Registries.
    let partners: Vec<Partner> = match args.partners_file {
        Some(path) => read_json_file(&path)?,
        None => Vec::new(),
    };
    let knowledge: Vec<KnowledgeChunk> = match args.knowledge_file {
        Some(path) => read_json_file(&path)?,
        None => Vec::new(),
    };
    info!(
        "loaded {} partner(s), {} knowledge fragment(s)",
        partners.len(),
        knowledge.len()
    );

    // 3. Application state and server.
    let config = DrafterConfig {
        model: args.model,
        ..Default::default()
    };
    let state = build_state(
        client,
        &args.data_dir,
        partners,
        knowledge,
        args.templates_dir,
        config,
    )
    .map_err(|e| format!("failed to open data dir: {e}"))?;

    let addr = spawn_web(state, ([127, 0, 0, 1], args.port).into()).await;
    println!("grantsmith API: http://{addr}");

    // 4. Run until interrupted.
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for shutdown signal: {e}"))?;
    info!("shutting down");
    Ok(())
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&json).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}
