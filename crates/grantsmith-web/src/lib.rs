//! HTTP API for the grantsmith proposal drafting engine.
//!
//! `grantsmith-web` exposes the [`Drafter`](grantsmith::draft::Drafter)
//! pipeline, the document store, and the relevance ranker over an axum REST
//! surface. It is designed to back a browser frontend but works with any
//! HTTP client.
//!
//! # Quick start
//!
//! ```ignore
//! use grantsmith::{GenerationClient, draft::DrafterConfig};
//! use grantsmith_web::{build_state, spawn_web};
//!
//! let client = GenerationClient::new(api_key)?;
//! let state = build_state(
//!     client,
//!     ".grantsmith".as_ref(),
//!     partners,
//!     knowledge,
//!     None,
//!     DrafterConfig::default(),
//! )?;
//! let addr = spawn_web(state, ([127, 0, 0, 1], 3001).into()).await;
//! println!("API: http://{addr}");
//! ```
//!
//! # Routes
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /api/proposals/generate` | Generate a proposal via the provider |
//! | `GET /api/proposals` | List stored proposals |
//! | `POST /api/proposals` | Store a caller-supplied proposal |
//! | `GET/PUT/DELETE /api/proposals/{id}` | Fetch / overwrite / delete |
//! | `POST /api/proposals/{id}/ai-edit` | Apply a free-text edit instruction |
//! | `GET /api/proposals/{id}/outline` | Resolved outline with content flags |
//! | `POST /api/partners/rank` | Rank registry partners against a context |
//! | `GET /api/attachments/{bucket}` | List stored objects |
//! | `GET/POST /api/attachments/{bucket}/{path}` | Download / upload bytes |
//!
//! Writes are last-write-wins full overwrites, matching the store's
//! semantics — concurrent edits to one id race and the later save wins.

mod api;
mod server;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use grantsmith::GenerationClient;
use grantsmith::draft::DrafterConfig;
use grantsmith::model::{KnowledgeChunk, Partner};
use grantsmith::store::{DocumentStore, ObjectStore};

/// Shared application state passed to all handlers via axum's `State`
/// extractor. Cheap to clone — the registries sit behind `Arc` and the
/// stores hold only their root paths.
#[derive(Clone)]
pub struct AppState {
    pub client: GenerationClient,
    pub store: DocumentStore,
    pub objects: ObjectStore,
    pub partners: Arc<Vec<Partner>>,
    pub knowledge: Arc<Vec<KnowledgeChunk>>,
    pub templates_dir: Option<PathBuf>,
    pub drafter: DrafterConfig,
}

/// Assemble the application state under a data directory
/// (`{data_dir}/proposals` and `{data_dir}/objects` are created as needed).
pub fn build_state(
    client: GenerationClient,
    data_dir: &Path,
    partners: Vec<Partner>,
    knowledge: Vec<KnowledgeChunk>,
    templates_dir: Option<PathBuf>,
    drafter: DrafterConfig,
) -> std::io::Result<AppState> {
    Ok(AppState {
        client,
        store: DocumentStore::new(data_dir.join("proposals"))?,
        objects: ObjectStore::new(data_dir.join("objects"))?,
        partners: Arc::new(partners),
        knowledge: Arc::new(knowledge),
        templates_dir,
        drafter,
    })
}

/// Spawn the web server on a Tokio task and return the bound address.
/// Bind to port 0 for a random free port (tests do this).
///
/// The server runs until the Tokio runtime shuts down.
pub async fn spawn_web(state: AppState, bind_addr: SocketAddr) -> SocketAddr {
    let router = server::build_router(state);
    server::start_server(router, bind_addr).await
}
