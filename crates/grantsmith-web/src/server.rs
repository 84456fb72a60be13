//! Axum server setup and router construction.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::AppState;
use crate::api;

/// Build the full axum router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for development (frontend dev server on a different port).
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/proposals/generate", post(api::generate_proposal))
        .route(
            "/api/proposals",
            get(api::list_proposals).post(api::create_proposal),
        )
        .route(
            "/api/proposals/{id}",
            get(api::get_proposal)
                .put(api::update_proposal)
                .delete(api::delete_proposal),
        )
        .route("/api/proposals/{id}/ai-edit", post(api::ai_edit))
        .route("/api/proposals/{id}/outline", get(api::get_outline))
        .route("/api/partners/rank", post(api::rank_partners))
        .route("/api/attachments/{bucket}", get(api::list_attachments))
        .route(
            "/api/attachments/{bucket}/{path}",
            get(api::download_attachment).post(api::upload_attachment),
        )
        .with_state(state)
        .layer(cors)
}

/// Start the axum server and return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind(bind_addr).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    addr
}
