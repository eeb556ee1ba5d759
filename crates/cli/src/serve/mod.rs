//! `atolye serve` -- reference ledger store over HTTP.
//!
//! Serves a [`MemoryStore`] as the JSON API that `HttpStore` speaks, using
//! `axum` + `tokio`.
//!
//! CORS is permissive for local use. If ATOLYE_API_KEY is set, requests
//! other than /health need `Authorization: Bearer <key>`.
//!
//! Endpoints:
//! - GET    /health          - Server status (exempt from auth)
//! - GET    /transfers       - Every transfer
//! - POST   /transfers       - Create a transfer, 201 `{"id"}`
//! - DELETE /transfers/{id}  - Delete a transfer (idempotent), 204
//! - GET    /vault           - Every external vault transaction
//! - POST   /vault           - Create a vault transaction, 201 `{"id"}`
//! - DELETE /vault/{id}      - Delete a vault transaction (idempotent), 204
//! - GET    /summary         - Workshop summary
//! - GET    /audit           - Integrity warnings
//! - GET    /events          - Push notifications as server-sent events
//!
//! Rejected mutations answer 422 with `{"error", "validation"}`; unparseable
//! bodies answer 400. Responses other than /events are application/json.

mod handlers;
mod middleware;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};

use atolye_core::decode_ledger;
use atolye_storage::MemoryStore;
use atolye_sync::config::ENV_API_KEY;
use atolye_sync::EVENTS_PATH;

use self::handlers::{
    handle_audit, handle_create_transfer, handle_create_vault, handle_delete_transfer,
    handle_delete_vault, handle_events, handle_health, handle_list_transfers, handle_list_vault,
    handle_not_found, handle_summary,
};
use self::middleware::require_api_key;
use self::state::AppState;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/transfers",
            get(handle_list_transfers).post(handle_create_transfer),
        )
        .route("/transfers/{id}", delete(handle_delete_transfer))
        .route("/vault", get(handle_list_vault).post(handle_create_vault))
        .route("/vault/{id}", delete(handle_delete_vault))
        .route("/summary", get(handle_summary))
        .route("/audit", get(handle_audit))
        .route(EVENTS_PATH, get(handle_events))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Load the seed ledger, dropping malformed records with a warning.
fn load_seed(path: &Path) -> Result<MemoryStore, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading seed '{}': {}", path.display(), e))?;
    let (ledger, rejected) = decode_ledger(&text)?;
    tracing::info!(
        seed = %path.display(),
        transfers = ledger.transfers.len(),
        vault = ledger.vault.len(),
        dropped = rejected.len(),
        "loaded seed ledger"
    );
    Ok(MemoryStore::seeded(ledger))
}

/// Start the HTTP server on the given port, optionally seeded from a ledger file.
///
/// If `ATOLYE_API_KEY` is set, every endpoint except /health requires it.
pub async fn start_server(
    port: u16,
    seed: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = match &seed {
        Some(path) => load_seed(path)?,
        None => MemoryStore::new(),
    };

    let api_key = std::env::var(ENV_API_KEY).ok().filter(|k| !k.is_empty());
    if api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }

    let state = Arc::new(AppState { store, api_key });
    let app = router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("atolye store listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open event streams would otherwise hold the shutdown forever.
            state.store.close_push();
        })
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
