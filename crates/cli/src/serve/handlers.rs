//! Route handlers: health, ledger listings, creates, deletes, derived views
//! and the push event stream.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream;
use serde::de::DeserializeOwned;

use atolye_core::{NewTransfer, NewVaultTransaction};
use atolye_storage::{LedgerStore, PushRecv, StoreError};
use atolye_sync::LAGGED_EVENT;

use super::json_error;
use super::state::AppState;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// Map a store failure to a response. Rejections carry the structured
/// validation error so clients can tell them apart from other 4xx replies.
fn store_error(err: StoreError) -> Response {
    match err {
        StoreError::Rejected(validation) => {
            let body = serde_json::json!({
                "error": validation.to_string(),
                "validation": validation,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
        }
        other => {
            tracing::error!("store error: {}", other);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &other.to_string()).into_response()
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        json_error(StatusCode::BAD_REQUEST, &format!("invalid request body: {}", e))
            .into_response()
    })
}

fn created(id: String) -> Response {
    (StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response()
}

// ── Transfers ────────────────────────────────────────────────────────────────

/// GET /transfers
pub(crate) async fn handle_list_transfers(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list_transfers().await {
        Ok(transfers) => (StatusCode::OK, Json(transfers)).into_response(),
        Err(e) => store_error(e),
    }
}

/// POST /transfers
pub(crate) async fn handle_create_transfer(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Response {
    let transfer: NewTransfer = match parse_body(&body) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    match state.store.create_transfer(transfer).await {
        Ok(id) => {
            tracing::info!(%id, "transfer created");
            created(id)
        }
        Err(e) => store_error(e),
    }
}

/// DELETE /transfers/{id}
pub(crate) async fn handle_delete_transfer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.delete_transfer(&id).await {
        Ok(()) => {
            tracing::info!(%id, "transfer deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => store_error(e),
    }
}

// ── External vault ───────────────────────────────────────────────────────────

/// GET /vault
pub(crate) async fn handle_list_vault(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list_vault_transactions().await {
        Ok(transactions) => (StatusCode::OK, Json(transactions)).into_response(),
        Err(e) => store_error(e),
    }
}

/// POST /vault
pub(crate) async fn handle_create_vault(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let transaction: NewVaultTransaction = match parse_body(&body) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    match state.store.create_vault_transaction(transaction).await {
        Ok(id) => {
            tracing::info!(%id, "vault transaction created");
            created(id)
        }
        Err(e) => store_error(e),
    }
}

/// DELETE /vault/{id}
pub(crate) async fn handle_delete_vault(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.delete_vault_transaction(&id).await {
        Ok(()) => {
            tracing::info!(%id, "vault transaction deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => store_error(e),
    }
}

// ── Derived views ────────────────────────────────────────────────────────────

/// GET /summary
pub(crate) async fn handle_summary(State(state): State<Arc<AppState>>) -> Response {
    let summary = state.store.snapshot().summarize();
    (StatusCode::OK, Json(summary)).into_response()
}

/// GET /audit
pub(crate) async fn handle_audit(State(state): State<Arc<AppState>>) -> Response {
    let warnings = state.store.snapshot().audit();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "warnings": warnings })),
    )
        .into_response()
}

// ── Push channel ─────────────────────────────────────────────────────────────

/// GET /events
///
/// One SSE message per committed change, named after the notification type
/// with the notification JSON as data. A subscriber that falls behind gets a
/// `lagged` message carrying the number of dropped notifications. The stream
/// ends when the store closes its push channel.
pub(crate) async fn handle_events(State(state): State<Arc<AppState>>) -> Response {
    let Some(subscription) = state.store.subscribe().await else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "push channel closed").into_response();
    };
    tracing::info!(subscribers = state.store.subscriber_count(), "push client connected");

    let events = stream::unfold(subscription, |mut subscription| async move {
        let message = match subscription.recv().await {
            PushRecv::Event(push) => Event::default().event(push.kind()).json_data(&push),
            PushRecv::Lagged(missed) => {
                tracing::warn!(missed, "push client lagged");
                Ok(Event::default()
                    .event(LAGGED_EVENT)
                    .data(missed.to_string()))
            }
            PushRecv::Closed => return None,
        };
        Some((message, subscription))
    });
    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}
