//! Bearer-token check for servers started with an API key.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::state::AppState;

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Requests other than /health must carry `Authorization: Bearer <key>` when
/// the server has a key. Missing and wrong tokens get the same 401.
pub(crate) async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };
    if request.uri().path() == "/health" || bearer_token(&request) == Some(expected) {
        return next.run(request).await;
    }
    tracing::debug!(path = %request.uri().path(), "unauthenticated request");
    super::json_error(StatusCode::UNAUTHORIZED, "missing or invalid API key").into_response()
}
