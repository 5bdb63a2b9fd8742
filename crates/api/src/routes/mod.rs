pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /stream                  relay a new job as server-sent events (GET)
/// /tasks/{id}              current task record (GET)
/// /tasks/{id}/refresh      query upstream once and apply (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/stream", get(handlers::stream::stream_task))
        .route("/tasks/{id}", get(handlers::tasks::get_task))
        .route("/tasks/{id}/refresh", post(handlers::tasks::refresh_task))
}

/// Mount the upstream webhook receiver (root-level, NOT under `/api/v1`).
///
/// Only `POST` is routed; other methods get `405 Method Not Allowed`.
pub fn webhook_router() -> Router<AppState> {
    Router::new().route("/webhook", post(handlers::webhook::receive_webhook))
}
