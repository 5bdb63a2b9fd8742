//! Handler for upstream task-event deliveries.
//!
//! Routes:
//! - `POST /webhook` — apply one task event to the registry

use axum::body::Bytes;
use axum::extract::State;
use relay_novita::webhook::decode_event;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /webhook
///
/// Decodes the event envelope and writes its snapshot to the registry.
/// Answers `200 OK` whenever the body decodes, including for unknown task
/// IDs and for updates the registry rejects, so the upstream does not
/// redeliver them.
pub async fn receive_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<&'static str> {
    let (event, snapshot) = decode_event(&body).map_err(|e| {
        tracing::warn!(error = %e, bytes = body.len(), "Rejected webhook delivery");
        AppError::BadRequest(format!("Invalid webhook payload: {e}"))
    })?;

    let ttl = event
        .payload
        .images
        .first()
        .map(|image| image.image_url_ttl.to_string());
    tracing::info!(
        task_id = %snapshot.task_id,
        event_type = %event.event_type,
        task_type = snapshot.task_type.as_deref().unwrap_or("unknown"),
        status = %snapshot.status,
        image_url_ttl = ttl.as_deref().unwrap_or("none"),
        "Webhook received",
    );

    let outcome = state.registry.update(snapshot).await;
    tracing::debug!(outcome = outcome.as_str(), "Webhook applied");

    Ok("OK")
}
