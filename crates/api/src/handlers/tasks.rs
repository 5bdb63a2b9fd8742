//! Handlers for reading and refreshing task records.
//!
//! Routes:
//! - `GET  /tasks/{id}`          — current registry record
//! - `POST /tasks/{id}/refresh`  — query the upstream once and apply the result

use axum::extract::{Path, State};
use axum::Json;
use relay_core::error::CoreError;
use relay_core::task::Task;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<DataResponse<Task>>> {
    let task = find_task(&state, &task_id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// POST /api/v1/tasks/{id}/refresh
///
/// Performs a single upstream query, registering the webhook URL again, and
/// returns the record after the snapshot has been applied. The record may
/// differ from the snapshot when the registry rejects it as stale or the
/// task was already terminal.
pub async fn refresh_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<DataResponse<Task>>> {
    let callback_url = state.webhook_url();
    let snapshot = state
        .upstream
        .query_task(&task_id, callback_url.as_deref(), state.timings.upstream_timeout)
        .await?;

    let outcome = state.registry.update(snapshot).await;
    tracing::info!(task_id = %task_id, outcome = outcome.as_str(), "Task refreshed");

    let task = find_task(&state, &task_id).await?;
    Ok(Json(DataResponse { data: task }))
}

async fn find_task(state: &AppState, task_id: &str) -> AppResult<Task> {
    state
        .registry
        .get(task_id)
        .await
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Task",
            id: task_id.to_string(),
        }))
}
