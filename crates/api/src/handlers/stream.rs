//! Server-sent event endpoint for relay connections.
//!
//! Routes:
//! - `GET /stream?prompt=...&model=...` — submit a job and stream its progress

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use relay_core::error::CoreError;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{AppError, AppResult};
use crate::relay::{spawn_relay, RelayRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default, alias = "q")]
    pub prompt: String,
    /// Model to run; the configured default when absent.
    pub model: Option<String>,
}

/// GET /api/v1/stream
///
/// Every frame is one `data:` line holding a JSON [`StreamEvent`]. The
/// stream ends after the first frame with `finished: true`. Closing the
/// connection early cancels the relay and its poller.
///
/// [`StreamEvent`]: relay_core::stream_event::StreamEvent
pub async fn stream_task(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let prompt = query.prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "prompt must not be empty".into(),
        )));
    }

    let model_name = query
        .model
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.config.chat_models.configs.default_model.clone());

    let handle = spawn_relay(
        state.relay_context(),
        RelayRequest {
            prompt: prompt.to_string(),
            model_name,
        },
    );

    let events = ReceiverStream::new(handle.events)
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.to_json())));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
