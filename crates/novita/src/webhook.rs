//! Decoder for the upstream's webhook event envelope.
//!
//! The upstream POSTs
//! `{"event_type": ..., "payload": {"task": {...}, "extra": {...}, "images": [...]}}`
//! whenever a task changes state. [`decode_event`] turns the raw body into
//! the same [`TaskSnapshot`] the status query produces.

use relay_core::task::{SnapshotSource, TaskSnapshot};
use serde::Deserialize;

use crate::messages::{Extra, ImageAsset, TaskInfo};

/// Top-level webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event_type: String,
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub task: TaskInfo,
    #[serde(default)]
    pub extra: Extra,
    #[serde(default)]
    pub images: Vec<ImageAsset>,
    #[serde(default)]
    pub videos: Vec<serde_json::Value>,
    #[serde(default)]
    pub audios: Vec<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookDecodeError {
    #[error("Invalid webhook body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Webhook payload has no task_id")]
    MissingTaskId,
}

impl WebhookEvent {
    /// Normalize the event into a webhook-sourced snapshot.
    pub fn to_snapshot(&self) -> Result<TaskSnapshot, WebhookDecodeError> {
        let task = &self.payload.task;
        let task_id = task.task_id.trim();
        if task_id.is_empty() {
            return Err(WebhookDecodeError::MissingTaskId);
        }
        Ok(task.to_snapshot(task_id, &self.payload.images, SnapshotSource::Webhook))
    }
}

/// Parse a raw webhook body and normalize it.
pub fn decode_event(raw: &[u8]) -> Result<(WebhookEvent, TaskSnapshot), WebhookDecodeError> {
    let event: WebhookEvent = serde_json::from_slice(raw)?;
    let snapshot = event.to_snapshot()?;
    Ok((event, snapshot))
}
