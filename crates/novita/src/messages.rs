//! Request and response bodies for the upstream REST endpoints.
//!
//! Response structs are lenient: only `task.status` is required, every
//! other field defaults, so new upstream fields never break parsing.

use relay_core::status::{map_status, TaskStatus};
use relay_core::task::{SnapshotSource, TaskSnapshot};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// `{"webhook": {"url": ...}}` block embedded under `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTarget {
    pub url: String,
}

impl Extra {
    pub fn with_webhook(callback_url: Option<&str>) -> Self {
        Self {
            webhook: callback_url.map(|url| WebhookTarget {
                url: url.to_string(),
            }),
        }
    }
}

/// Body of `POST /v3/async/txt2img`.
#[derive(Debug, Clone, Serialize)]
pub struct Txt2ImgRequest<'a> {
    pub model_name: &'a str,
    pub prompt: &'a str,
    pub extra: Extra,
}

/// Body attached to a task-result query to register a webhook.
#[derive(Debug, Clone, Serialize)]
pub struct QueryTaskRequest {
    pub extra: Extra,
}

/// Response of `POST /v3/async/txt2img`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// The `task` object shared by the query response and the webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskInfo {
    #[serde(default)]
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub progress_percent: i64,
    #[serde(default)]
    pub task_type: String,
    /// Estimated seconds remaining.
    #[serde(default)]
    pub eta: i64,
}

/// One generated image.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageAsset {
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub image_type: String,
    /// Seconds the URL stays valid. Sent as a string by some endpoints.
    #[serde(default)]
    pub image_url_ttl: serde_json::Value,
}

/// Response of `GET /v3/async/task-result`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskResultResponse {
    pub task: TaskInfo,
    #[serde(default)]
    pub images: Vec<ImageAsset>,
}

impl TaskInfo {
    /// Normalize into a snapshot for `task_id`.
    ///
    /// The first non-empty image URL becomes the result URL, and only on
    /// success; a success without images yields an empty URL.
    pub fn to_snapshot(
        &self,
        task_id: &str,
        images: &[ImageAsset],
        source: SnapshotSource,
    ) -> TaskSnapshot {
        let status = map_status(&self.status);
        let mut snapshot = TaskSnapshot::new(task_id, status, source)
            .with_progress(self.progress_percent)
            .with_task_type(self.task_type.clone());

        match status {
            TaskStatus::Succeeded => {
                if let Some(url) = first_image_url(images) {
                    snapshot = snapshot.with_result_url(url);
                }
            }
            TaskStatus::Failed => {
                snapshot = snapshot.with_failure_reason(self.reason.clone());
            }
            TaskStatus::Pending => {}
        }

        snapshot
    }
}

fn first_image_url(images: &[ImageAsset]) -> Option<&str> {
    images
        .iter()
        .map(|image| image.image_url.as_str())
        .find(|url| !url.is_empty())
}
