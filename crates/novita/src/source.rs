//! The seam between the relay and whichever upstream serves its tasks.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::task::TaskSnapshot;
use relay_core::types::TaskId;

use crate::error::UpstreamError;

/// Parameters for a new generation job.
#[derive(Debug, Clone)]
pub struct SubmitParams {
    pub model_name: String,
    pub prompt: String,
    /// Where the upstream should push completion, if anywhere.
    pub callback_url: Option<String>,
}

/// Submits jobs to and queries jobs from an upstream task API.
///
/// Implementations are stateless with respect to task state: they never
/// write to the task registry.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Submit a job; returns the upstream-assigned task ID.
    async fn submit_task(&self, params: &SubmitParams) -> Result<TaskId, UpstreamError>;

    /// Query a task's current state, bounded by `deadline`.
    async fn query_task(
        &self,
        task_id: &str,
        callback_url: Option<&str>,
        deadline: Duration,
    ) -> Result<TaskSnapshot, UpstreamError>;
}
