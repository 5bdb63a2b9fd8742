//! REST client for the upstream async-task endpoints.
//!
//! Wraps job submission (`POST /v3/async/txt2img`) and status queries
//! (`GET /v3/async/task-result`) using [`reqwest`], classifying every
//! failure into an [`UpstreamError`].

use std::time::Duration;

use async_trait::async_trait;
use relay_core::task::{SnapshotSource, TaskSnapshot};
use relay_core::types::TaskId;
use reqwest::StatusCode;

use crate::error::UpstreamError;
use crate::messages::{Extra, QueryTaskRequest, SubmitResponse, TaskResultResponse, Txt2ImgRequest};
use crate::source::{SubmitParams, TaskSource};

/// Default timeout for submission requests.
const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for one upstream account.
pub struct NovitaApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    submit_timeout: Duration,
}

impl NovitaApi {
    /// Create a client for `base_url` (e.g. `https://api.novita.ai`).
    ///
    /// `api_key` is sent as a bearer credential on every request.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api_key)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }

    /// Override the submission timeout.
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a text-to-image job, optionally registering a webhook.
    ///
    /// Returns the upstream-assigned task ID.
    pub async fn submit_txt2img(
        &self,
        model_name: &str,
        prompt: &str,
        callback_url: Option<&str>,
    ) -> Result<TaskId, UpstreamError> {
        let body = Txt2ImgRequest {
            model_name,
            prompt,
            extra: Extra::with_webhook(callback_url),
        };

        let response = self
            .client
            .post(format!("{}/v3/async/txt2img", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.submit_timeout)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let body = Self::success_body(response).await?;
        let parsed: SubmitResponse = Self::parse_body(&body)?;
        if parsed.task_id.trim().is_empty() {
            return Err(malformed("empty task_id in submission response", body));
        }

        tracing::info!(task_id = %parsed.task_id, model = model_name, "Task submitted upstream");
        Ok(parsed.task_id)
    }

    /// Query a task's status.
    ///
    /// `deadline` bounds the whole request, body included. When
    /// `callback_url` is given the request also registers it as the task's
    /// webhook, so the upstream may push completion as well.
    ///
    /// A 404 is reported as [`UpstreamError::TaskNotFound`]; the snapshot
    /// carries a result URL only when the task succeeded.
    pub async fn fetch_task_result(
        &self,
        task_id: &str,
        callback_url: Option<&str>,
        deadline: Duration,
    ) -> Result<TaskSnapshot, UpstreamError> {
        let mut request = self
            .client
            .get(format!("{}/v3/async/task-result", self.base_url))
            .query(&[("task_id", task_id)])
            .bearer_auth(&self.api_key)
            .timeout(deadline);

        if callback_url.is_some() {
            request = request.json(&QueryTaskRequest {
                extra: Extra::with_webhook(callback_url),
            });
        }

        let response = request.send().await.map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!(task_id, "Task not found upstream");
            return Err(UpstreamError::TaskNotFound {
                task_id: task_id.to_string(),
            });
        }

        let body = Self::success_body(response).await?;
        let parsed: TaskResultResponse = Self::parse_body(&body)?;
        let snapshot = parsed
            .task
            .to_snapshot(task_id, &parsed.images, SnapshotSource::Poll);

        tracing::debug!(
            task_id,
            status = %snapshot.status,
            progress = snapshot.progress_percent,
            "Queried task status",
        );
        Ok(snapshot)
    }

    // ---- private helpers ----

    /// Read the body of a 2xx response, or turn a non-2xx response into
    /// [`UpstreamError::Status`] with its body text.
    async fn success_body(response: reqwest::Response) -> Result<String, UpstreamError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(status = status.as_u16(), body = %body, "Upstream returned error status");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response.text().await.map_err(transport_error)
    }

    fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, UpstreamError> {
        serde_json::from_str(body).map_err(|e| malformed(&e.to_string(), body.to_string()))
    }
}

#[async_trait]
impl TaskSource for NovitaApi {
    async fn submit_task(&self, params: &SubmitParams) -> Result<TaskId, UpstreamError> {
        self.submit_txt2img(
            &params.model_name,
            &params.prompt,
            params.callback_url.as_deref(),
        )
        .await
    }

    async fn query_task(
        &self,
        task_id: &str,
        callback_url: Option<&str>,
        deadline: Duration,
    ) -> Result<TaskSnapshot, UpstreamError> {
        self.fetch_task_result(task_id, callback_url, deadline).await
    }
}

fn transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        tracing::warn!(error = %err, "Upstream request timed out");
        UpstreamError::Unavailable("request timed out".to_string())
    } else {
        tracing::warn!(error = %err, "Upstream request failed");
        UpstreamError::Unavailable(err.to_string())
    }
}

fn malformed(reason: &str, body: String) -> UpstreamError {
    tracing::error!(reason, body = %body, "Malformed upstream response");
    UpstreamError::Malformed {
        reason: reason.to_string(),
        body,
    }
}
