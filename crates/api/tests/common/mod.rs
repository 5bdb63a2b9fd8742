#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use relay_api::config::RelayConfig;
use relay_api::relay::{RelayContext, RelayOptions};
use relay_api::router::build_app_router;
use relay_api::state::AppState;
use relay_core::status::TaskStatus;
use relay_core::task::{SnapshotSource, TaskSnapshot};
use relay_core::types::TaskId;
use relay_novita::source::{SubmitParams, TaskSource};
use relay_novita::UpstreamError;
use relay_registry::TaskRegistry;
use tower::ServiceExt;

pub const TASK_ID: &str = "task-1";
pub const CALLBACK_URL: &str = "http://relay.test/webhook";

// ---------------------------------------------------------------------------
// Fake upstream
// ---------------------------------------------------------------------------

/// One scripted answer to `query_task`.
///
/// Snapshots are stamped when the query runs, not when the script is built,
/// so they always post-date the submission record.
#[derive(Debug, Clone)]
pub enum Reply {
    Status {
        status: TaskStatus,
        delta: String,
        result_url: String,
        reason: String,
    },
    Error(UpstreamError),
}

impl Reply {
    pub fn pending() -> Self {
        Self::pending_with("")
    }

    pub fn pending_with(delta: &str) -> Self {
        Reply::Status {
            status: TaskStatus::Pending,
            delta: delta.into(),
            result_url: String::new(),
            reason: String::new(),
        }
    }

    pub fn succeeded(result_url: &str) -> Self {
        Reply::Status {
            status: TaskStatus::Succeeded,
            delta: String::new(),
            result_url: result_url.into(),
            reason: String::new(),
        }
    }

    pub fn succeeded_with(delta: &str) -> Self {
        Reply::Status {
            status: TaskStatus::Succeeded,
            delta: delta.into(),
            result_url: String::new(),
            reason: String::new(),
        }
    }

    pub fn failed(reason: &str) -> Self {
        Reply::Status {
            status: TaskStatus::Failed,
            delta: String::new(),
            result_url: String::new(),
            reason: reason.into(),
        }
    }

    pub fn unavailable() -> Self {
        Reply::Error(UpstreamError::Unavailable("connection refused".into()))
    }

    pub fn not_found() -> Self {
        Reply::Error(UpstreamError::TaskNotFound {
            task_id: TASK_ID.into(),
        })
    }

    fn snapshot(
        &self,
        task_id: &str,
        source: SnapshotSource,
    ) -> Result<TaskSnapshot, UpstreamError> {
        match self {
            Reply::Status {
                status,
                delta,
                result_url,
                reason,
            } => Ok(TaskSnapshot::new(task_id, *status, source)
                .with_delta(delta.clone())
                .with_result_url(result_url.clone())
                .with_failure_reason(reason.clone())),
            Reply::Error(e) => Err(e.clone()),
        }
    }
}

/// Scripted [`TaskSource`].
///
/// Queries consume `replies` in order, then keep returning `fallback`.
pub struct FakeSource {
    submit: Result<TaskId, UpstreamError>,
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    /// Webhook delivered while the submission is still in flight.
    racing_webhook: Option<(Arc<TaskRegistry>, Reply)>,
    /// Webhook delivered during the first query, observed just after the
    /// snapshot that query returns.
    overtaking_webhook: Mutex<Option<(Arc<TaskRegistry>, Reply)>>,
    queries: AtomicUsize,
    submitted: Mutex<Vec<SubmitParams>>,
    query_callbacks: Mutex<Vec<Option<String>>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            submit: Ok(TASK_ID.into()),
            replies: Mutex::new(VecDeque::new()),
            fallback: Reply::pending(),
            racing_webhook: None,
            overtaking_webhook: Mutex::new(None),
            queries: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            query_callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies(mut self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.replies = Mutex::new(replies.into_iter().collect());
        self
    }

    pub fn with_fallback(mut self, fallback: Reply) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_submit_error(mut self, err: UpstreamError) -> Self {
        self.submit = Err(err);
        self
    }

    pub fn with_racing_webhook(mut self, registry: Arc<TaskRegistry>, reply: Reply) -> Self {
        self.racing_webhook = Some((registry, reply));
        self
    }

    pub fn with_overtaking_webhook(self, registry: Arc<TaskRegistry>, reply: Reply) -> Self {
        *self.overtaking_webhook.lock().unwrap() = Some((registry, reply));
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<SubmitParams> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn query_callbacks(&self) -> Vec<Option<String>> {
        self.query_callbacks.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskSource for FakeSource {
    async fn submit_task(&self, params: &SubmitParams) -> Result<TaskId, UpstreamError> {
        self.submitted.lock().unwrap().push(params.clone());
        let task_id = self.submit.clone()?;
        if let Some((registry, reply)) = &self.racing_webhook {
            if let Ok(snapshot) = reply.snapshot(&task_id, SnapshotSource::Webhook) {
                registry.update(snapshot).await;
            }
        }
        Ok(task_id)
    }

    async fn query_task(
        &self,
        task_id: &str,
        callback_url: Option<&str>,
        _deadline: Duration,
    ) -> Result<TaskSnapshot, UpstreamError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.query_callbacks
            .lock()
            .unwrap()
            .push(callback_url.map(str::to_string));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let snapshot = reply.snapshot(task_id, SnapshotSource::Poll)?;

        let overtaking = self.overtaking_webhook.lock().unwrap().take();
        if let Some((registry, webhook)) = overtaking {
            let observed = snapshot.observed_at;
            if let Ok(pushed) = webhook.snapshot(task_id, SnapshotSource::Webhook) {
                registry.update(pushed.observed_at(observed)).await;
            }
            return Ok(snapshot.observed_at(observed - chrono::Duration::milliseconds(1)));
        }
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Relay fixtures
// ---------------------------------------------------------------------------

pub fn relay_options() -> RelayOptions {
    RelayOptions {
        stream_timeout: Duration::from_secs(10),
        poll_interval: Duration::from_secs(1),
        upstream_timeout: Duration::from_secs(5),
        max_poll_retries: 2,
        forward_deltas: true,
        callback_url: Some(CALLBACK_URL.into()),
    }
}

pub fn relay_context(source: Arc<FakeSource>, registry: Arc<TaskRegistry>) -> RelayContext {
    RelayContext {
        registry,
        upstream: source,
        options: relay_options(),
    }
}

// ---------------------------------------------------------------------------
// HTTP fixtures
// ---------------------------------------------------------------------------

/// Build a test `RelayConfig` with short relay timings.
pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.server.host = "127.0.0.1".into();
    config.server.port = 0;
    config.server.public_url = "http://relay.test".into();
    config.relay.poll_interval = "20ms".into();
    config.relay.stream_timeout = "5s".into();
    config.settings.timeout = "1s".into();
    config
}

/// Build the full application router around `source`, returning the
/// registry so tests can inspect or seed it.
pub fn build_test_app(source: Arc<FakeSource>) -> (Router, Arc<TaskRegistry>) {
    let registry = Arc::new(TaskRegistry::default());
    let state = AppState::new(test_config(), Arc::clone(&registry), source)
        .expect("test config is valid");
    (build_app_router(state), registry)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn post(app: Router, uri: &str, body: impl Into<Body>) -> Response<Body> {
    send(app, Method::POST, uri, body.into()).await
}

pub async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Parse every `data:` line of an event-stream body as JSON.
pub async fn sse_frames(response: Response<Body>) -> Vec<serde_json::Value> {
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status for response");
}

/// A webhook body for `task_id` in the upstream's envelope format.
pub fn webhook_body(task_id: &str, status: &str, image_url: &str) -> String {
    serde_json::json!({
        "event_type": "ASYNC_TASK_RESULT",
        "payload": {
            "task": {
                "task_id": task_id,
                "status": status,
                "progress_percent": 100,
                "task_type": "TXT_TO_IMG",
            },
            "extra": {},
            "images": [{"image_url": image_url, "image_type": "png", "image_url_ttl": 3600}],
        }
    })
    .to_string()
}
