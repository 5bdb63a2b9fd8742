//! Per-connection stream relay.
//!
//! A relay connection submits one generation job, then forwards the task's
//! registry updates to the client as [`StreamEvent`] frames until the task
//! reaches a terminal state, the client goes away, or the wait window
//! elapses. A companion [`poller::Poller`] keeps the registry fresh while the
//! connection is open, in case the webhook never arrives.
//!
//! ```text
//! Connecting -> Streaming -> { Completed | Failed | ClientDisconnected | Timeout }
//! ```
//!
//! The relay is transport-agnostic: it writes into an mpsc channel, and the
//! receiver being dropped is the disconnect signal.

pub mod poller;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_core::failure::RelayFailure;
use relay_core::status::TaskStatus;
use relay_core::stream_event::StreamEvent;
use relay_core::task::{SnapshotSource, Task, TaskSnapshot};
use relay_core::types::TaskId;
use relay_novita::source::SubmitParams;
use relay_novita::TaskSource;
use relay_registry::{SubscriptionError, TaskRegistry, TaskSubscription};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use self::poller::Poller;

/// Frames buffered per connection before the relay waits on the client.
const EVENT_BUFFER: usize = 32;

/// How long a stalled client may hold up the accepted or the final frame.
pub const FRAME_SEND_GRACE: Duration = Duration::from_secs(5);

/// Tunables for every relay connection.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Wall-clock window to wait for a terminal state.
    pub stream_timeout: Duration,
    pub poll_interval: Duration,
    /// Deadline for each upstream query.
    pub upstream_timeout: Duration,
    pub max_poll_retries: u32,
    /// Forward intermediate deltas. Terminal frames are always sent.
    pub forward_deltas: bool,
    /// Webhook URL registered with the upstream.
    pub callback_url: Option<String>,
}

/// Shared dependencies of a relay connection.
#[derive(Clone)]
pub struct RelayContext {
    pub registry: Arc<TaskRegistry>,
    pub upstream: Arc<dyn TaskSource>,
    pub options: RelayOptions,
}

/// What the client asked to generate.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub prompt: String,
    pub model_name: String,
}

/// Lifecycle of a relay connection. The last four are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayState {
    Connecting,
    Streaming { task_id: TaskId },
    Completed { task_id: TaskId },
    Failed(RelayFailure),
    ClientDisconnected,
    Timeout,
}

impl RelayState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayState::Connecting | RelayState::Streaming { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelayState::Connecting => "connecting",
            RelayState::Streaming { .. } => "streaming",
            RelayState::Completed { .. } => "completed",
            RelayState::Failed(_) => "failed",
            RelayState::ClientDisconnected => "client_disconnected",
            RelayState::Timeout => "timeout",
        }
    }
}

/// A running relay connection.
pub struct RelayHandle {
    /// Frames for the client. Dropping this disconnects the relay.
    pub events: mpsc::Receiver<StreamEvent>,
    /// Resolves to the connection's terminal state.
    pub task: JoinHandle<RelayState>,
}

/// Start a relay connection on its own task.
pub fn spawn_relay(ctx: RelayContext, request: RelayRequest) -> RelayHandle {
    let (tx, events) = mpsc::channel(EVENT_BUFFER);
    let relay = Relay {
        conn_id: Uuid::now_v7(),
        ctx,
        tx,
        state: RelayState::Connecting,
    };
    let task = tokio::spawn(relay.run(request));
    RelayHandle { events, task }
}

struct Relay {
    conn_id: Uuid,
    ctx: RelayContext,
    tx: mpsc::Sender<StreamEvent>,
    state: RelayState,
}

impl Relay {
    async fn run(mut self, request: RelayRequest) -> RelayState {
        tracing::info!(
            conn_id = %self.conn_id,
            model = %request.model_name,
            "Relay connection opened",
        );

        let state = match self.connect(request).await {
            Ok((task_id, subscription)) => self.stream(task_id, subscription).await,
            Err(state) => state,
        };

        self.transition(state.clone());
        match &state {
            RelayState::Failed(failure) => tracing::warn!(
                conn_id = %self.conn_id,
                code = failure.code(),
                "Relay connection failed",
            ),
            RelayState::ClientDisconnected => {
                tracing::debug!(conn_id = %self.conn_id, "Client disconnected")
            }
            _ => tracing::info!(
                conn_id = %self.conn_id,
                state = state.as_str(),
                "Relay connection closed",
            ),
        }
        state
    }

    /// Submit the job and register it, returning a live subscription.
    async fn connect(
        &mut self,
        request: RelayRequest,
    ) -> Result<(TaskId, TaskSubscription), RelayState> {
        let params = SubmitParams {
            model_name: request.model_name,
            prompt: request.prompt,
            callback_url: self.ctx.options.callback_url.clone(),
        };

        // Taken before the call so a webhook racing the submission response
        // is never shadowed by the Pending record below.
        let submitted_at = Utc::now();
        let submitted = tokio::select! {
            _ = self.tx.closed() => return Err(RelayState::ClientDisconnected),
            result = self.ctx.upstream.submit_task(&params) => result,
        };

        let task_id = match submitted {
            Ok(task_id) => task_id,
            Err(e) => {
                tracing::warn!(conn_id = %self.conn_id, error = %e, "Task submission failed");
                let failure = RelayFailure::from(&e);
                self.send_with_grace(StreamEvent::failure(&failure)).await;
                return Err(RelayState::Failed(failure));
            }
        };

        // Subscribe first so no update between here and the first wait is lost.
        let subscription = self.ctx.registry.subscribe(&task_id).await;
        let pending =
            TaskSnapshot::new(task_id.clone(), TaskStatus::Pending, SnapshotSource::Submission)
                .observed_at(submitted_at);
        self.ctx.registry.update(pending).await;

        self.transition(RelayState::Streaming {
            task_id: task_id.clone(),
        });
        self.send_with_grace(StreamEvent::accepted()).await;
        Ok((task_id, subscription))
    }

    async fn stream(&mut self, task_id: TaskId, mut subscription: TaskSubscription) -> RelayState {
        let now = Instant::now();
        let deadline = now
            .checked_add(self.ctx.options.stream_timeout)
            .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365));

        // A webhook may have finished the task before we subscribed.
        if let Some(task) = self.ctx.registry.get(&task_id).await {
            if task.is_terminal() {
                if let Some(state) = self.on_update(&task, deadline).await {
                    return state;
                }
            }
        }

        let cancel = CancellationToken::new();
        let poller = Poller {
            upstream: Arc::clone(&self.ctx.upstream),
            registry: Arc::clone(&self.ctx.registry),
            task_id: task_id.clone(),
            callback_url: self.ctx.options.callback_url.clone(),
            interval: self.ctx.options.poll_interval,
            deadline: self.ctx.options.upstream_timeout,
            max_retries: self.ctx.options.max_poll_retries,
        };
        let mut polling = tokio::spawn(poller.run(cancel.child_token()));
        let mut poller_done = false;

        let timeout = tokio::time::sleep_until(deadline);
        tokio::pin!(timeout);

        let state = loop {
            tokio::select! {
                _ = self.tx.closed() => break RelayState::ClientDisconnected,

                _ = &mut timeout => {
                    tracing::info!(
                        conn_id = %self.conn_id,
                        task_id = %task_id,
                        "Relay wait window elapsed",
                    );
                    self.send_with_grace(StreamEvent::failure(&RelayFailure::StreamTimeout)).await;
                    break RelayState::Timeout;
                }

                joined = &mut polling, if !poller_done => {
                    poller_done = true;
                    match joined {
                        Ok(Some(e)) => {
                            let failure = RelayFailure::from(&e);
                            self.send_with_grace(StreamEvent::failure(&failure)).await;
                            break RelayState::Failed(failure);
                        }
                        // Terminal state reached; its notification is queued.
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!(
                                conn_id = %self.conn_id,
                                error = %e,
                                "Poller task aborted",
                            );
                        }
                    }
                }

                received = subscription.recv() => {
                    let task = match received {
                        Ok(task) => Some(task),
                        Err(SubscriptionError::Lagged(skipped)) => {
                            tracing::warn!(
                                conn_id = %self.conn_id,
                                task_id = %task_id,
                                skipped,
                                "Relay lagged behind task updates, resynchronising",
                            );
                            self.ctx.registry.get(&task_id).await
                        }
                        Err(SubscriptionError::Closed) => {
                            tracing::error!(
                                conn_id = %self.conn_id,
                                task_id = %task_id,
                                "Task subscription closed",
                            );
                            let failure = RelayFailure::UpstreamUnavailable;
                            self.send_with_grace(StreamEvent::failure(&failure)).await;
                            break RelayState::Failed(failure);
                        }
                    };
                    if let Some(task) = task {
                        if let Some(state) = self.on_update(&task, deadline).await {
                            break state;
                        }
                    }
                }
            }
        };

        cancel.cancel();
        drop(subscription);
        state
    }

    /// Emit the frame for one task update; returns the terminal state when
    /// the task is finished.
    async fn on_update(&mut self, task: &Task, deadline: Instant) -> Option<RelayState> {
        match task.status {
            TaskStatus::Succeeded => {
                let content = if task.delta.is_empty() {
                    task.result_url.clone()
                } else {
                    task.delta.clone()
                };
                self.send_with_grace(StreamEvent::content(content, true)).await;
                Some(RelayState::Completed {
                    task_id: task.id.clone(),
                })
            }
            TaskStatus::Failed => {
                let failure = RelayFailure::TaskFailed {
                    reason: task.failure_reason.clone(),
                };
                self.send_with_grace(StreamEvent::failure(&failure)).await;
                Some(RelayState::Failed(failure))
            }
            TaskStatus::Pending => {
                if self.ctx.options.forward_deltas && !task.delta.is_empty() {
                    self.send_until(StreamEvent::content(task.delta.clone(), false), deadline)
                        .await;
                }
                None
            }
        }
    }

    /// Write a frame, waiting on a full buffer no later than `deadline`.
    /// A closed channel is picked up by the next wait.
    async fn send_until(&self, event: StreamEvent, deadline: Instant) {
        match tokio::time::timeout_at(deadline, self.tx.send(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                tracing::debug!(conn_id = %self.conn_id, "Dropped frame for closed connection")
            }
            Err(_) => tracing::warn!(
                conn_id = %self.conn_id,
                "Client stalled past the wait window, dropped frame",
            ),
        }
    }

    /// Write a frame the client must not miss, giving a stalled client at
    /// most [`FRAME_SEND_GRACE`].
    async fn send_with_grace(&self, event: StreamEvent) {
        self.send_until(event, Instant::now() + FRAME_SEND_GRACE).await;
    }

    fn transition(&mut self, next: RelayState) {
        tracing::debug!(
            conn_id = %self.conn_id,
            from = self.state.as_str(),
            to = next.as_str(),
            "Relay state transition",
        );
        self.state = next;
    }
}
