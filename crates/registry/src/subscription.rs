//! Per-task notification handle returned by [`TaskRegistry::subscribe`].
//!
//! [`TaskRegistry::subscribe`]: crate::TaskRegistry::subscribe

use relay_core::task::Task;
use relay_core::types::TaskId;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// The subscriber fell behind and `n` updates were dropped.
    #[error("Subscriber lagged behind by {0} updates")]
    Lagged(u64),

    /// The registry side of the channel is gone.
    #[error("Task subscription closed")]
    Closed,
}

/// Receives a copy of the task record after every applied update.
///
/// Dropping the subscription unsubscribes.
pub struct TaskSubscription {
    task_id: TaskId,
    receiver: broadcast::Receiver<Task>,
}

impl TaskSubscription {
    pub(crate) fn new(task_id: TaskId, receiver: broadcast::Receiver<Task>) -> Self {
        Self { task_id, receiver }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Wait for the next applied update.
    ///
    /// Cancel-safe, so it can sit in a `tokio::select!` arm.
    pub async fn recv(&mut self) -> Result<Task, SubscriptionError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(n) => SubscriptionError::Lagged(n),
            broadcast::error::RecvError::Closed => SubscriptionError::Closed,
        })
    }
}
