//! In-memory task registry.
//!
//! [`TaskRegistry`] is the single owner of every [`Task`] record and the
//! only place where the webhook path and the polling path meet. All writes
//! go through [`TaskRegistry::update`], which serializes under one lock,
//! enforces the terminal-state invariant, resolves pull/push races by
//! observation time, and fans the resulting record out to subscribers.
//!
//! Designed to be shared via `Arc<TaskRegistry>`.

pub mod subscription;

use std::collections::HashMap;

use relay_core::task::{Task, TaskSnapshot};
use relay_core::types::TaskId;
use tokio::sync::{broadcast, RwLock};

pub use subscription::{SubscriptionError, TaskSubscription};

/// Default per-task notification buffer.
///
/// A subscriber that falls further behind than this observes
/// [`SubscriptionError::Lagged`] and should resynchronise via
/// [`TaskRegistry::get`].
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Result of a single [`TaskRegistry::update`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// First time this task ID was seen; a record was created.
    Created,
    /// The existing record was replaced.
    Applied,
    /// The record is already terminal; nothing changed.
    RejectedTerminal,
    /// The snapshot is older than the record (or loses a tie); nothing changed.
    RejectedStale,
}

impl UpdateOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, UpdateOutcome::Created | UpdateOutcome::Applied)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateOutcome::Created => "created",
            UpdateOutcome::Applied => "applied",
            UpdateOutcome::RejectedTerminal => "rejected_terminal",
            UpdateOutcome::RejectedStale => "rejected_stale",
        }
    }
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<TaskId, Task>,
    watchers: HashMap<TaskId, broadcast::Sender<Task>>,
}

/// Shared map from task ID to its current state.
pub struct TaskRegistry {
    inner: RwLock<Inner>,
    channel_capacity: usize,
}

impl TaskRegistry {
    /// Create an empty registry with a specific per-task channel capacity.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Apply a snapshot to the record for `snapshot.task_id`.
    ///
    /// - Unknown ID: a record is created from the snapshot.
    /// - Terminal record: no-op ([`UpdateOutcome::RejectedTerminal`]).
    /// - Otherwise the later observation wins and older snapshots are
    ///   rejected as stale. On an exact tie the incoming snapshot applies,
    ///   since the record it would replace is non-terminal.
    ///
    /// Subscribers are notified while the write lock is held, so every
    /// subscriber sees applied updates in the order they were applied.
    pub async fn update(&self, snapshot: TaskSnapshot) -> UpdateOutcome {
        let mut inner = self.inner.write().await;
        let Inner { tasks, watchers } = &mut *inner;

        let task_id = snapshot.task_id.clone();
        let source = snapshot.source;

        let (outcome, current) = match tasks.get_mut(&task_id) {
            None => {
                let task = Task::from_snapshot(snapshot);
                tasks.insert(task_id.clone(), task.clone());
                (UpdateOutcome::Created, task)
            }
            Some(existing) => match resolve(existing, &snapshot) {
                UpdateOutcome::Applied => {
                    existing.apply(snapshot);
                    (UpdateOutcome::Applied, existing.clone())
                }
                rejected => {
                    tracing::debug!(
                        task_id = %task_id,
                        source = source.as_str(),
                        current_status = %existing.status,
                        incoming_status = %snapshot.status,
                        outcome = rejected.as_str(),
                        "Task update rejected",
                    );
                    return rejected;
                }
            },
        };

        tracing::debug!(
            task_id = %task_id,
            source = source.as_str(),
            status = %current.status,
            progress = current.progress_percent,
            outcome = outcome.as_str(),
            "Task updated",
        );

        let terminal = current.is_terminal();
        if let Some(tx) = watchers.get(&task_id) {
            // A send error only means every subscriber has gone away.
            let idle = tx.send(current).is_err();
            // No applied update follows a terminal one. Receivers still
            // drain the buffered record before observing `Closed`.
            if idle || terminal {
                watchers.remove(&task_id);
            }
        }

        outcome
    }

    /// Point read of a task's current state.
    pub async fn get(&self, task_id: &str) -> Option<Task> {
        self.inner.read().await.tasks.get(task_id).cloned()
    }

    /// Subscribe to every applied update for `task_id`.
    ///
    /// Subscribing does not create a task record. Dropping the returned
    /// subscription unsubscribes; channels left without receivers are swept
    /// on the next subscribe.
    pub async fn subscribe(&self, task_id: &str) -> TaskSubscription {
        let mut inner = self.inner.write().await;
        inner.watchers.retain(|_, tx| tx.receiver_count() > 0);
        let receiver = match inner.watchers.get(task_id) {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(self.channel_capacity);
                inner.watchers.insert(task_id.to_string(), tx);
                rx
            }
        };
        TaskSubscription::new(task_id.to_string(), receiver)
    }

    /// Number of live subscriptions for `task_id`.
    pub async fn subscriber_count(&self, task_id: &str) -> usize {
        self.inner
            .read()
            .await
            .watchers
            .get(task_id)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Number of task records.
    pub async fn len(&self) -> usize {
        self.inner.read().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.tasks.is_empty()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// Decide whether `incoming` may replace `existing`.
///
/// Returns [`UpdateOutcome::Applied`] or one of the rejections.
fn resolve(existing: &Task, incoming: &TaskSnapshot) -> UpdateOutcome {
    if existing.is_terminal() {
        return UpdateOutcome::RejectedTerminal;
    }

    match incoming.observed_at.cmp(&existing.last_updated) {
        std::cmp::Ordering::Greater => UpdateOutcome::Applied,
        std::cmp::Ordering::Less => UpdateOutcome::RejectedStale,
        // Existing is non-terminal here, so any incoming status is at least
        // as final as the record; the later arrival wins the tie.
        std::cmp::Ordering::Equal => UpdateOutcome::Applied,
    }
}
