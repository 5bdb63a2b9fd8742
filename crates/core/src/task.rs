//! Task records and the normalized snapshot both upstream paths decode into.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::status::TaskStatus;
use crate::types::{TaskId, Timestamp};

/// Upper bound for `progress_percent`.
pub const MAX_PROGRESS: u8 = 100;

/// Which path produced a snapshot. Informational only (logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Submission,
    Poll,
    Webhook,
}

impl SnapshotSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotSource::Submission => "submission",
            SnapshotSource::Poll => "poll",
            SnapshotSource::Webhook => "webhook",
        }
    }
}

// ---------------------------------------------------------------------------
// TaskSnapshot
// ---------------------------------------------------------------------------

/// A task's state at one point in time, as reported by the upstream.
///
/// Constructed via [`TaskSnapshot::new`] and enriched with the builder
/// methods. The builders enforce the field invariants: a result URL is
/// kept only for [`TaskStatus::Succeeded`], a failure reason only for
/// [`TaskStatus::Failed`], and progress is clamped to `0..=100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub progress_percent: u8,
    pub result_url: String,
    pub failure_reason: String,
    /// Incremental content fragment carried by this update (may be empty).
    pub delta: String,
    /// Upstream task type label, e.g. `TXT_TO_IMG`.
    pub task_type: Option<String>,
    pub observed_at: Timestamp,
    pub source: SnapshotSource,
}

impl TaskSnapshot {
    /// Create a snapshot observed now with no progress or payload.
    pub fn new(task_id: impl Into<TaskId>, status: TaskStatus, source: SnapshotSource) -> Self {
        Self {
            task_id: task_id.into(),
            status,
            progress_percent: 0,
            result_url: String::new(),
            failure_reason: String::new(),
            delta: String::new(),
            task_type: None,
            observed_at: Utc::now(),
            source,
        }
    }

    /// Set progress, clamping values outside `0..=100`.
    pub fn with_progress(mut self, percent: i64) -> Self {
        self.progress_percent = percent.clamp(0, i64::from(MAX_PROGRESS)) as u8;
        self
    }

    /// Attach a result URL. Ignored unless the status is `Succeeded`.
    pub fn with_result_url(mut self, url: impl Into<String>) -> Self {
        if self.status == TaskStatus::Succeeded {
            self.result_url = url.into();
        }
        self
    }

    /// Attach a failure reason. Ignored unless the status is `Failed`.
    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        if self.status == TaskStatus::Failed {
            self.failure_reason = reason.into();
        }
        self
    }

    pub fn with_delta(mut self, delta: impl Into<String>) -> Self {
        self.delta = delta.into();
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        let task_type = task_type.into();
        self.task_type = (!task_type.is_empty()).then_some(task_type);
        self
    }

    pub fn observed_at(mut self, at: Timestamp) -> Self {
        self.observed_at = at;
        self
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// The registry's record for one upstream task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    pub progress_percent: u8,
    pub result_url: String,
    pub failure_reason: String,
    /// Delta carried by the most recently applied update.
    pub delta: String,
    pub task_type: Option<String>,
    pub last_updated: Timestamp,
}

impl Task {
    /// Build the first record for a task from the snapshot that introduced it.
    pub fn from_snapshot(snapshot: TaskSnapshot) -> Self {
        Self {
            id: snapshot.task_id,
            status: snapshot.status,
            progress_percent: snapshot.progress_percent,
            result_url: snapshot.result_url,
            failure_reason: snapshot.failure_reason,
            delta: snapshot.delta,
            task_type: snapshot.task_type,
            last_updated: snapshot.observed_at,
        }
    }

    /// Replace every mutable field with the snapshot's values.
    ///
    /// A snapshot without a task type keeps the known one.
    pub fn apply(&mut self, snapshot: TaskSnapshot) {
        self.status = snapshot.status;
        self.progress_percent = snapshot.progress_percent;
        self.result_url = snapshot.result_url;
        self.failure_reason = snapshot.failure_reason;
        self.delta = snapshot.delta;
        if snapshot.task_type.is_some() {
            self.task_type = snapshot.task_type;
        }
        self.last_updated = snapshot.observed_at;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
