//! Internal task status and the upstream status mapper.
//!
//! The upstream provider reports a family of `TASK_STATUS_*` codes (and
//! some providers use plain lowercase words). Everything collapses onto
//! three internal values. Unknown codes map to [`TaskStatus::Pending`] so a
//! task is never reported finished on a code we do not understand.

use serde::{Deserialize, Serialize};

/// Internal lifecycle of an upstream task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, running, or any other in-progress upstream sub-state.
    Pending,
    Succeeded,
    Failed,
}

impl TaskStatus {
    /// `Succeeded` and `Failed` are terminal: no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translate an upstream status code into a [`TaskStatus`].
///
/// Total over all inputs. Matching ignores ASCII case and surrounding
/// whitespace.
pub fn map_status(upstream_code: &str) -> TaskStatus {
    let code = upstream_code.trim().to_ascii_uppercase();
    let code = code.strip_prefix("TASK_STATUS_").unwrap_or(&code);

    match code {
        "SUCCEED" | "SUCCEEDED" | "SUCCESS" | "COMPLETED" => TaskStatus::Succeeded,
        "FAILED" | "FAILURE" | "ERROR" => TaskStatus::Failed,
        // QUEUED / PENDING / PROCESSING / RUNNING and anything unknown.
        _ => TaskStatus::Pending,
    }
}
