//! Client-facing failure taxonomy for relay connections.
//!
//! Every variant renders to a fixed, safe message via `Display`. Upstream
//! diagnostics (raw bodies, transport errors) stay in the logs and never
//! reach a client.

/// Why a relay connection ended without a successful result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayFailure {
    /// Network failure or deadline exceeded talking to the upstream.
    #[error("The generation service is temporarily unavailable")]
    UpstreamUnavailable,

    /// The upstream does not know the task (invalid or expired ID).
    #[error("The generation task was not found")]
    TaskNotFound,

    /// The upstream kept answering with a non-success status.
    #[error("The generation service returned an error")]
    UpstreamError,

    /// The upstream answered with a body we could not understand.
    #[error("The generation service returned an unexpected response")]
    UpstreamMalformedResponse,

    /// No terminal state within the relay's wait window.
    #[error("Timed out waiting for the generation task to finish")]
    StreamTimeout,

    /// The upstream reported the task as failed.
    #[error("{}", task_failed_message(.reason))]
    TaskFailed { reason: String },
}

impl RelayFailure {
    /// Stable machine-readable code, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            RelayFailure::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            RelayFailure::TaskNotFound => "TASK_NOT_FOUND",
            RelayFailure::UpstreamError => "UPSTREAM_ERROR",
            RelayFailure::UpstreamMalformedResponse => "UPSTREAM_MALFORMED_RESPONSE",
            RelayFailure::StreamTimeout => "STREAM_TIMEOUT",
            RelayFailure::TaskFailed { .. } => "TASK_FAILED",
        }
    }
}

fn task_failed_message(reason: &str) -> String {
    if reason.trim().is_empty() {
        "The generation task failed".to_string()
    } else {
        format!("The generation task failed: {}", reason.trim())
    }
}
