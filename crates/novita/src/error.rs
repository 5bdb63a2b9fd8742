use relay_core::failure::RelayFailure;

/// Errors from the upstream REST layer.
///
/// Variants carry diagnostic detail for logs; convert to [`RelayFailure`]
/// before anything reaches a client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Transport failure or the request deadline elapsed.
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// The upstream answered 404 for a task query.
    #[error("Task not found upstream: {task_id}")]
    TaskNotFound { task_id: String },

    /// Any other non-2xx response.
    #[error("Upstream API error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body does not have the expected shape.
    #[error("Malformed upstream response: {reason}")]
    Malformed { reason: String, body: String },
}

impl UpstreamError {
    /// Whether the caller may retry (with backoff).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamError::Unavailable(_) | UpstreamError::Status { .. }
        )
    }
}

impl From<&UpstreamError> for RelayFailure {
    fn from(err: &UpstreamError) -> Self {
        match err {
            UpstreamError::Unavailable(_) => RelayFailure::UpstreamUnavailable,
            UpstreamError::TaskNotFound { .. } => RelayFailure::TaskNotFound,
            UpstreamError::Status { .. } => RelayFailure::UpstreamError,
            UpstreamError::Malformed { .. } => RelayFailure::UpstreamMalformedResponse,
        }
    }
}

impl From<UpstreamError> for RelayFailure {
    fn from(err: UpstreamError) -> Self {
        RelayFailure::from(&err)
    }
}
