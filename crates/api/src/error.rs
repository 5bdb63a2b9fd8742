use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_core::error::CoreError;
use relay_core::failure::RelayFailure;
use relay_novita::UpstreamError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`UpstreamError`] for calls to
/// the task API. Implements [`IntoResponse`] to produce consistent JSON
/// error responses; upstream diagnostics are logged, never returned.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `relay_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A failed call to the upstream task API.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
            },

            // --- Upstream errors ---
            AppError::Upstream(err) => classify_upstream_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify an upstream error into an HTTP status, error code, and the
/// failure taxonomy's safe message.
///
/// - `TaskNotFound` maps to 404.
/// - `Unavailable` maps to 503.
/// - Non-success statuses and malformed bodies map to 502.
fn classify_upstream_error(err: &UpstreamError) -> (StatusCode, &'static str, String) {
    let failure = RelayFailure::from(err);
    let status = match err {
        UpstreamError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
        UpstreamError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        UpstreamError::Status { .. } | UpstreamError::Malformed { .. } => StatusCode::BAD_GATEWAY,
    };
    if status != StatusCode::NOT_FOUND {
        tracing::warn!(error = %err, "Upstream call failed");
    }
    (status, failure.code(), failure.to_string())
}
