use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use serenade_orchestrator::OrchestratorError;
use serenade_provider::ProviderError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`OrchestratorError`] for domain errors and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON
/// error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from the orchestrator.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    /// The request payload failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Orchestrator(err) => classify_orchestrator_error(err),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify an orchestrator error into an HTTP status, error code, and message.
///
/// - Unknown jobs map to 404.
/// - Provider rejections and outages map to 502 (the failure is
///   upstream, not in this service).
/// - Store/reconciler failures map to 500 with a sanitized message.
fn classify_orchestrator_error(err: &OrchestratorError) -> (StatusCode, &'static str, String) {
    match err {
        OrchestratorError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Job {id} not found"),
        ),
        OrchestratorError::Provider(provider)
        | OrchestratorError::SubmitFailed {
            error: provider, ..
        } => {
            let code = match provider {
                ProviderError::Rejected(_) => "PROVIDER_REJECTED",
                _ => "PROVIDER_UNAVAILABLE",
            };
            (StatusCode::BAD_GATEWAY, code, err.to_string())
        }
        OrchestratorError::Store(e) => {
            tracing::error!(error = %e, "Store error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        OrchestratorError::Reconcile(e) => {
            tracing::error!(error = %e, "Reconcile error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
