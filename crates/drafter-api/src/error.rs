use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

/// Failure kinds the handlers can surface. Each maps to one status code
/// and a human-readable `detail` string in the response body; anything
/// wrapped in `Internal` is logged server-side and never shown verbatim.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    InvalidToken(String),
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Not authenticated")]
    Unauthorized,
    #[error("OpenAI API Error: {0}")]
    CompletionFailed(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::InvalidInput(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::InvalidToken(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid username or password".to_string())
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Not authenticated".to_string()),
            ApiError::CompletionFailed(reason) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("OpenAI API Error: {reason}"),
            ),
            ApiError::Internal(err) => {
                error!("Internal error: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

impl From<drafter_llm::CompletionError> for ApiError {
    fn from(err: drafter_llm::CompletionError) -> Self {
        // The provider's own message is the useful part of an upstream
        // failure; the wrapper text adds nothing for the client.
        let reason = match err {
            drafter_llm::CompletionError::Upstream(inner) => inner.to_string(),
            other => other.to_string(),
        };
        ApiError::CompletionFailed(reason)
    }
}

impl From<drafter_ledger::LedgerError> for ApiError {
    fn from(err: drafter_ledger::LedgerError) -> Self {
        match err {
            drafter_ledger::LedgerError::QueryNotFound(_) => {
                ApiError::NotFound("Query not found".to_string())
            }
        }
    }
}
