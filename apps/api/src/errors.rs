use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;
use crate::usage::UsageError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::QuotaExceeded(msg) => {
                (StatusCode::PAYMENT_REQUIRED, "QUOTA_EXCEEDED", msg.clone())
            }
            // Provider names stay in the logs.
            AppError::Llm(LlmError::UnsupportedProviderForOperation { provider, operation }) => {
                tracing::warn!(%provider, operation, "Operation unsupported for plan");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "UNSUPPORTED_OPERATION",
                    "This feature is not available on your current plan".to_string(),
                )
            }
            AppError::Llm(e) => {
                tracing::error!(provider = %e.provider(), "LLM error: {e}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "AI_UNAVAILABLE",
                    "AI analysis is temporarily unavailable. Please try again later.".to_string(),
                )
            }
            AppError::Usage(e @ UsageError::InvalidCost(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            }
            AppError::Usage(e) => {
                tracing::error!("Usage storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
