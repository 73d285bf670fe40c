use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::types::entities::{InvalidMention, ParticipantEntry};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidInput(String),

    /// Mention validation failed at submit time. Carries everything the
    /// client needs to preserve form state and offer corrections.
    #[error("One or more participant entries could not be resolved")]
    InvalidMentions {
        invalid: Vec<InvalidMention>,
        valid: Vec<ParticipantEntry>,
    },

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("Upstream service unavailable: {0}")]
    Upstream(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Broker(#[from] lapin::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Conflict {
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "auth_required", self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            ApiError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input", self.to_string()),
            ApiError::InvalidMentions { invalid, valid } => {
                let body = json!({
                    "error": "invalid_mentions",
                    "message": self.to_string(),
                    "invalid_mentions": invalid,
                    "valid_participants": valid,
                });
                return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
            }
            ApiError::Conflict { code, .. } => (StatusCode::CONFLICT, *code, self.to_string()),
            ApiError::Upstream(e) => {
                tracing::warn!(error = %e, "Upstream failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "upstream_unavailable",
                    "Upstream service unavailable".into(),
                )
            }
            ApiError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".into(),
                )
            }
            ApiError::Broker(e) => {
                tracing::error!(error = %e, "Broker error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".into(),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".into(),
                )
            }
        };

        let body = json!({
            "error": code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
