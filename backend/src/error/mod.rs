use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use utoipa::ToSchema;

/// Failures raised by a session store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("session store did not respond within {0:?}")]
    Timeout(Duration),
    #[error("device {device_key} already has an active session")]
    DuplicateActive { device_key: String },
}

/// Domain errors raised by the registrar and the revocation service.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Malformed identifiers or a request the caller may not make this way.
    #[error("{0}")]
    Validation(String),
    /// Missing and foreign sessions are reported identically.
    #[error("Session not found")]
    NotFoundOrNotOwned,
    /// Storage flakiness. Never a reason to force a logout.
    #[error("session store temporarily unavailable")]
    TransientStorage(#[source] StoreError),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::TransientStorage(err)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    ServiceUnavailable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN"),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                msg,
                "TRANSIENT_STORAGE_ERROR",
            ),
            AppError::InternalServerError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_SERVER_ERROR",
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: code.to_string(),
            details: None,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Validation(msg) => AppError::BadRequest(msg),
            SessionError::NotFoundOrNotOwned => AppError::NotFound(err.to_string()),
            SessionError::TransientStorage(source) => {
                tracing::warn!(error = %source, "Session store unavailable");
                AppError::ServiceUnavailable("Session store temporarily unavailable".to_string())
            }
        }
    }
}
