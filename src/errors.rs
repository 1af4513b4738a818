use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};

/// JSON body an HTTP layer in front of the services returns for a failed call.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Canonical reason of the status, e.g. "Conflict"
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// RFC 3339
    pub timestamp: String,
}

/// Every failure a service operation can report.
///
/// Validation and lookup failures are raised before anything is written.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The backing store failed; the enclosing transaction has been rolled back.
    #[error("store failure: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("{0}")]
    NotFound(String),

    /// Malformed input, an out-of-range number or an unknown enum value
    #[error("invalid input: {0}")]
    ValidationError(String),

    /// Duplicate unique value, or a delete blocked by existing children
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(errors.to_string())
    }
}

impl ServiceError {
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    /// Unique-constraint violations become `Conflict`; anything else stays a store failure.
    pub fn from_write(error: DbErr, conflict_message: impl FnOnce() -> String) -> Self {
        match error.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(conflict_message()),
            _ => ServiceError::DatabaseError(error),
        }
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} {} not found", entity, id))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show a caller. Store and internal details stay in the logs.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "store failure".to_string(),
            Self::InternalError(_) | Self::Other(_) => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "service call failed");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
