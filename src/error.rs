use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Slot {0} has no remaining capacity")]
    CapacityExceeded(String),
    #[error("Linking code not recognised")]
    InvalidCode,
    #[error("This linking code has expired. Please ask for a new code and share it with your parent or guardian.")]
    ExpiredCode,
    #[error("Already linked: {0}")]
    AlreadyLinked(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Service temporarily unavailable, please retry")]
    ServiceUnavailable,
    #[error("Record was modified concurrently")]
    ConcurrentModification,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Internal server error: {0}")]
    InternalWithMsg(String),
}

impl AppError {
    /// Stable machine-readable kind, mirrored in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE",
            AppError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            AppError::InvalidCode => "INVALID_CODE",
            AppError::ExpiredCode => "EXPIRED_CODE",
            AppError::AlreadyLinked(_) => "ALREADY_LINKED",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ServiceUnavailable | AppError::ConcurrentModification => "SERVICE_UNAVAILABLE",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Validation(_) => "VALIDATION",
            AppError::InternalWithMsg(_) => "INTERNAL",
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        match self {
            // 2067 = SQLite Unique Constraint
            // 1555 = SQLite Primary Key Constraint
            // 23505 = PostgreSQL Unique Violation
            AppError::Database(e) => e
                .as_database_error()
                .and_then(|db_err| db_err.code())
                .is_some_and(|code| code == "2067" || code == "1555" || code == "23505"),
            _ => false,
        }
    }

    /// Store contention that a short backoff is expected to clear.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::ConcurrentModification => true,
            AppError::Database(sqlx::Error::PoolTimedOut) => true,
            AppError::Database(e) => {
                let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) else {
                    return false;
                };
                // SQLite: 5 BUSY, 6 LOCKED, 261 BUSY_RECOVERY, 517 BUSY_SNAPSHOT
                // PostgreSQL: 40001 serialization_failure, 40P01 deadlock, 55P03 lock_not_available
                matches!(
                    code.as_ref(),
                    "5" | "6" | "261" | "517" | "40001" | "40P01" | "55P03"
                )
            }
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match &self {
            AppError::Database(e) => {
                if self.is_unique_violation() {
                    return (
                        StatusCode::CONFLICT,
                        Json(json!({ "error": "Resource already exists (duplicate entry)", "code": "CONFLICT" }))
                    ).into_response();
                }

                error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::CapacityExceeded(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::InvalidCode => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::ExpiredCode => (StatusCode::GONE, self.to_string()),
            AppError::AlreadyLinked(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::InvalidStateTransition(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::ServiceUnavailable | AppError::ConcurrentModification => {
                (StatusCode::SERVICE_UNAVAILABLE, AppError::ServiceUnavailable.to_string())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InternalWithMsg(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}
