//! Error types for the lending ledger

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Numeric error codes carried in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchItem = 5,
    ItemNotAvailable = 7,
    BadValue = 18,
    NoSuchLoan = 20,
    AlreadyReturned = 22,
    Unavailable = 23,
    Inconsistent = 24,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Item {0} not found")]
    ItemNotFound(i64),

    #[error("Item {0} is out of stock")]
    OutOfStock(i64),

    #[error("Loan {0} not found")]
    LoanNotFound(i64),

    #[error("Loan {0} has already been returned")]
    AlreadyReturned(i64),

    #[error("Invalid due date: {0}")]
    InvalidDueDate(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Internal consistency violation: {0}")]
    Invariant(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Business-rule outcomes the caller is expected to handle itself.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            AppError::Authentication(_)
                | AppError::ItemNotFound(_)
                | AppError::OutOfStock(_)
                | AppError::LoanNotFound(_)
                | AppError::AlreadyReturned(_)
                | AppError::InvalidDueDate(_)
                | AppError::Validation(_)
                | AppError::BadRequest(_)
        )
    }

    /// Failures that may succeed when the whole transaction is attempted again.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Unavailable(_) => true,
            AppError::Database(e) => is_transient_sqlx(e),
            _ => false,
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => match db_err.code() {
            // serialization_failure, deadlock_detected, connection_exception class
            Some(code) => code == "40001" || code == "40P01" || code.starts_with("08"),
            None => false,
        },
        _ => false,
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, code, message) = match &self {
            AppError::Authentication(_) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, message)
            }
            AppError::ItemNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchItem, message),
            AppError::LoanNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchLoan, message),
            AppError::OutOfStock(_) => {
                (StatusCode::CONFLICT, ErrorCode::ItemNotAvailable, message)
            }
            AppError::AlreadyReturned(_) => {
                (StatusCode::CONFLICT, ErrorCode::AlreadyReturned, message)
            }
            AppError::InvalidDueDate(_) | AppError::Validation(_) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, message)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Unavailable(msg) => {
                tracing::error!("Storage unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorCode::Unavailable,
                    "Service temporarily unavailable, retry later".to_string(),
                )
            }
            AppError::Invariant(msg) => {
                tracing::error!("Invariant violation: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Inconsistent,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
