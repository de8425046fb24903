//! Error handling for the POS server
//!
//! Domain errors and storage errors are mapped here, and only here, onto
//! HTTP status codes and a uniform JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::DomainError;
use thiserror::Error;

/// SQLSTATE codes mapped onto `Conflict` / `ConcurrentUpdate`
const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization failure or deadlock; the whole transaction may be rerun
    #[error("Conflict: {0}")]
    ConcurrentUpdate(String),

    // Business rule errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Insufficient stock for {product}: requested {requested}, remaining {available}")]
    InsufficientStock {
        product: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("No conversion: {0}")]
    NoConversion(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }

    /// Whether rerunning the failed transaction may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrentUpdate(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials
            | AppError::TokenExpired
            | AppError::InvalidToken
            | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation { .. } | AppError::InvalidState(_) | AppError::NoConversion(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_)
            | AppError::ConcurrentUpdate(_)
            | AppError::InsufficientStock { .. } => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::TokenExpired => "TOKEN_EXPIRED",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) | AppError::ConcurrentUpdate(_) => "CONFLICT",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::NoConversion(_) => "NO_CONVERSION",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NoConversion { .. } => AppError::NoConversion(err.to_string()),
            DomainError::InsufficientStock {
                product,
                requested,
                available,
            } => AppError::InsufficientStock {
                product,
                requested,
                available,
            },
            DomainError::InvalidState(msg) => AppError::InvalidState(msg),
            DomainError::Validation { field, message } => AppError::Validation { field, message },
            DomainError::Forbidden(msg) => AppError::Forbidden(msg),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let mapped = match &err {
            sqlx::Error::RowNotFound => Some(AppError::NotFound("Record".to_string())),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned());
                match code.as_deref() {
                    Some(UNIQUE_VIOLATION) => Some(AppError::Conflict(
                        db_err
                            .constraint()
                            .map(|c| format!("Duplicate value violates {}", c))
                            .unwrap_or_else(|| "Duplicate value".to_string()),
                    )),
                    Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => Some(
                        AppError::ConcurrentUpdate("Concurrent update detected, please retry".to_string()),
                    ),
                    _ => None,
                }
            }
            _ => None,
        };

        mapped.unwrap_or(AppError::Database(err))
    }
}

/// Reports the first failing field, in field-name order
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by_key(|(field, _)| *field);
        let first = fields
            .into_iter()
            .find_map(|(field, errs)| errs.first().map(|e| (field, e)));

        match first {
            Some((field, error)) => {
                let message = match &error.message {
                    Some(message) => message.to_string(),
                    None => format!("Invalid {} ({})", field, error.code),
                };
                AppError::validation(field, message)
            }
            None => AppError::Validation {
                field: None,
                message: errors.to_string(),
            },
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The violated rule, for refused edits and transitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
            reason: None,
            details: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut detail = ErrorDetail::new(self.code(), self.to_string());

        match &self {
            AppError::InvalidCredentials => {
                detail.message = "Invalid username or password".to_string();
            }
            AppError::Validation { field, message } => {
                detail.message = message.clone();
                detail.field = field.clone();
                detail.reason = Some(message.clone());
            }
            AppError::InvalidState(msg) => {
                detail.message = msg.clone();
                detail.reason = Some(msg.clone());
            }
            AppError::InsufficientStock {
                product,
                requested,
                available,
            } => {
                detail.reason = Some(self.to_string());
                detail.details = Some(serde_json::json!({
                    "product": product,
                    "requested": requested,
                    "remaining": available,
                }));
            }
            AppError::Database(_) => {
                detail.message = "A database error occurred".to_string();
            }
            AppError::InternalError(_) => {
                detail.message = "An internal server error occurred".to_string();
            }
            _ => {}
        }

        if status.is_server_error() {
            tracing::error!(code = %detail.code, "Error: {:?}", self);
        } else {
            tracing::warn!(code = %detail.code, status = status.as_u16(), "{}", self);
        }

        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_map_to_statuses() {
        let cases = [
            (DomainError::rule("bad"), StatusCode::BAD_REQUEST),
            (
                DomainError::InvalidState("done".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                DomainError::Forbidden("no".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (
                DomainError::InsufficientStock {
                    product: "Coca".to_string(),
                    requested: Decimal::from(49),
                    available: Decimal::from(48),
                },
                StatusCode::CONFLICT,
            ),
        ];
        for (domain, status) in cases {
            assert_eq!(AppError::from(domain).status(), status);
        }
    }

    #[test]
    fn test_only_concurrent_updates_are_retried() {
        let collision = AppError::ConcurrentUpdate("Concurrent update detected, please retry".to_string());
        assert!(collision.is_retryable());
        assert_eq!(collision.status(), StatusCode::CONFLICT);
        assert_eq!(collision.code(), "CONFLICT");

        assert!(!AppError::Conflict("Duplicate value".to_string()).is_retryable());
        assert!(!AppError::from(DomainError::rule("bad")).is_retryable());
    }

    #[test]
    fn test_validator_failures_name_their_field() {
        use validator::Validate;

        #[derive(Validate)]
        struct Input {
            #[validate(length(min = 1, max = 100))]
            name: String,
            #[validate(length(min = 1, max = 50))]
            category: String,
        }

        let input = Input {
            name: "Coca".to_string(),
            category: String::new(),
        };
        let err = AppError::from(input.validate().unwrap_err());
        match err {
            AppError::Validation { field, message } => {
                assert_eq!(field.as_deref(), Some("category"));
                assert_eq!(message, "Invalid category (length)");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_row_not_found_is_not_found() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_insufficient_stock_message_names_product() {
        let err = AppError::InsufficientStock {
            product: "Coca".to_string(),
            requested: Decimal::from(49),
            available: Decimal::from(48),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Coca: requested 49, remaining 48"
        );
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
    }
}
