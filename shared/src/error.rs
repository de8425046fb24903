//! Domain errors raised by the pure order and inventory logic

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors produced by domain rules, independent of transport or storage
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("No conversion from {from} to {to} for {product}")]
    NoConversion {
        product: String,
        from: String,
        to: String,
    },

    #[error("Insufficient stock for {product}: requested {requested}, remaining {available}")]
    InsufficientStock {
        product: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl DomainError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }

    /// Validation failure that is not tied to a single payload field
    pub fn rule(message: impl Into<String>) -> Self {
        DomainError::Validation {
            field: None,
            message: message.into(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
