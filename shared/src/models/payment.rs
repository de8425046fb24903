//! Order settlement

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::{order_total, CashierStatus, ItemStatus, Order, OrderItem, PaymentOption};
use crate::error::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Mobile,
    Online,
}

impl PaymentMethod {
    /// The coarse option recorded on the order
    pub fn payment_option(&self) -> PaymentOption {
        match self {
            PaymentMethod::Cash => PaymentOption::Cash,
            PaymentMethod::Card | PaymentMethod::Mobile | PaymentMethod::Online => {
                PaymentOption::Online
            }
        }
    }
}

/// Settlement of one order; at most one per order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub processed_by: Uuid,
    pub processed_at: DateTime<Utc>,
    pub is_completed: bool,
}

/// Check that `order` can be settled and return the amount to freeze.
///
/// The bill must be printed and no item may still be pending, so the amount
/// is the sum of the accepted items.
pub fn check_settlement(order: &Order, items: &[OrderItem]) -> DomainResult<Decimal> {
    if order.cashier_status != CashierStatus::Printed {
        return Err(DomainError::InvalidState(
            "The bill must be printed before payment".to_string(),
        ));
    }
    if items.iter().any(|i| i.status == ItemStatus::Pending) {
        return Err(DomainError::InvalidState(
            "Order still has items waiting on a station".to_string(),
        ));
    }
    order_total(items)
}
