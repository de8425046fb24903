//! Append-only inventory transaction ledger

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Kinds of inventory movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Goods received into the main store
    Restock,
    /// Goods sold, drawn from a bartender's stock or the store
    Sale,
    /// Goods checked out from the store to a bartender
    StoreToBartender,
    /// Manual correction of a store balance
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Restock => "restock",
            TransactionKind::Sale => "sale",
            TransactionKind::StoreToBartender => "store_to_bartender",
            TransactionKind::Adjustment => "adjustment",
        }
    }
}

/// A recorded inventory movement. Never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct InventoryTransaction {
    pub id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub kind: TransactionKind,
    pub qty: Decimal,
    pub qty_unit_id: Uuid,
    pub qty_in_base_units: Decimal,
    pub from_stock_id: Option<Uuid>,
    pub to_stock_id: Option<Uuid>,
    pub from_bartender_stock_id: Option<Uuid>,
    pub to_bartender_stock_id: Option<Uuid>,
    pub initiator_id: Uuid,
    pub price_at_time: Option<Decimal>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Source and destination rows of a movement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionEndpoints {
    pub from_stock_id: Option<Uuid>,
    pub to_stock_id: Option<Uuid>,
    pub from_bartender_stock_id: Option<Uuid>,
    pub to_bartender_stock_id: Option<Uuid>,
}

impl TransactionEndpoints {
    pub fn restock(stock_id: Uuid) -> Self {
        Self {
            to_stock_id: Some(stock_id),
            ..Self::default()
        }
    }

    pub fn store_to_bartender(stock_id: Uuid, bartender_stock_id: Uuid) -> Self {
        Self {
            from_stock_id: Some(stock_id),
            to_bartender_stock_id: Some(bartender_stock_id),
            ..Self::default()
        }
    }

    pub fn bartender_sale(bartender_stock_id: Uuid) -> Self {
        Self {
            from_bartender_stock_id: Some(bartender_stock_id),
            ..Self::default()
        }
    }

    /// An adjustment adds to (`to_stock_id`) or removes from (`from_stock_id`) the store
    pub fn adjustment(stock_id: Uuid, is_addition: bool) -> Self {
        if is_addition {
            Self::restock(stock_id)
        } else {
            Self {
                from_stock_id: Some(stock_id),
                ..Self::default()
            }
        }
    }
}

/// A transaction about to be appended to the ledger
#[derive(Debug, Clone)]
pub struct NewInventoryTransaction {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub kind: TransactionKind,
    pub qty: Decimal,
    pub qty_unit_id: Uuid,
    pub qty_in_base_units: Decimal,
    pub endpoints: TransactionEndpoints,
    pub initiator_id: Uuid,
    pub price_at_time: Option<Decimal>,
    pub notes: Option<String>,
}

impl NewInventoryTransaction {
    /// Check that exactly the endpoints appropriate to the kind are populated
    pub fn validate(&self) -> DomainResult<()> {
        if self.qty <= Decimal::ZERO || self.qty_in_base_units < Decimal::ZERO {
            return Err(DomainError::validation(
                "qty",
                "Transaction quantity must be greater than zero",
            ));
        }

        let e = &self.endpoints;
        let valid = match self.kind {
            TransactionKind::Restock => {
                e.to_stock_id.is_some()
                    && e.from_stock_id.is_none()
                    && e.from_bartender_stock_id.is_none()
                    && e.to_bartender_stock_id.is_none()
            }
            TransactionKind::Sale => {
                e.from_stock_id.is_some() != e.from_bartender_stock_id.is_some()
                    && e.to_stock_id.is_none()
                    && e.to_bartender_stock_id.is_none()
            }
            TransactionKind::StoreToBartender => {
                e.from_stock_id.is_some()
                    && e.to_bartender_stock_id.is_some()
                    && e.to_stock_id.is_none()
                    && e.from_bartender_stock_id.is_none()
            }
            TransactionKind::Adjustment => {
                e.from_stock_id.is_some() != e.to_stock_id.is_some()
                    && e.from_bartender_stock_id.is_none()
                    && e.to_bartender_stock_id.is_none()
            }
        };

        if valid {
            Ok(())
        } else {
            Err(DomainError::rule(format!(
                "Endpoints do not match a {} transaction",
                self.kind.as_str()
            )))
        }
    }
}

/// Marker written into the notes of the transaction that fulfils a transfer
/// request; its presence makes fulfilment idempotent
pub fn fulfilled_request_marker(request_id: Uuid) -> String {
    format!("Fulfilled request #{}", request_id)
}
