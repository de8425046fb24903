//! Product catalog models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::unit::{quantize, ConversionGraph};
use crate::error::{DomainError, DomainResult};

/// A product sold or stocked by a branch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub base_unit_id: Uuid,
    pub base_unit_price: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Price of `qty` expressed in `unit`: qty × base price × factor(unit → base)
    pub fn price(&self, qty: Decimal, unit: Uuid, graph: &ConversionGraph) -> DomainResult<Decimal> {
        let factor = graph.factor(unit, self.base_unit_id)?;
        qty.checked_mul(self.base_unit_price)
            .and_then(|amount| amount.checked_mul(factor))
            .map(quantize)
            .ok_or_else(|| DomainError::validation("qty", "Price is out of range"))
    }
}
