//! Dining tables and their derived status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::CashierStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Available,
    Ordering,
    ReadyToPay,
    Occupied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Table {
    pub id: Uuid,
    pub number: i32,
    pub branch_id: Uuid,
    pub seats: i32,
    pub status: TableStatus,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// The facts about one order that table status depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct TableOrderSummary {
    pub cashier_status: CashierStatus,
    /// Any item still pending or accepted
    pub has_live_items: bool,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

impl TableOrderSummary {
    /// Still holding the table: unpaid with something on it
    pub fn is_active(&self) -> bool {
        !self.is_paid && self.has_live_items
    }
}

/// Recompute a table's status from its orders.
///
/// `occupied` while any active order still waits on a station, `ready_to_pay`
/// when the latest active order is ready for payment or printed, `available`
/// otherwise.
pub fn derive_table_status(orders: &[TableOrderSummary]) -> TableStatus {
    let active: Vec<&TableOrderSummary> = orders.iter().filter(|o| o.is_active()).collect();

    if active
        .iter()
        .any(|o| o.cashier_status == CashierStatus::Pending)
    {
        return TableStatus::Occupied;
    }

    match active.iter().max_by_key(|o| o.created_at) {
        Some(latest)
            if matches!(
                latest.cashier_status,
                CashierStatus::ReadyForPayment | CashierStatus::Printed
            ) =>
        {
            TableStatus::ReadyToPay
        }
        _ => TableStatus::Available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(cashier_status: CashierStatus, live: bool, paid: bool) -> TableOrderSummary {
        TableOrderSummary {
            cashier_status,
            has_live_items: live,
            is_paid: paid,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_table_status_derivation() {
        assert_eq!(derive_table_status(&[]), TableStatus::Available);
        assert_eq!(
            derive_table_status(&[summary(CashierStatus::Pending, true, false)]),
            TableStatus::Occupied
        );
        assert_eq!(
            derive_table_status(&[summary(CashierStatus::Printed, true, false)]),
            TableStatus::ReadyToPay
        );
        assert_eq!(
            derive_table_status(&[summary(CashierStatus::Printed, true, true)]),
            TableStatus::Available
        );
        // Everything rejected or cancelled frees the table
        assert_eq!(
            derive_table_status(&[summary(CashierStatus::Pending, false, false)]),
            TableStatus::Available
        );
    }

    #[test]
    fn test_waiting_order_outranks_ready_one() {
        let orders = [
            summary(CashierStatus::ReadyForPayment, true, false),
            summary(CashierStatus::Pending, true, false),
        ];
        assert_eq!(derive_table_status(&orders), TableStatus::Occupied);
    }
}
