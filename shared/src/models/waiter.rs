//! What a waiter may do with an order in its current state

use serde::{Deserialize, Serialize};

use super::order::{CashierStatus, ItemKind, ItemStatus, Order, OrderItem, TrackStatus};

/// How far a waiter may edit an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditPermission {
    /// Any change, pending items are replaced wholesale
    Free,
    /// Quantities can grow and items can be added
    IncreaseOnly,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaiterActions {
    pub edit: EditPermission,
    pub can_cancel: bool,
    pub can_print_bill: bool,
    pub can_add_items: bool,
}

/// Where a track stands from the waiter's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackPhase {
    /// Still waiting on the station
    Open,
    /// The station has committed to at least part of it
    Locked,
    /// Nothing left on this track
    Closed,
}

fn track_phase(status: TrackStatus, items: &[OrderItem], kind: ItemKind) -> TrackPhase {
    match status {
        TrackStatus::Pending => TrackPhase::Open,
        TrackStatus::Accepted | TrackStatus::Preparing | TrackStatus::Completed => {
            TrackPhase::Locked
        }
        TrackStatus::Rejected => {
            let any_accepted = items
                .iter()
                .any(|i| i.kind == kind && i.status == ItemStatus::Accepted);
            if any_accepted {
                TrackPhase::Locked
            } else {
                TrackPhase::Closed
            }
        }
        TrackStatus::Cancelled | TrackStatus::NotApplicable => TrackPhase::Closed,
    }
}

impl WaiterActions {
    pub const NONE: WaiterActions = WaiterActions {
        edit: EditPermission::None,
        can_cancel: false,
        can_print_bill: false,
        can_add_items: false,
    };

    /// Derive the permission matrix. Beverages decide for mixed orders; the
    /// food track only counts once the beverage track is closed.
    pub fn for_order(order: &Order, items: &[OrderItem]) -> Self {
        if order.cashier_status == CashierStatus::Printed {
            return Self::NONE;
        }

        let beverage = track_phase(order.beverage_status, items, ItemKind::Beverage);
        let phase = if beverage != TrackPhase::Closed {
            beverage
        } else {
            track_phase(order.food_status, items, ItemKind::Food)
        };

        match phase {
            TrackPhase::Open => WaiterActions {
                edit: EditPermission::Free,
                can_cancel: true,
                can_print_bill: false,
                can_add_items: true,
            },
            TrackPhase::Locked => WaiterActions {
                edit: EditPermission::IncreaseOnly,
                can_cancel: false,
                can_print_bill: true,
                can_add_items: true,
            },
            TrackPhase::Closed => WaiterActions {
                edit: EditPermission::Free,
                can_cancel: true,
                can_print_bill: order.cashier_status == CashierStatus::ReadyForPayment,
                can_add_items: true,
            },
        }
    }
}

/// Whether the bill can be printed now, by the waiter's matrix or because the
/// cashier track is ready
pub fn can_print_bill(order: &Order, items: &[OrderItem]) -> bool {
    order.cashier_status == CashierStatus::ReadyForPayment
        || WaiterActions::for_order(order, items).can_print_bill
}
