//! Orders, order items and the status derivation that runs on every item change
//!
//! An order carries two preparation tracks (food and beverage) derived from
//! its items, plus a cashier track. Derivation is idempotent: running it
//! again on the same items yields the same statuses and total.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notification::Station;
use super::unit::quantize;
use super::user::{Caller, Role};
use crate::error::{DomainError, DomainResult};

/// Highest `NN` allowed in an order number
pub const MAX_DAILY_SEQUENCE: u32 = 99;

/// Largest amount a price, line or bill may carry: twelve integer digits, two
/// decimal places
pub fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

fn checked_line_total(name: &str, unit_price: Decimal, quantity: i32) -> DomainResult<Decimal> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .filter(|total| *total <= max_amount())
        .ok_or_else(|| {
            DomainError::validation(
                "items",
                format!("Line total of '{}' exceeds the largest billable amount", name),
            )
        })
}

/// Checked Σ of line totals, bounded by [`max_amount`]
pub(crate) fn sum_amounts<I>(amounts: I) -> DomainResult<Decimal>
where
    I: IntoIterator<Item = DomainResult<Decimal>>,
{
    let mut total = Decimal::ZERO;
    for amount in amounts {
        total = total
            .checked_add(amount?)
            .filter(|t| *t <= max_amount())
            .ok_or_else(|| {
                DomainError::validation("items", "Order total exceeds the largest billable amount")
            })?;
    }
    Ok(total)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Food,
    Beverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Accepted => "accepted",
            ItemStatus::Rejected => "rejected",
            ItemStatus::Cancelled => "cancelled",
        }
    }

    /// Pending and accepted items are billed
    pub fn is_live(&self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Accepted)
    }
}

/// Status of the food or beverage preparation track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Pending,
    /// Accepted on the wire; never produced by derivation
    Preparing,
    Accepted,
    Rejected,
    Completed,
    Cancelled,
    NotApplicable,
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Pending => "pending",
            TrackStatus::Preparing => "preparing",
            TrackStatus::Accepted => "accepted",
            TrackStatus::Rejected => "rejected",
            TrackStatus::Completed => "completed",
            TrackStatus::Cancelled => "cancelled",
            TrackStatus::NotApplicable => "not_applicable",
        }
    }

    /// Statuses shown on a station screen
    pub fn is_visible_to_station(&self) -> bool {
        matches!(
            self,
            TrackStatus::Pending | TrackStatus::Preparing | TrackStatus::Completed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum CashierStatus {
    Pending,
    ReadyForPayment,
    Printed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOption {
    Cash,
    Online,
    #[serde(rename = "none")]
    #[cfg_attr(feature = "db", sqlx(rename = "none"))]
    NotChosen,
}

/// An order placed against a table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub table_id: Uuid,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub food_status: TrackStatus,
    pub beverage_status: TrackStatus,
    pub cashier_status: CashierStatus,
    pub payment_option: PaymentOption,
    pub branch_id: Uuid,
    pub total: Decimal,
    pub receipt_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line of an order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub kind: ItemKind,
    pub status: ItemStatus,
    /// Product drawn from stock; required for beverages
    pub product_ref: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn line_total(&self) -> DomainResult<Decimal> {
        checked_line_total(&self.name, self.unit_price, self.quantity)
    }

    pub fn snapshot(&self) -> NewOrderItem {
        NewOrderItem {
            name: self.name.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            kind: self.kind,
            product_ref: self.product_ref,
        }
    }
}

/// An item as submitted by a waiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub kind: ItemKind,
    #[serde(default)]
    pub product_ref: Option<Uuid>,
}

impl NewOrderItem {
    pub fn line_total(&self) -> DomainResult<Decimal> {
        checked_line_total(&self.name, self.unit_price, self.quantity)
    }

    /// Materialise as a pending item of `order_id`
    pub fn into_item(self, order_id: Uuid, created_at: DateTime<Utc>) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id,
            name: self.name,
            quantity: self.quantity,
            unit_price: self.unit_price,
            kind: self.kind,
            status: ItemStatus::Pending,
            product_ref: self.product_ref,
            created_at,
        }
    }
}

/// Derive one preparation track from the items of that kind.
///
/// Cancelled items are ignored; a track whose items are all cancelled is
/// itself cancelled.
pub fn derive_track_status(items: &[OrderItem], kind: ItemKind) -> TrackStatus {
    let of_kind: Vec<&OrderItem> = items.iter().filter(|i| i.kind == kind).collect();
    if of_kind.is_empty() {
        return TrackStatus::NotApplicable;
    }

    let considered: Vec<ItemStatus> = of_kind
        .iter()
        .map(|i| i.status)
        .filter(|s| *s != ItemStatus::Cancelled)
        .collect();
    if considered.is_empty() {
        return TrackStatus::Cancelled;
    }

    if considered.contains(&ItemStatus::Pending) {
        TrackStatus::Pending
    } else if considered.contains(&ItemStatus::Rejected) {
        TrackStatus::Rejected
    } else if considered.iter().all(|s| *s == ItemStatus::Accepted) {
        TrackStatus::Completed
    } else {
        TrackStatus::Pending
    }
}

/// Derive the cashier track. `printed` is only ever set by a cashier and sticks.
pub fn derive_cashier_status(current: CashierStatus, items: &[OrderItem]) -> CashierStatus {
    if current == CashierStatus::Printed {
        return CashierStatus::Printed;
    }
    let any_pending = items.iter().any(|i| i.status == ItemStatus::Pending);
    let any_accepted = items.iter().any(|i| i.status == ItemStatus::Accepted);
    if !any_pending && any_accepted {
        CashierStatus::ReadyForPayment
    } else {
        CashierStatus::Pending
    }
}

/// Σ unit_price × quantity over pending and accepted items
pub fn order_total(items: &[OrderItem]) -> DomainResult<Decimal> {
    let total = sum_amounts(
        items
            .iter()
            .filter(|i| i.status.is_live())
            .map(OrderItem::line_total),
    )?;
    Ok(quantize(total))
}

impl Order {
    /// Recompute both tracks, the cashier status and the total from `items`.
    /// Returns true when anything changed. Leaves the order untouched when the
    /// total is out of range.
    pub fn on_item_changed(&mut self, items: &[OrderItem]) -> DomainResult<bool> {
        let total = order_total(items)?;
        let food = derive_track_status(items, ItemKind::Food);
        let beverage = derive_track_status(items, ItemKind::Beverage);
        let cashier = derive_cashier_status(self.cashier_status, items);

        let changed = food != self.food_status
            || beverage != self.beverage_status
            || cashier != self.cashier_status
            || total != self.total;

        self.food_status = food;
        self.beverage_status = beverage;
        self.cashier_status = cashier;
        self.total = total;
        Ok(changed)
    }

    pub fn track(&self, kind: ItemKind) -> TrackStatus {
        match kind {
            ItemKind::Food => self.food_status,
            ItemKind::Beverage => self.beverage_status,
        }
    }

    /// Whether the order shows up on the given station's screen
    pub fn visible_to(&self, station: Station) -> bool {
        self.track(station.item_kind()).is_visible_to_station()
    }

    pub fn is_printed(&self) -> bool {
        self.cashier_status == CashierStatus::Printed
    }
}

/// Items of an order routed to `station`
pub fn station_items(items: &[OrderItem], station: Station) -> Vec<OrderItem> {
    items
        .iter()
        .filter(|i| i.kind == station.item_kind())
        .cloned()
        .collect()
}

/// Check a requested item status change.
///
/// Station operators accept or reject items of their own station; managers
/// can act on any station; waiters and managers cancel. Only pending items
/// move, and a printed order can no longer be cancelled from.
pub fn check_item_transition(
    caller: &dyn Caller,
    order: &Order,
    item: &OrderItem,
    target: ItemStatus,
) -> DomainResult<()> {
    if !caller.in_branch(order.branch_id) {
        return Err(DomainError::Forbidden(
            "Order belongs to another branch".to_string(),
        ));
    }

    let allowed = match target {
        ItemStatus::Pending => {
            return Err(DomainError::validation(
                "status",
                "Items cannot be moved back to pending",
            ))
        }
        ItemStatus::Accepted | ItemStatus::Rejected => {
            caller.manages_branch(order.branch_id)
                || caller.caller_role().station() == Some(Station::from(item.kind))
        }
        ItemStatus::Cancelled => {
            caller.manages_branch(order.branch_id) || caller.caller_role() == Role::Waiter
        }
    };
    if !allowed {
        return Err(DomainError::Forbidden(format!(
            "A {} cannot mark {} items as {}",
            caller.caller_role(),
            Station::from(item.kind).as_str(),
            target.as_str()
        )));
    }

    // Stations may still finish a printed order; waiters may not change it
    if order.is_printed() && target == ItemStatus::Cancelled {
        return Err(DomainError::InvalidState(
            "The bill for this order has already been printed".to_string(),
        ));
    }
    if item.status != ItemStatus::Pending {
        return Err(DomainError::InvalidState(format!(
            "Item '{}' is already {}",
            item.name,
            item.status.as_str()
        )));
    }
    Ok(())
}

/// Format `YYYYMMDD-NN`
pub fn format_order_number(date: NaiveDate, sequence: u32) -> DomainResult<String> {
    if sequence == 0 || sequence > MAX_DAILY_SEQUENCE {
        return Err(DomainError::InvalidState(format!(
            "Daily order sequence {} is outside 1..={}",
            sequence, MAX_DAILY_SEQUENCE
        )));
    }
    Ok(format!(
        "{:04}{:02}{:02}-{:02}",
        date.year(),
        date.month(),
        date.day(),
        sequence
    ))
}

/// Split an order number into its date and daily sequence
pub fn parse_order_number(value: &str) -> Option<(NaiveDate, u32)> {
    if !is_valid_order_number(value) {
        return None;
    }
    let (date, seq) = value.split_at(8);
    let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    let seq = seq[1..].parse().ok()?;
    Some((date, seq))
}

/// `^[0-9]{8}-[0-9]{2}$`
pub fn is_valid_order_number(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 11
        && bytes[8] == b'-'
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[9..].iter().all(u8::is_ascii_digit)
}
