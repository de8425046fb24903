//! The waiter edit protocol and its append-only audit log
//!
//! An edit keeps every accepted item, discards every pending item and adds the
//! submitted items as new pending items. Each applied edit is recorded as an
//! [`OrderUpdate`] that later closes itself once the stations have acted on
//! all of the items it introduced.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::{sum_amounts, ItemStatus, NewOrderItem, Order, OrderItem};
use super::unit::quantize;
use crate::error::{DomainError, DomainResult};
use crate::validation::validate_new_items;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Addition,
    Modification,
    Removal,
    Edit,
    AddItems,
    QuantityChange,
    StatusChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

/// Structured payload of an update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemsChanges {
    pub items: Vec<NewOrderItem>,
    #[serde(default)]
    pub removed_pending_items: Vec<NewOrderItem>,
    #[serde(default)]
    pub accepted_items_preserved: Vec<NewOrderItem>,
}

/// One recorded mutation of an existing order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub id: Uuid,
    pub order_id: Uuid,
    pub update_kind: UpdateKind,
    pub status: UpdateStatus,
    pub items_changes: ItemsChanges,
    pub created_by: Uuid,
    pub processed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub total_addition_cost: Decimal,
}

impl OrderUpdate {
    /// Items this update introduced: matched by name among those created with
    /// or after it
    fn introduced<'a>(&self, items: &'a [OrderItem]) -> Vec<&'a OrderItem> {
        let names: Vec<String> = self
            .items_changes
            .items
            .iter()
            .map(|i| i.name.to_lowercase())
            .collect();
        items
            .iter()
            .filter(|i| i.created_at >= self.created_at && names.contains(&i.name.to_lowercase()))
            .collect()
    }

    /// Status this pending update should close to, given the order's items.
    ///
    /// The update closes once every item it introduced has left `pending`:
    /// `accepted` if any of them was accepted, `rejected` otherwise.
    pub fn closure_status(&self, items: &[OrderItem]) -> Option<UpdateStatus> {
        if self.status != UpdateStatus::Pending || self.items_changes.items.is_empty() {
            return None;
        }

        let introduced = self.introduced(items);
        if introduced.is_empty() || introduced.iter().any(|i| i.status == ItemStatus::Pending) {
            return None;
        }
        if introduced.iter().any(|i| i.status == ItemStatus::Accepted) {
            Some(UpdateStatus::Accepted)
        } else {
            Some(UpdateStatus::Rejected)
        }
    }

    /// Close the update if its items are settled. A rejection records whether
    /// the station refused the items or the waiter withdrew them.
    pub fn settle(
        &mut self,
        items: &[OrderItem],
        processed_by: Uuid,
        at: DateTime<Utc>,
    ) -> Option<UpdateStatus> {
        let status = self.closure_status(items)?;
        let reason = (status == UpdateStatus::Rejected)
            .then(|| rejection_reason(&self.introduced(items)).to_string());
        self.close(status, reason, processed_by, at);
        Some(status)
    }

    /// Retire a pending update whose items a later edit discarded
    pub fn supersede(&mut self, superseded_by: Uuid, processed_by: Uuid, at: DateTime<Utc>) {
        self.close(
            UpdateStatus::Rejected,
            Some(format!("Superseded by update {}", superseded_by)),
            processed_by,
            at,
        );
    }

    /// Close the update, recording who acted last
    pub fn close(
        &mut self,
        status: UpdateStatus,
        reason: Option<String>,
        processed_by: Uuid,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        self.processed_by = Some(processed_by);
        self.processed_at = Some(at);
        self.rejection_reason = reason;
    }
}

fn rejection_reason(introduced: &[&OrderItem]) -> &'static str {
    let cancelled = introduced
        .iter()
        .filter(|i| i.status == ItemStatus::Cancelled)
        .count();
    if cancelled == introduced.len() {
        "All items were cancelled by the waiter"
    } else if cancelled == 0 {
        "All items were rejected by the station"
    } else {
        "Items were rejected by the station or cancelled by the waiter"
    }
}

/// Check a proposed edit against the order's current items.
///
/// Quantities of accepted items can only grow, and beverages must name the
/// product they draw from.
pub fn validate_update(items: &[OrderItem], new_items: &[NewOrderItem]) -> DomainResult<()> {
    validate_new_items(new_items)?;

    let accepted = accepted_quantities(items);
    for new_item in new_items {
        if let Some(&current) = accepted.get(&new_item.name.to_lowercase()) {
            if new_item.quantity < current {
                return Err(DomainError::rule(format!(
                    "Cannot reduce quantity of '{}' from {} to {} after order acceptance",
                    new_item.name, current, new_item.quantity
                )));
            }
        }
    }
    Ok(())
}

/// Accepted quantity per lower-cased item name
fn accepted_quantities(items: &[OrderItem]) -> HashMap<String, i32> {
    let mut quantities = HashMap::new();
    for item in items.iter().filter(|i| i.status == ItemStatus::Accepted) {
        *quantities.entry(item.name.to_lowercase()).or_insert(0) += item.quantity;
    }
    quantities
}

/// Everything an edit will do, computed before anything is written
#[derive(Debug, Clone, PartialEq)]
pub struct EditPlan {
    pub update_kind: UpdateKind,
    pub update_status: UpdateStatus,
    pub changes: ItemsChanges,
    /// Pending items to delete
    pub removed_item_ids: Vec<Uuid>,
    /// Items to create as pending
    pub new_items: Vec<NewOrderItem>,
    pub total_addition_cost: Decimal,
}

/// Result of applying an edit plan in memory
#[derive(Debug, Clone)]
pub struct AppliedEdit {
    pub created: Vec<OrderItem>,
    pub items: Vec<OrderItem>,
    pub update: OrderUpdate,
}

/// Plan an edit of `order`. Returns `None` when the edit would change nothing.
///
/// A submitted item whose name matches an accepted item states the desired
/// total quantity: equal means unchanged, higher adds a pending item for the
/// difference.
pub fn plan_edit(
    order: &Order,
    items: &[OrderItem],
    new_items: &[NewOrderItem],
) -> DomainResult<Option<EditPlan>> {
    if order.is_printed() {
        return Err(DomainError::InvalidState(
            "Cannot edit an order whose bill has been printed".to_string(),
        ));
    }
    validate_update(items, new_items)?;

    let pending: Vec<&OrderItem> = items
        .iter()
        .filter(|i| i.status == ItemStatus::Pending)
        .collect();
    let accepted: Vec<&OrderItem> = items
        .iter()
        .filter(|i| i.status == ItemStatus::Accepted)
        .collect();
    let accepted_qty = accepted_quantities(items);

    let to_create: Vec<NewOrderItem> = new_items
        .iter()
        .filter_map(|new_item| match accepted_qty.get(&new_item.name.to_lowercase()) {
            Some(&current) if new_item.quantity == current => None,
            Some(&current) => Some(NewOrderItem {
                quantity: new_item.quantity - current,
                ..new_item.clone()
            }),
            None => Some(new_item.clone()),
        })
        .collect();

    if to_create.is_empty() && pending.is_empty() {
        return Ok(None);
    }

    let update_kind = if pending.is_empty() {
        UpdateKind::AddItems
    } else {
        UpdateKind::Edit
    };
    // Nothing left for a station to act on
    let update_status = if to_create.is_empty() {
        UpdateStatus::Completed
    } else {
        UpdateStatus::Pending
    };
    let total_addition_cost = quantize(sum_amounts(to_create.iter().map(NewOrderItem::line_total))?);

    Ok(Some(EditPlan {
        update_kind,
        update_status,
        changes: ItemsChanges {
            items: to_create.clone(),
            removed_pending_items: pending.iter().map(|i| i.snapshot()).collect(),
            accepted_items_preserved: accepted.iter().map(|i| i.snapshot()).collect(),
        },
        removed_item_ids: pending.iter().map(|i| i.id).collect(),
        new_items: to_create,
        total_addition_cost,
    }))
}

impl EditPlan {
    /// Apply the plan to `order` and its `items`, returning the resulting item
    /// list and the audit record. Statuses and total are recomputed.
    pub fn apply(
        &self,
        order: &mut Order,
        items: &[OrderItem],
        created_by: Uuid,
        at: DateTime<Utc>,
    ) -> DomainResult<AppliedEdit> {
        let created: Vec<OrderItem> = self
            .new_items
            .iter()
            .cloned()
            .map(|item| item.into_item(order.id, at))
            .collect();

        let mut remaining: Vec<OrderItem> = items
            .iter()
            .filter(|i| !self.removed_item_ids.contains(&i.id))
            .cloned()
            .collect();
        remaining.extend(created.iter().cloned());

        order.on_item_changed(&remaining)?;
        order.updated_at = at;

        let update = OrderUpdate {
            id: Uuid::new_v4(),
            order_id: order.id,
            update_kind: self.update_kind,
            status: self.update_status,
            items_changes: self.changes.clone(),
            created_by,
            processed_by: None,
            created_at: at,
            processed_at: (self.update_status == UpdateStatus::Completed).then_some(at),
            notes: None,
            rejection_reason: None,
            total_addition_cost: self.total_addition_cost,
        };

        Ok(AppliedEdit {
            created,
            items: remaining,
            update,
        })
    }
}

impl AppliedEdit {
    /// Earlier pending updates this edit settles. One whose items were all
    /// discarded is superseded; one whose surviving items are all decided
    /// closes as usual. Returns only the updates that changed.
    pub fn settle_earlier(
        &self,
        earlier: Vec<OrderUpdate>,
        processed_by: Uuid,
        at: DateTime<Utc>,
    ) -> Vec<OrderUpdate> {
        let kept: Vec<OrderItem> = self
            .items
            .iter()
            .filter(|i| !self.created.iter().any(|c| c.id == i.id))
            .cloned()
            .collect();

        earlier
            .into_iter()
            .filter(|u| u.id != self.update.id && u.status == UpdateStatus::Pending)
            .filter_map(|mut update| {
                if !update.items_changes.items.is_empty() && update.introduced(&kept).is_empty() {
                    update.supersede(self.update.id, processed_by, at);
                    return Some(update);
                }
                update.settle(&kept, processed_by, at).map(|_| update)
            })
            .collect()
    }
}

/// Audit record for a waiter cancelling every pending item of an order
pub fn cancellation_update(
    order: &Order,
    items: &[OrderItem],
    created_by: Uuid,
    at: DateTime<Utc>,
) -> OrderUpdate {
    OrderUpdate {
        id: Uuid::new_v4(),
        order_id: order.id,
        update_kind: UpdateKind::StatusChange,
        status: UpdateStatus::Completed,
        items_changes: ItemsChanges {
            items: Vec::new(),
            removed_pending_items: items
                .iter()
                .filter(|i| i.status == ItemStatus::Pending)
                .map(OrderItem::snapshot)
                .collect(),
            accepted_items_preserved: items
                .iter()
                .filter(|i| i.status == ItemStatus::Accepted)
                .map(OrderItem::snapshot)
                .collect(),
        },
        created_by,
        processed_by: Some(created_by),
        created_at: at,
        processed_at: Some(at),
        notes: Some("Order cancelled by waiter".to_string()),
        rejection_reason: None,
        total_addition_cost: Decimal::ZERO,
    }
}

/// An order split into accepted and pending buckets, with its edit history
#[derive(Debug, Clone, Serialize)]
pub struct OrderDisplay {
    pub order: Order,
    pub accepted_items: Vec<OrderItem>,
    pub pending_items: Vec<OrderItem>,
    pub updates: Vec<OrderUpdate>,
}

impl OrderDisplay {
    pub fn build(order: Order, items: Vec<OrderItem>, updates: Vec<OrderUpdate>) -> Self {
        let (accepted_items, rest): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|i| i.status == ItemStatus::Accepted);
        let pending_items = rest
            .into_iter()
            .filter(|i| i.status == ItemStatus::Pending)
            .collect();
        Self {
            order,
            accepted_items,
            pending_items,
            updates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{CashierStatus, ItemKind, PaymentOption, TrackStatus};
    use std::str::FromStr;

    fn item(name: &str, kind: ItemKind, qty: i32, price: &str, status: ItemStatus) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::nil(),
            name: name.to_string(),
            quantity: qty,
            unit_price: Decimal::from_str(price).unwrap(),
            kind,
            status,
            product_ref: (kind == ItemKind::Beverage).then(Uuid::new_v4),
            created_at: Utc::now() - chrono::Duration::minutes(5),
        }
    }

    fn new_item(name: &str, kind: ItemKind, qty: i32, price: &str) -> NewOrderItem {
        NewOrderItem {
            name: name.to_string(),
            quantity: qty,
            unit_price: Decimal::from_str(price).unwrap(),
            kind,
            product_ref: (kind == ItemKind::Beverage).then(Uuid::new_v4),
        }
    }

    fn order_for(items: &[OrderItem]) -> Order {
        let mut order = Order {
            id: Uuid::nil(),
            order_number: "20250817-01".to_string(),
            table_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            assigned_to: None,
            food_status: TrackStatus::NotApplicable,
            beverage_status: TrackStatus::NotApplicable,
            cashier_status: CashierStatus::Pending,
            payment_option: PaymentOption::NotChosen,
            branch_id: Uuid::new_v4(),
            total: Decimal::ZERO,
            receipt_image: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        order.on_item_changed(items).unwrap();
        order
    }

    #[test]
    fn test_reducing_accepted_quantity_is_refused() {
        let items = vec![item("Beer", ItemKind::Beverage, 3, "5", ItemStatus::Accepted)];
        let err = validate_update(&items, &[new_item("Beer", ItemKind::Beverage, 1, "5")])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot reduce quantity of 'Beer' from 3 to 1 after order acceptance"
        );
    }

    #[test]
    fn test_beverage_needs_product_ref() {
        let mut drink = new_item("Wine", ItemKind::Beverage, 1, "8");
        drink.product_ref = None;
        assert!(validate_update(&[], &[drink]).is_err());
        let mut food = new_item("Tibs", ItemKind::Food, 1, "12");
        food.product_ref = None;
        assert!(validate_update(&[], &[food]).is_ok());
    }

    #[test]
    fn test_empty_edit_without_pending_is_noop() {
        let items = vec![item("Beer", ItemKind::Beverage, 2, "5", ItemStatus::Accepted)];
        let order = order_for(&items);
        assert!(plan_edit(&order, &items, &[]).unwrap().is_none());
    }

    #[test]
    fn test_matching_quantity_is_unchanged_and_higher_adds_difference() {
        let items = vec![item("Beer", ItemKind::Beverage, 2, "5", ItemStatus::Accepted)];
        let order = order_for(&items);
        assert!(plan_edit(&order, &items, &[new_item("beer", ItemKind::Beverage, 2, "5")])
            .unwrap()
            .is_none());

        let plan = plan_edit(&order, &items, &[new_item("Beer", ItemKind::Beverage, 5, "5")])
            .unwrap()
            .unwrap();
        assert_eq!(plan.update_kind, UpdateKind::AddItems);
        assert_eq!(plan.new_items.len(), 1);
        assert_eq!(plan.new_items[0].quantity, 3);
        assert_eq!(plan.total_addition_cost, Decimal::from(15));
    }

    #[test]
    fn test_removal_only_edit_is_completed() {
        let items = vec![
            item("Beer", ItemKind::Beverage, 2, "5", ItemStatus::Accepted),
            item("Wine", ItemKind::Beverage, 1, "8", ItemStatus::Pending),
        ];
        let mut order = order_for(&items);
        let plan = plan_edit(&order, &items, &[]).unwrap().unwrap();
        assert_eq!(plan.update_kind, UpdateKind::Edit);
        assert_eq!(plan.update_status, UpdateStatus::Completed);

        let applied = plan.apply(&mut order, &items, Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(applied.items.len(), 1);
        assert_eq!(order.beverage_status, TrackStatus::Completed);
        assert_eq!(order.total, Decimal::from(10));
        assert!(applied.update.processed_at.is_some());
    }

    #[test]
    fn test_printed_order_cannot_be_edited() {
        let items = vec![item("Beer", ItemKind::Beverage, 2, "5", ItemStatus::Accepted)];
        let mut order = order_for(&items);
        order.cashier_status = CashierStatus::Printed;
        assert!(matches!(
            plan_edit(&order, &items, &[new_item("Tibs", ItemKind::Food, 1, "12")]),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn test_closure_waits_for_every_introduced_item() {
        let items = vec![item("Beer", ItemKind::Beverage, 2, "5", ItemStatus::Accepted)];
        let mut order = order_for(&items);
        let plan = plan_edit(
            &order,
            &items,
            &[
                new_item("Pizza", ItemKind::Food, 1, "12"),
                new_item("Coffee", ItemKind::Beverage, 1, "3.50"),
            ],
        )
        .unwrap()
        .unwrap();
        let applied = plan.apply(&mut order, &items, Uuid::new_v4(), Utc::now()).unwrap();
        let mut current = applied.items.clone();

        let pizza = current.iter_mut().find(|i| i.name == "Pizza").unwrap();
        pizza.status = ItemStatus::Accepted;
        assert_eq!(applied.update.closure_status(&current), None);

        let coffee = current.iter_mut().find(|i| i.name == "Coffee").unwrap();
        coffee.status = ItemStatus::Rejected;
        assert_eq!(
            applied.update.closure_status(&current),
            Some(UpdateStatus::Accepted)
        );
    }

    #[test]
    fn test_closure_rejected_when_nothing_accepted() {
        let items: Vec<OrderItem> = Vec::new();
        let mut order = order_for(&items);
        let plan = plan_edit(&order, &items, &[new_item("Pizza", ItemKind::Food, 1, "12")])
            .unwrap()
            .unwrap();
        let applied = plan.apply(&mut order, &items, Uuid::new_v4(), Utc::now()).unwrap();
        let mut current = applied.items.clone();
        current[0].status = ItemStatus::Rejected;

        let mut update = applied.update.clone();
        assert_eq!(
            update.settle(&current, Uuid::new_v4(), Utc::now()),
            Some(UpdateStatus::Rejected)
        );
        assert_eq!(
            update.rejection_reason.as_deref(),
            Some("All items were rejected by the station")
        );
        assert_eq!(update.closure_status(&current), None);
    }

    #[test]
    fn test_withdrawn_items_close_as_cancelled_by_waiter() {
        let items: Vec<OrderItem> = Vec::new();
        let mut order = order_for(&items);
        let plan = plan_edit(&order, &items, &[new_item("Pizza", ItemKind::Food, 1, "12")])
            .unwrap()
            .unwrap();
        let applied = plan.apply(&mut order, &items, Uuid::new_v4(), Utc::now()).unwrap();
        let mut current = applied.items.clone();
        current[0].status = ItemStatus::Cancelled;

        let mut update = applied.update.clone();
        update.settle(&current, Uuid::new_v4(), Utc::now());
        assert_eq!(update.status, UpdateStatus::Rejected);
        assert_eq!(
            update.rejection_reason.as_deref(),
            Some("All items were cancelled by the waiter")
        );
    }

    #[test]
    fn test_replaced_items_supersede_the_earlier_update() {
        let waiter = Uuid::new_v4();
        let first_at = Utc::now() - chrono::Duration::minutes(2);
        let second_at = Utc::now() - chrono::Duration::minutes(1);

        let items = vec![item("Beer", ItemKind::Beverage, 2, "5", ItemStatus::Accepted)];
        let mut order = order_for(&items);
        let first = plan_edit(&order, &items, &[new_item("Pizza", ItemKind::Food, 1, "12")])
            .unwrap()
            .unwrap()
            .apply(&mut order, &items, waiter, first_at)
            .unwrap();

        let second = plan_edit(&order, &first.items, &[new_item("Pasta", ItemKind::Food, 1, "11")])
            .unwrap()
            .unwrap()
            .apply(&mut order, &first.items, waiter, second_at)
            .unwrap();
        assert!(second.items.iter().all(|i| i.name != "Pizza"));

        let settled = second.settle_earlier(vec![first.update.clone()], waiter, second_at);
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].id, first.update.id);
        assert_eq!(settled[0].status, UpdateStatus::Rejected);
        assert_eq!(
            settled[0].rejection_reason,
            Some(format!("Superseded by update {}", second.update.id))
        );

        // The replacement is still decided by the station
        let mut current = second.items.clone();
        for item in current.iter_mut() {
            item.status = ItemStatus::Accepted;
        }
        let mut update = second.update.clone();
        assert_eq!(
            update.settle(&current, waiter, Utc::now()),
            Some(UpdateStatus::Accepted)
        );
    }

    #[test]
    fn test_partly_decided_update_closes_when_edit_drops_the_rest() {
        let waiter = Uuid::new_v4();
        let first_at = Utc::now() - chrono::Duration::minutes(2);
        let items: Vec<OrderItem> = Vec::new();
        let mut order = order_for(&items);
        let first = plan_edit(
            &order,
            &items,
            &[
                new_item("Tibs", ItemKind::Food, 1, "12"),
                new_item("Kitfo", ItemKind::Food, 1, "18"),
            ],
        )
        .unwrap()
        .unwrap()
        .apply(&mut order, &items, waiter, first_at)
        .unwrap();

        let mut current = first.items.clone();
        current.iter_mut().find(|i| i.name == "Tibs").unwrap().status = ItemStatus::Accepted;

        let second = plan_edit(&order, &current, &[])
            .unwrap()
            .unwrap()
            .apply(&mut order, &current, waiter, Utc::now())
            .unwrap();
        let settled = second.settle_earlier(vec![first.update.clone()], waiter, Utc::now());
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].status, UpdateStatus::Accepted);
    }

    #[test]
    fn test_display_buckets() {
        let items = vec![
            item("Beer", ItemKind::Beverage, 2, "5", ItemStatus::Accepted),
            item("Wine", ItemKind::Beverage, 1, "8", ItemStatus::Pending),
            item("Tej", ItemKind::Beverage, 1, "6", ItemStatus::Rejected),
        ];
        let order = order_for(&items);
        let display = OrderDisplay::build(order, items, Vec::new());
        assert_eq!(display.accepted_items.len(), 1);
        assert_eq!(display.pending_items.len(), 1);
    }
}
