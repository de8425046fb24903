//! Order workflow tests
//!
//! Walks orders through the station and waiter flows:
//! - food/beverage/cashier derivation and its idempotence
//! - waiter edits after partial acceptance, and their audit records
//! - refusal to lower accepted quantities
//! - the waiter permission matrix and bill printing
//! - order number format and per-day uniqueness
//! - settlement and table status

use chrono::{DateTime, NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    can_print_bill, cancellation_update, check_item_transition, check_settlement,
    derive_table_status, format_order_number, is_valid_order_number, parse_order_number,
    plan_edit, station_items, station_notifications, CashierStatus, DomainError, EditPermission,
    ItemKind, ItemStatus, NewOrderItem, Order, OrderDisplay, OrderItem, PaymentOption, Role,
    Station, StaticCaller, TableOrderSummary, TableStatus, TrackStatus, UpdateKind, UpdateStatus,
    WaiterActions,
};
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn new_item(name: &str, kind: ItemKind, quantity: i32, price: &str) -> NewOrderItem {
    NewOrderItem {
        name: name.to_string(),
        quantity,
        unit_price: dec(price),
        kind,
        product_ref: (kind == ItemKind::Beverage).then(Uuid::new_v4),
    }
}

fn empty_order(branch_id: Uuid) -> Order {
    let now = Utc::now();
    Order {
        id: Uuid::new_v4(),
        order_number: "20250817-01".to_string(),
        table_id: Uuid::new_v4(),
        created_by: Uuid::new_v4(),
        assigned_to: None,
        food_status: TrackStatus::NotApplicable,
        beverage_status: TrackStatus::NotApplicable,
        cashier_status: CashierStatus::Pending,
        payment_option: PaymentOption::NotChosen,
        branch_id,
        total: Decimal::ZERO,
        receipt_image: None,
        created_at: now,
        updated_at: now,
    }
}

/// An order holding `items` with the given statuses, derived fields in place
fn order_with(
    branch_id: Uuid,
    items: &[(NewOrderItem, ItemStatus)],
    at: DateTime<Utc>,
) -> (Order, Vec<OrderItem>) {
    let mut order = empty_order(branch_id);
    let items: Vec<OrderItem> = items
        .iter()
        .map(|(item, status)| {
            let mut item = item.clone().into_item(order.id, at);
            item.status = *status;
            item
        })
        .collect();
    order.on_item_changed(&items).unwrap();
    (order, items)
}

/// Change one item the way the order service does
fn set_status(
    caller: &StaticCaller,
    order: &mut Order,
    items: &mut [OrderItem],
    name: &str,
    target: ItemStatus,
) -> Result<(), DomainError> {
    let index = items.iter().position(|i| i.name == name).unwrap();
    check_item_transition(caller, order, &items[index], target)?;
    items[index].status = target;
    order.on_item_changed(items)?;
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_status_derivation_through_station_decisions() {
        let branch = Uuid::new_v4();
        let meat = StaticCaller::new(Role::Meat, branch);
        let bartender = StaticCaller::new(Role::Bartender, branch);
        let (mut order, mut items) = order_with(
            branch,
            &[
                (new_item("Burger", ItemKind::Food, 1, "15"), ItemStatus::Pending),
                (new_item("Pepsi", ItemKind::Beverage, 2, "5"), ItemStatus::Pending),
            ],
            Utc::now(),
        );

        assert_eq!(order.food_status, TrackStatus::Pending);
        assert_eq!(order.beverage_status, TrackStatus::Pending);
        assert_eq!(order.total, dec("25"));

        set_status(&meat, &mut order, &mut items, "Burger", ItemStatus::Accepted).unwrap();
        assert_eq!(order.food_status, TrackStatus::Completed);
        assert_eq!(order.beverage_status, TrackStatus::Pending);

        set_status(&bartender, &mut order, &mut items, "Pepsi", ItemStatus::Rejected).unwrap();
        assert_eq!(order.beverage_status, TrackStatus::Rejected);
        assert_eq!(order.cashier_status, CashierStatus::ReadyForPayment);
        // Rejected lines drop out of the total
        assert_eq!(order.total, dec("15"));
    }

    #[test]
    fn test_station_cannot_act_on_other_station_items() {
        let branch = Uuid::new_v4();
        let bartender = StaticCaller::new(Role::Bartender, branch);
        let (mut order, mut items) = order_with(
            branch,
            &[(new_item("Tibs", ItemKind::Food, 1, "20"), ItemStatus::Pending)],
            Utc::now(),
        );

        let err = set_status(&bartender, &mut order, &mut items, "Tibs", ItemStatus::Accepted)
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        assert_eq!(items[0].status, ItemStatus::Pending);
    }

    #[test]
    fn test_decided_item_cannot_be_decided_again() {
        let branch = Uuid::new_v4();
        let meat = StaticCaller::new(Role::Meat, branch);
        let (mut order, mut items) = order_with(
            branch,
            &[(new_item("Tibs", ItemKind::Food, 1, "20"), ItemStatus::Accepted)],
            Utc::now(),
        );

        let err = set_status(&meat, &mut order, &mut items, "Tibs", ItemStatus::Rejected)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn test_edit_after_partial_acceptance() {
        let branch = Uuid::new_v4();
        let waiter = Uuid::new_v4();
        let earlier = Utc::now() - chrono::Duration::minutes(5);
        let (mut order, items) = order_with(
            branch,
            &[
                (new_item("Beer", ItemKind::Beverage, 2, "5"), ItemStatus::Accepted),
                (new_item("Burger", ItemKind::Food, 1, "15"), ItemStatus::Accepted),
                (new_item("Wine", ItemKind::Beverage, 1, "8"), ItemStatus::Pending),
            ],
            earlier,
        );
        assert_eq!(order.total, dec("33"));
        let wine_id = items.iter().find(|i| i.name == "Wine").unwrap().id;

        let edit = vec![
            new_item("Pizza", ItemKind::Food, 2, "12"),
            new_item("Coffee", ItemKind::Beverage, 3, "3.50"),
        ];
        let plan = plan_edit(&order, &items, &edit).unwrap().expect("edit changes the order");
        assert_eq!(plan.update_kind, UpdateKind::Edit);
        assert_eq!(plan.update_status, UpdateStatus::Pending);
        assert_eq!(plan.removed_item_ids, vec![wine_id]);
        assert_eq!(plan.total_addition_cost, dec("34.50"));

        let applied = plan.apply(&mut order, &items, waiter, Utc::now()).unwrap();
        assert!(applied.items.iter().all(|i| i.id != wine_id));
        assert_eq!(applied.created.len(), 2);
        assert!(applied.created.iter().all(|i| i.status == ItemStatus::Pending));
        assert_eq!(order.food_status, TrackStatus::Pending);
        assert_eq!(order.beverage_status, TrackStatus::Pending);
        assert_eq!(order.total, dec("59.50"));

        let mut update = applied.update;
        assert_eq!(update.status, UpdateStatus::Pending);
        assert_eq!(update.items_changes.removed_pending_items.len(), 1);
        assert_eq!(update.items_changes.accepted_items_preserved.len(), 2);

        // Stations accept the new items and the update closes
        let mut items = applied.items;
        assert_eq!(update.closure_status(&items), None);
        for item in items.iter_mut().filter(|i| i.status == ItemStatus::Pending) {
            item.status = ItemStatus::Accepted;
        }
        assert_eq!(
            update.settle(&items, Uuid::new_v4(), Utc::now()),
            Some(UpdateStatus::Accepted)
        );
        assert_eq!(update.status, UpdateStatus::Accepted);
        assert_eq!(update.rejection_reason, None);
        assert!(update.processed_at.is_some());
    }

    #[test]
    fn test_update_closes_rejected_when_every_new_item_is_refused() {
        let branch = Uuid::new_v4();
        let (mut order, items) = order_with(
            branch,
            &[(new_item("Burger", ItemKind::Food, 1, "15"), ItemStatus::Accepted)],
            Utc::now() - chrono::Duration::minutes(1),
        );
        let plan = plan_edit(&order, &items, &[new_item("Soup", ItemKind::Food, 1, "6")])
            .unwrap()
            .unwrap();
        assert_eq!(plan.update_kind, UpdateKind::AddItems);

        let applied = plan.apply(&mut order, &items, Uuid::new_v4(), Utc::now()).unwrap();
        let mut items = applied.items;
        items.iter_mut().find(|i| i.name == "Soup").unwrap().status = ItemStatus::Rejected;

        let mut update = applied.update;
        assert_eq!(
            update.settle(&items, Uuid::new_v4(), Utc::now()),
            Some(UpdateStatus::Rejected)
        );
        assert_eq!(
            update.rejection_reason.as_deref(),
            Some("All items were rejected by the station")
        );
    }

    #[test]
    fn test_update_withdrawn_by_waiter_says_so() {
        let branch = Uuid::new_v4();
        let (mut order, items) = order_with(
            branch,
            &[(new_item("Burger", ItemKind::Food, 1, "15"), ItemStatus::Accepted)],
            Utc::now() - chrono::Duration::minutes(1),
        );
        let plan = plan_edit(&order, &items, &[new_item("Soup", ItemKind::Food, 1, "6")])
            .unwrap()
            .unwrap();
        let applied = plan.apply(&mut order, &items, Uuid::new_v4(), Utc::now()).unwrap();
        let mut items = applied.items;
        items.iter_mut().find(|i| i.name == "Soup").unwrap().status = ItemStatus::Cancelled;

        let mut update = applied.update;
        assert_eq!(
            update.settle(&items, Uuid::new_v4(), Utc::now()),
            Some(UpdateStatus::Rejected)
        );
        assert_eq!(
            update.rejection_reason.as_deref(),
            Some("All items were cancelled by the waiter")
        );
    }

    #[test]
    fn test_second_edit_supersedes_the_first() {
        let branch = Uuid::new_v4();
        let waiter = Uuid::new_v4();
        let opened = Utc::now() - chrono::Duration::minutes(10);
        let (mut order, items) = order_with(
            branch,
            &[(new_item("Burger", ItemKind::Food, 1, "15"), ItemStatus::Accepted)],
            opened,
        );

        let first = plan_edit(&order, &items, &[new_item("Pizza", ItemKind::Food, 1, "12")])
            .unwrap()
            .unwrap()
            .apply(&mut order, &items, waiter, opened + chrono::Duration::minutes(1))
            .unwrap();

        let second = plan_edit(&order, &first.items, &[new_item("Pasta", ItemKind::Food, 1, "11")])
            .unwrap()
            .unwrap()
            .apply(&mut order, &first.items, waiter, opened + chrono::Duration::minutes(2))
            .unwrap();
        assert!(second.items.iter().all(|i| i.name != "Pizza"));

        let settled = second.settle_earlier(vec![first.update.clone()], waiter, Utc::now());
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].id, first.update.id);
        assert_eq!(settled[0].status, UpdateStatus::Rejected);
        assert_eq!(
            settled[0].rejection_reason,
            Some(format!("Superseded by update {}", second.update.id))
        );

        // The second update still closes on its own items
        let mut items = second.items;
        items.iter_mut().find(|i| i.name == "Pasta").unwrap().status = ItemStatus::Accepted;
        let mut update = second.update;
        assert_eq!(
            update.settle(&items, Uuid::new_v4(), Utc::now()),
            Some(UpdateStatus::Accepted)
        );
        assert_eq!(order.total, dec("26"));
    }

    #[test]
    fn test_unbillable_price_is_refused() {
        let branch = Uuid::new_v4();
        let (order, items) = order_with(
            branch,
            &[(new_item("Burger", ItemKind::Food, 1, "15"), ItemStatus::Accepted)],
            Utc::now(),
        );

        for price in ["79228162514264337593543950335", "1000000000000", "3.505"] {
            let err = plan_edit(&order, &items, &[new_item("Steak", ItemKind::Food, 1, price)])
                .unwrap_err();
            assert!(
                matches!(err, DomainError::Validation { .. }),
                "price {} gave {:?}",
                price,
                err
            );
        }
        assert!(plan_edit(&order, &items, &[new_item("Steak", ItemKind::Food, 1, "3.50")])
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_lowering_accepted_quantity_is_refused() {
        let branch = Uuid::new_v4();
        let (order, items) = order_with(
            branch,
            &[(new_item("Beer", ItemKind::Beverage, 3, "5"), ItemStatus::Accepted)],
            Utc::now(),
        );
        let before = order.clone();

        let err = plan_edit(&order, &items, &[new_item("Beer", ItemKind::Beverage, 1, "5")])
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::Validation {
                field: None,
                message: "Cannot reduce quantity of 'Beer' from 3 to 1 after order acceptance"
                    .to_string(),
            }
        );
        assert_eq!(order.total, before.total);
        assert_eq!(order.beverage_status, before.beverage_status);
    }

    #[test]
    fn test_raising_accepted_quantity_adds_the_difference() {
        let branch = Uuid::new_v4();
        let (order, items) = order_with(
            branch,
            &[(new_item("Beer", ItemKind::Beverage, 2, "5"), ItemStatus::Accepted)],
            Utc::now(),
        );

        let plan = plan_edit(&order, &items, &[new_item("Beer", ItemKind::Beverage, 5, "5")])
            .unwrap()
            .unwrap();
        assert_eq!(plan.new_items.len(), 1);
        assert_eq!(plan.new_items[0].quantity, 3);
        assert_eq!(plan.total_addition_cost, dec("15"));
    }

    #[test]
    fn test_empty_edit_without_pending_items_is_a_no_op() {
        let branch = Uuid::new_v4();
        let (order, items) = order_with(
            branch,
            &[(new_item("Burger", ItemKind::Food, 1, "15"), ItemStatus::Accepted)],
            Utc::now(),
        );
        assert!(plan_edit(&order, &items, &[]).unwrap().is_none());

        // Restating accepted quantities changes nothing either
        let same = [new_item("Burger", ItemKind::Food, 1, "15")];
        assert!(plan_edit(&order, &items, &same).unwrap().is_none());
    }

    #[test]
    fn test_beverage_only_edit_leaves_food_track_alone() {
        let branch = Uuid::new_v4();
        let (mut order, items) = order_with(
            branch,
            &[
                (new_item("Tibs", ItemKind::Food, 1, "20"), ItemStatus::Accepted),
                (new_item("Pepsi", ItemKind::Beverage, 1, "5"), ItemStatus::Pending),
            ],
            Utc::now(),
        );
        assert_eq!(order.food_status, TrackStatus::Completed);

        let plan = plan_edit(&order, &items, &[new_item("Fanta", ItemKind::Beverage, 2, "5")])
            .unwrap()
            .unwrap();
        plan.apply(&mut order, &items, Uuid::new_v4(), Utc::now()).unwrap();

        assert_eq!(order.food_status, TrackStatus::Completed);
        assert_eq!(order.beverage_status, TrackStatus::Pending);
        assert_eq!(order.total, dec("30"));
    }

    #[test]
    fn test_printed_order_cannot_be_edited() {
        let branch = Uuid::new_v4();
        let (mut order, items) = order_with(
            branch,
            &[(new_item("Tibs", ItemKind::Food, 1, "20"), ItemStatus::Accepted)],
            Utc::now(),
        );
        order.cashier_status = CashierStatus::Printed;

        let err = plan_edit(&order, &items, &[new_item("Soup", ItemKind::Food, 1, "6")])
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
        assert_eq!(WaiterActions::for_order(&order, &items), WaiterActions::NONE);
    }

    #[test]
    fn test_waiter_matrix_follows_beverages_first() {
        let branch = Uuid::new_v4();
        let (order, items) = order_with(
            branch,
            &[
                (new_item("Tibs", ItemKind::Food, 1, "20"), ItemStatus::Accepted),
                (new_item("Pepsi", ItemKind::Beverage, 1, "5"), ItemStatus::Pending),
            ],
            Utc::now(),
        );

        let actions = WaiterActions::for_order(&order, &items);
        assert_eq!(actions.edit, EditPermission::Free);
        assert!(actions.can_cancel);
        assert!(!actions.can_print_bill);
        // The cashier track is not ready while the beverage is pending
        assert!(!can_print_bill(&order, &items));

        let (order, items) = order_with(
            branch,
            &[(new_item("Pepsi", ItemKind::Beverage, 1, "5"), ItemStatus::Accepted)],
            Utc::now(),
        );
        let actions = WaiterActions::for_order(&order, &items);
        assert_eq!(actions.edit, EditPermission::IncreaseOnly);
        assert!(!actions.can_cancel);
        assert!(actions.can_print_bill);
        assert!(can_print_bill(&order, &items));
    }

    #[test]
    fn test_waiter_cancel_records_pending_items() {
        let branch = Uuid::new_v4();
        let waiter = StaticCaller::new(Role::Waiter, branch);
        let (mut order, mut items) = order_with(
            branch,
            &[
                (new_item("Tibs", ItemKind::Food, 1, "20"), ItemStatus::Pending),
                (new_item("Soup", ItemKind::Food, 2, "6"), ItemStatus::Pending),
            ],
            Utc::now(),
        );
        assert!(WaiterActions::for_order(&order, &items).can_cancel);

        let update = cancellation_update(&order, &items, waiter.id, Utc::now());
        assert_eq!(update.update_kind, UpdateKind::StatusChange);
        assert_eq!(update.items_changes.removed_pending_items.len(), 2);

        set_status(&waiter, &mut order, &mut items, "Tibs", ItemStatus::Cancelled).unwrap();
        set_status(&waiter, &mut order, &mut items, "Soup", ItemStatus::Cancelled).unwrap();
        assert_eq!(order.food_status, TrackStatus::Cancelled);
        assert_eq!(order.total, Decimal::ZERO);
        assert_eq!(order.cashier_status, CashierStatus::Pending);
    }

    #[test]
    fn test_station_projection_and_display() {
        let branch = Uuid::new_v4();
        let (order, items) = order_with(
            branch,
            &[
                (new_item("Tibs", ItemKind::Food, 1, "20"), ItemStatus::Accepted),
                (new_item("Pepsi", ItemKind::Beverage, 1, "5"), ItemStatus::Pending),
                (new_item("Wine", ItemKind::Beverage, 1, "8"), ItemStatus::Rejected),
            ],
            Utc::now(),
        );

        assert!(order.visible_to(Station::Food));
        assert!(order.visible_to(Station::Beverage));
        let bar = station_items(&items, Station::Beverage);
        assert_eq!(bar.len(), 2);
        assert!(bar.iter().all(|i| i.kind == ItemKind::Beverage));

        let display = OrderDisplay::build(order, items, Vec::new());
        assert_eq!(display.accepted_items.len(), 1);
        assert_eq!(display.pending_items.len(), 1);
    }

    #[test]
    fn test_notifications_go_to_stations_with_items() {
        let items = [
            new_item("Tibs", ItemKind::Food, 1, "20"),
            new_item("Soup", ItemKind::Food, 1, "6"),
        ];
        let notifications = station_notifications("20250817-03", 5, &items);
        assert_eq!(notifications.len(), 1);
        let (station, notification) = &notifications[0];
        assert_eq!(*station, Station::Food);
        assert_eq!(notification.item_count, 2);
        assert_eq!(notification.message(), "Order #20250817-03 (Table 5) with 2 item(s)");
    }

    #[test]
    fn test_five_orders_on_one_day_get_distinct_numbers() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 17).unwrap();
        let numbers: Vec<String> = (1..=5)
            .map(|seq| format_order_number(date, seq).unwrap())
            .collect();

        assert_eq!(numbers[0], "20250817-01");
        assert_eq!(numbers[4], "20250817-05");
        let unique: HashSet<&String> = numbers.iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_sequence_outside_two_digits_is_refused() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 17).unwrap();
        assert!(format_order_number(date, 0).is_err());
        assert!(format_order_number(date, 99).is_ok());
        assert!(format_order_number(date, 100).is_err());
    }

    #[test]
    fn test_settlement_requires_printed_bill_and_no_pending_items() {
        let branch = Uuid::new_v4();
        let (mut order, items) = order_with(
            branch,
            &[
                (new_item("Tibs", ItemKind::Food, 2, "20"), ItemStatus::Accepted),
                (new_item("Pepsi", ItemKind::Beverage, 1, "5"), ItemStatus::Rejected),
            ],
            Utc::now(),
        );

        assert!(matches!(
            check_settlement(&order, &items),
            Err(DomainError::InvalidState(_))
        ));
        order.cashier_status = CashierStatus::Printed;
        assert_eq!(check_settlement(&order, &items).unwrap(), dec("40"));
        assert_eq!(check_settlement(&order, &items).unwrap(), order.total);
    }

    #[test]
    fn test_table_status_follows_its_orders() {
        let now = Utc::now();
        let summary = |cashier_status, has_live_items, is_paid| TableOrderSummary {
            cashier_status,
            has_live_items,
            is_paid,
            created_at: now,
        };

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
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn status_strategy() -> impl Strategy<Value = ItemStatus> {
        prop_oneof![
            Just(ItemStatus::Pending),
            Just(ItemStatus::Accepted),
            Just(ItemStatus::Rejected),
            Just(ItemStatus::Cancelled),
        ]
    }

    fn item_strategy() -> impl Strategy<Value = (NewOrderItem, ItemStatus)> {
        (any::<bool>(), 1i32..10, 1u32..5_000, status_strategy()).prop_map(
            |(is_food, quantity, cents, status)| {
                let kind = if is_food { ItemKind::Food } else { ItemKind::Beverage };
                let mut item = new_item("Item", kind, quantity, "0");
                item.unit_price = Decimal::new(i64::from(cents), 2);
                (item, status)
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Re-deriving a derived order changes nothing
        #[test]
        fn prop_derivation_is_idempotent(
            items in prop::collection::vec(item_strategy(), 1..12)
        ) {
            let (mut order, items) = order_with(Uuid::new_v4(), &items, Utc::now());
            let snapshot = (order.food_status, order.beverage_status, order.cashier_status, order.total);

            prop_assert!(!order.on_item_changed(&items).unwrap());
            prop_assert_eq!(
                (order.food_status, order.beverage_status, order.cashier_status, order.total),
                snapshot
            );
        }

        /// The total counts pending and accepted lines only
        #[test]
        fn prop_total_counts_live_items(
            items in prop::collection::vec(item_strategy(), 1..12)
        ) {
            let (order, items) = order_with(Uuid::new_v4(), &items, Utc::now());
            let expected: Decimal = items
                .iter()
                .filter(|i| i.status.is_live())
                .map(|i| i.line_total().unwrap())
                .sum();
            prop_assert_eq!(order.total, expected);
        }

        /// Every formatted number parses back to its date and sequence
        #[test]
        fn prop_order_number_format(
            days in 0i64..20_000,
            seq in 1u32..=99
        ) {
            let date = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap() + chrono::Duration::days(days);
            let number = format_order_number(date, seq).unwrap();
            prop_assert!(is_valid_order_number(&number));
            prop_assert_eq!(parse_order_number(&number), Some((date, seq)));
        }
    }
}
