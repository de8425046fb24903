//! Order lifecycle service
//!
//! Every mutation locks the order row, reloads its items, applies the change,
//! re-derives the order with `Order::on_item_changed`, closes any order update
//! the change settled and recomputes the table, all in one transaction.
//! Station notifications go out after commit.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::{begin_serializable, with_serializable_retry};
use super::inventory::consume_sale;
use super::notification::NotificationHub;
use super::table::{recompute_table_status, TABLE_COLUMNS};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use shared::{
    can_print_bill, cancellation_update, check_item_transition, format_order_number,
    station_items, validate_order_items, Caller, CashierStatus, ItemKind, ItemStatus,
    ItemsChanges, NewOrderItem, Order, OrderItem, OrderUpdate, PaginatedResponse, Pagination,
    PaymentOption, Role, Station, Table, TrackStatus, UpdateKind, UpdateStatus, WaiterActions,
    MAX_DAILY_SEQUENCE,
};

/// Order service
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
    hub: NotificationHub,
    consume_on_accept: bool,
    max_daily_sequence: u32,
}

pub(crate) const ORDER_COLUMNS: &str = "id, order_number, table_id, created_by, assigned_to, food_status, \
     beverage_status, cashier_status, payment_option, branch_id, total, receipt_image, created_at, updated_at";

pub(crate) const ITEM_COLUMNS: &str =
    "id, order_id, name, quantity, unit_price, kind, status, product_ref, created_at";

const UPDATE_COLUMNS: &str = "id, order_id, update_kind, status, items_changes, created_by, processed_by, \
     created_at, processed_at, notes, rejection_reason, total_addition_cost";

/// Input for creating an order
#[derive(Debug, Deserialize)]
pub struct CreateOrderInput {
    pub table_id: Uuid,
    pub items: Vec<NewOrderItem>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemStatusInput {
    pub status: ItemStatus,
}

#[derive(Debug, Deserialize)]
pub struct PaymentOptionInput {
    pub payment_option: PaymentOption,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub branch_id: Option<Uuid>,
    pub table_id: Option<Uuid>,
    pub cashier_status: Option<CashierStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// An order with its items
#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Row shape of `order_updates`; `items_changes` is JSONB
#[derive(Debug, FromRow)]
pub(crate) struct OrderUpdateRow {
    id: Uuid,
    order_id: Uuid,
    update_kind: UpdateKind,
    status: UpdateStatus,
    items_changes: serde_json::Value,
    created_by: Uuid,
    processed_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    rejection_reason: Option<String>,
    total_addition_cost: Decimal,
}

impl TryFrom<OrderUpdateRow> for OrderUpdate {
    type Error = AppError;

    fn try_from(row: OrderUpdateRow) -> Result<Self, Self::Error> {
        let items_changes: ItemsChanges = serde_json::from_value(row.items_changes)
            .map_err(|e| AppError::Internal(format!("Malformed items_changes: {}", e)))?;
        Ok(OrderUpdate {
            id: row.id,
            order_id: row.order_id,
            update_kind: row.update_kind,
            status: row.status,
            items_changes,
            created_by: row.created_by,
            processed_by: row.processed_by,
            created_at: row.created_at,
            processed_at: row.processed_at,
            notes: row.notes,
            rejection_reason: row.rejection_reason,
            total_addition_cost: row.total_addition_cost,
        })
    }
}

// ============================================================================
// Row helpers shared with the edit and payment services
// ============================================================================

/// Lock an order for a read-modify-write
pub(crate) async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Order> {
    sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Order".to_string()))
}

pub(crate) async fn fetch_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Order> {
    sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE id = $1",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Order".to_string()))
}

pub(crate) async fn load_items(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(&format!(
        "SELECT {} FROM order_items WHERE order_id = $1 ORDER BY created_at, name",
        ITEM_COLUMNS
    ))
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

pub(crate) async fn insert_items(conn: &mut PgConnection, items: &[OrderItem]) -> AppResult<()> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO order_items
                (id, order_id, name, quantity, unit_price, kind, status, product_ref, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(item.id)
        .bind(item.order_id)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.kind)
        .bind(item.status)
        .bind(item.product_ref)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Write back the derived fields of an order
pub(crate) async fn save_order(conn: &mut PgConnection, order: &Order) -> AppResult<Order> {
    let saved = sqlx::query_as::<_, Order>(&format!(
        r#"
        UPDATE orders
        SET food_status = $2, beverage_status = $3, cashier_status = $4, payment_option = $5,
            total = $6, assigned_to = $7, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        ORDER_COLUMNS
    ))
    .bind(order.id)
    .bind(order.food_status)
    .bind(order.beverage_status)
    .bind(order.cashier_status)
    .bind(order.payment_option)
    .bind(order.total)
    .bind(order.assigned_to)
    .fetch_one(&mut *conn)
    .await?;
    Ok(saved)
}

pub(crate) async fn insert_update(conn: &mut PgConnection, update: &OrderUpdate) -> AppResult<()> {
    let items_changes = serde_json::to_value(&update.items_changes)
        .map_err(|e| AppError::Internal(format!("Cannot encode items_changes: {}", e)))?;
    sqlx::query(
        r#"
        INSERT INTO order_updates (
            id, order_id, update_kind, status, items_changes, created_by, processed_by,
            created_at, processed_at, notes, rejection_reason, total_addition_cost
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(update.id)
    .bind(update.order_id)
    .bind(update.update_kind)
    .bind(update.status)
    .bind(items_changes)
    .bind(update.created_by)
    .bind(update.processed_by)
    .bind(update.created_at)
    .bind(update.processed_at)
    .bind(&update.notes)
    .bind(&update.rejection_reason)
    .bind(update.total_addition_cost)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn load_updates(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Vec<OrderUpdate>> {
    let rows = sqlx::query_as::<_, OrderUpdateRow>(&format!(
        "SELECT {} FROM order_updates WHERE order_id = $1 ORDER BY created_at",
        UPDATE_COLUMNS
    ))
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(OrderUpdate::try_from).collect()
}

/// Persist the outcome of a closed update
pub(crate) async fn save_update_status(conn: &mut PgConnection, update: &OrderUpdate) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE order_updates
        SET status = $2, processed_by = $3, processed_at = $4, rejection_reason = $5
        WHERE id = $1
        "#,
    )
    .bind(update.id)
    .bind(update.status)
    .bind(update.processed_by)
    .bind(update.processed_at)
    .bind(&update.rejection_reason)
    .execute(&mut *conn)
    .await?;
    tracing::info!(
        update_id = %update.id,
        order_id = %update.order_id,
        status = ?update.status,
        reason = ?update.rejection_reason,
        "Order update closed"
    );
    Ok(())
}

/// Close every pending update of an order whose items have all been acted on
pub(crate) async fn close_settled_updates(
    conn: &mut PgConnection,
    order_id: Uuid,
    items: &[OrderItem],
    actor: Uuid,
) -> AppResult<()> {
    let now = Utc::now();
    for mut update in load_updates(&mut *conn, order_id).await? {
        if update.settle(items, actor, now).is_some() {
            save_update_status(&mut *conn, &update).await?;
        }
    }
    Ok(())
}

/// Advance the per-date counter and return the next sequence
async fn next_sequence(conn: &mut PgConnection, date: NaiveDate) -> AppResult<u32> {
    let value: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO order_sequences (order_date, last_value)
        VALUES ($1, 1)
        ON CONFLICT (order_date)
        DO UPDATE SET last_value = order_sequences.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(date)
    .fetch_one(&mut *conn)
    .await?;
    u32::try_from(value).map_err(|_| AppError::Internal("Negative order sequence".to_string()))
}

/// Check that beverage items point at active products
async fn check_product_refs(conn: &mut PgConnection, items: &[NewOrderItem]) -> AppResult<()> {
    let refs: Vec<Uuid> = items.iter().filter_map(|i| i.product_ref).collect();
    if refs.is_empty() {
        return Ok(());
    }
    let found: Vec<Uuid> =
        sqlx::query_scalar("SELECT id FROM products WHERE id = ANY($1) AND is_active = true")
            .bind(&refs)
            .fetch_all(&mut *conn)
            .await?;
    match items
        .iter()
        .find(|i| i.product_ref.map_or(false, |r| !found.contains(&r)))
    {
        Some(item) => Err(AppError::validation(
            "product_ref",
            format!("'{}' references an unknown or inactive product", item.name),
        )),
        None => Ok(()),
    }
}

pub(crate) async fn table_number(conn: &mut PgConnection, table_id: Uuid) -> AppResult<i32> {
    let number: Option<i32> = sqlx::query_scalar("SELECT number FROM tables WHERE id = $1")
        .bind(table_id)
        .fetch_optional(&mut *conn)
        .await?;
    number.ok_or_else(|| AppError::NotFound("Table".to_string()))
}

pub(crate) fn require_waiter(user: &AuthUser, branch_id: Uuid) -> AppResult<()> {
    user.require_branch(branch_id)?;
    if user.role == Role::Waiter || user.manages_branch(branch_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only waiters and managers can change orders".to_string(),
        ))
    }
}

fn require_cashier(user: &AuthUser, branch_id: Uuid) -> AppResult<()> {
    user.require_branch(branch_id)?;
    if user.role == Role::Cashier || user.manages_branch(branch_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only cashiers and managers can handle bills".to_string(),
        ))
    }
}

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: PgPool, config: &Config, hub: NotificationHub) -> Self {
        Self {
            db,
            hub,
            consume_on_accept: config.inventory.consume_on_accept,
            max_daily_sequence: config.orders.max_daily_sequence.min(MAX_DAILY_SEQUENCE),
        }
    }

    /// Place an order on a table and notify the stations that received items
    pub async fn create(&self, user: &AuthUser, input: CreateOrderInput) -> AppResult<OrderWithItems> {
        validate_order_items(&input.items)?;
        let input = &input;
        with_serializable_retry(move || self.create_once(user, input)).await
    }

    /// One attempt at `create`; the order number is drawn inside the attempt
    /// so a rerun never skips or repeats a sequence
    async fn create_once(&self, user: &AuthUser, input: &CreateOrderInput) -> AppResult<OrderWithItems> {
        let mut tx = begin_serializable(&self.db).await?;
        let table = sqlx::query_as::<_, Table>(&format!(
            "SELECT {} FROM tables WHERE id = $1",
            TABLE_COLUMNS
        ))
        .bind(input.table_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Table".to_string()))?;
        require_waiter(user, table.branch_id)?;
        check_product_refs(&mut *tx, &input.items).await?;

        let now = Utc::now();
        let sequence = next_sequence(&mut *tx, now.date_naive()).await?;
        if sequence > self.max_daily_sequence {
            return Err(AppError::Conflict(format!(
                "All {} order numbers for today are taken",
                self.max_daily_sequence
            )));
        }
        let order_number = format_order_number(now.date_naive(), sequence)?;

        let mut order = Order {
            id: Uuid::new_v4(),
            order_number,
            table_id: table.id,
            created_by: user.user_id,
            assigned_to: input.assigned_to,
            food_status: TrackStatus::NotApplicable,
            beverage_status: TrackStatus::NotApplicable,
            cashier_status: CashierStatus::Pending,
            payment_option: PaymentOption::NotChosen,
            branch_id: table.branch_id,
            total: Decimal::ZERO,
            receipt_image: None,
            created_at: now,
            updated_at: now,
        };
        let items: Vec<OrderItem> = input
            .items
            .iter()
            .cloned()
            .map(|item| item.into_item(order.id, now))
            .collect();
        order.on_item_changed(&items)?;

        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders (
                id, order_number, table_id, created_by, assigned_to, food_status, beverage_status,
                cashier_status, payment_option, branch_id, total, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.table_id)
        .bind(order.created_by)
        .bind(order.assigned_to)
        .bind(order.food_status)
        .bind(order.beverage_status)
        .bind(order.cashier_status)
        .bind(order.payment_option)
        .bind(order.branch_id)
        .bind(order.total)
        .bind(order.created_at)
        .fetch_one(&mut *tx)
        .await?;
        insert_items(&mut *tx, &items).await?;
        recompute_table_status(&mut *tx, table.id).await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            table = table.number,
            total = %order.total,
            "Order created"
        );
        self.hub
            .notify_stations(order.branch_id, &order.order_number, table.number, &input.items);

        Ok(OrderWithItems { order, items })
    }

    /// Orders of a branch, newest first
    pub async fn list(&self, user: &AuthUser, query: OrderQuery) -> AppResult<PaginatedResponse<Order>> {
        let branch_id = user.resolve_branch(query.branch_id)?;
        let pagination = Pagination {
            page: query.page.unwrap_or(1),
            per_page: query.per_page.unwrap_or(20),
        };

        let orders = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {}
            FROM orders
            WHERE branch_id = $1
              AND ($2::uuid IS NULL OR table_id = $2)
              AND ($3::varchar IS NULL OR cashier_status = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
            ORDER_COLUMNS
        ))
        .bind(branch_id)
        .bind(query.table_id)
        .bind(query.cashier_status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE branch_id = $1
              AND ($2::uuid IS NULL OR table_id = $2)
              AND ($3::varchar IS NULL OR cashier_status = $3)
            "#,
        )
        .bind(branch_id)
        .bind(query.table_id)
        .bind(query.cashier_status)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(orders, &pagination, total.max(0) as u64))
    }

    pub async fn get(&self, user: &AuthUser, order_id: Uuid) -> AppResult<OrderWithItems> {
        let mut conn = self.db.acquire().await?;
        let order = fetch_order(&mut *conn, order_id).await?;
        user.require_branch(order.branch_id)?;
        let items = load_items(&mut *conn, order_id).await?;
        Ok(OrderWithItems { order, items })
    }

    /// What a station screen shows: its visible orders, with only its items
    pub async fn station_orders(
        &self,
        user: &AuthUser,
        station: Station,
        branch_id: Option<Uuid>,
    ) -> AppResult<Vec<OrderWithItems>> {
        let branch_id = user.resolve_branch(branch_id)?;
        if user.role.station() != Some(station) && !user.manages_branch(branch_id) {
            return Err(AppError::Forbidden(format!(
                "Only the {} station can view its queue",
                station.as_str()
            )));
        }

        let status_column = match station {
            Station::Food => "food_status",
            Station::Beverage => "beverage_status",
        };
        let orders = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {}
            FROM orders
            WHERE branch_id = $1 AND {} IN ('pending', 'preparing', 'completed')
            ORDER BY created_at
            "#,
            ORDER_COLUMNS, status_column
        ))
        .bind(branch_id)
        .fetch_all(&self.db)
        .await?;

        let mut conn = self.db.acquire().await?;
        let mut queue = Vec::with_capacity(orders.len());
        for order in orders.into_iter().filter(|o| o.visible_to(station)) {
            let items = station_items(&load_items(&mut *conn, order.id).await?, station);
            queue.push(OrderWithItems { order, items });
        }
        Ok(queue)
    }

    /// Accept, reject or cancel one item
    pub async fn update_item_status(
        &self,
        user: &AuthUser,
        item_id: Uuid,
        input: UpdateItemStatusInput,
    ) -> AppResult<OrderWithItems> {
        let input = &input;
        with_serializable_retry(move || self.update_item_status_once(user, item_id, input)).await
    }

    async fn update_item_status_once(
        &self,
        user: &AuthUser,
        item_id: Uuid,
        input: &UpdateItemStatusInput,
    ) -> AppResult<OrderWithItems> {
        let mut tx = begin_serializable(&self.db).await?;
        let order_id: Uuid = sqlx::query_scalar("SELECT order_id FROM order_items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Order item".to_string()))?;

        let mut order = lock_order(&mut *tx, order_id).await?;
        let mut items = load_items(&mut *tx, order_id).await?;
        let index = items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| AppError::NotFound("Order item".to_string()))?;
        check_item_transition(user, &order, &items[index], input.status)?;

        sqlx::query("UPDATE order_items SET status = $2 WHERE id = $1")
            .bind(item_id)
            .bind(input.status)
            .execute(&mut *tx)
            .await?;
        items[index].status = input.status;

        let item = &items[index];
        if input.status == ItemStatus::Accepted && item.kind == ItemKind::Beverage {
            match (self.consume_on_accept, item.product_ref, user.role) {
                (true, Some(product_id), Role::Bartender) => {
                    consume_sale(
                        &mut *tx,
                        product_id,
                        order.branch_id,
                        user.user_id,
                        item.quantity,
                        item.unit_price,
                        format!("Order #{} item '{}'", order.order_number, item.name),
                    )
                    .await?;
                }
                (true, Some(_), _) => {
                    tracing::debug!(item_id = %item.id, "Accepted by a non-bartender, no stock drawn");
                }
                _ => {}
            }
        }

        order.on_item_changed(&items)?;
        let order = save_order(&mut *tx, &order).await?;
        close_settled_updates(&mut *tx, order.id, &items, user.user_id).await?;
        recompute_table_status(&mut *tx, order.table_id).await?;

        tx.commit().await?;

        tracing::info!(
            order_number = %order.order_number,
            item_id = %item_id,
            status = input.status.as_str(),
            food_status = order.food_status.as_str(),
            beverage_status = order.beverage_status.as_str(),
            "Item status changed"
        );
        Ok(OrderWithItems { order, items })
    }

    /// Mark the bill as printed
    pub async fn print_bill(&self, user: &AuthUser, order_id: Uuid) -> AppResult<Order> {
        with_serializable_retry(move || self.print_bill_once(user, order_id)).await
    }

    async fn print_bill_once(&self, user: &AuthUser, order_id: Uuid) -> AppResult<Order> {
        let mut tx = begin_serializable(&self.db).await?;
        let mut order = lock_order(&mut *tx, order_id).await?;
        require_cashier(user, order.branch_id)?;
        let items = load_items(&mut *tx, order_id).await?;

        if order.is_printed() {
            tx.commit().await?;
            return Ok(order);
        }
        if !can_print_bill(&order, &items) {
            return Err(AppError::InvalidState(
                "The bill cannot be printed while the stations are still deciding".to_string(),
            ));
        }

        order.cashier_status = CashierStatus::Printed;
        order.on_item_changed(&items)?;
        let order = save_order(&mut *tx, &order).await?;
        recompute_table_status(&mut *tx, order.table_id).await?;
        tx.commit().await?;

        tracing::info!(order_number = %order.order_number, total = %order.total, "Bill printed");
        Ok(order)
    }

    /// Record how the customer intends to pay
    pub async fn set_payment_option(
        &self,
        user: &AuthUser,
        order_id: Uuid,
        input: PaymentOptionInput,
    ) -> AppResult<Order> {
        let input = &input;
        with_serializable_retry(move || self.set_payment_option_once(user, order_id, input)).await
    }

    async fn set_payment_option_once(
        &self,
        user: &AuthUser,
        order_id: Uuid,
        input: &PaymentOptionInput,
    ) -> AppResult<Order> {
        let mut tx = begin_serializable(&self.db).await?;
        let mut order = lock_order(&mut *tx, order_id).await?;
        require_cashier(user, order.branch_id)?;

        let paid: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM payments WHERE order_id = $1)")
            .bind(order_id)
            .fetch_one(&mut *tx)
            .await?;
        if paid {
            return Err(AppError::InvalidState("Order is already settled".to_string()));
        }

        order.payment_option = input.payment_option;
        let order = save_order(&mut *tx, &order).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Waiter cancel: every pending item becomes cancelled
    pub async fn cancel(&self, user: &AuthUser, order_id: Uuid) -> AppResult<OrderWithItems> {
        with_serializable_retry(move || self.cancel_once(user, order_id)).await
    }

    async fn cancel_once(&self, user: &AuthUser, order_id: Uuid) -> AppResult<OrderWithItems> {
        let mut tx = begin_serializable(&self.db).await?;
        let mut order = lock_order(&mut *tx, order_id).await?;
        require_waiter(user, order.branch_id)?;
        let mut items = load_items(&mut *tx, order_id).await?;

        if !WaiterActions::for_order(&order, &items).can_cancel {
            return Err(AppError::InvalidState(
                "Order can no longer be cancelled; a station has already accepted it".to_string(),
            ));
        }

        let now = Utc::now();
        let update = cancellation_update(&order, &items, user.user_id, now);
        sqlx::query("UPDATE order_items SET status = 'cancelled' WHERE order_id = $1 AND status = 'pending'")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        for item in items.iter_mut().filter(|i| i.status == ItemStatus::Pending) {
            item.status = ItemStatus::Cancelled;
        }

        order.on_item_changed(&items)?;
        let order = save_order(&mut *tx, &order).await?;
        insert_update(&mut *tx, &update).await?;
        close_settled_updates(&mut *tx, order.id, &items, user.user_id).await?;
        recompute_table_status(&mut *tx, order.table_id).await?;
        tx.commit().await?;

        tracing::info!(order_number = %order.order_number, "Order cancelled");
        Ok(OrderWithItems { order, items })
    }

    /// Remove an unpaid order entirely. Managers only.
    pub async fn delete(&self, user: &AuthUser, order_id: Uuid) -> AppResult<()> {
        with_serializable_retry(move || self.delete_once(user, order_id)).await
    }

    async fn delete_once(&self, user: &AuthUser, order_id: Uuid) -> AppResult<()> {
        let mut tx = begin_serializable(&self.db).await?;
        let order = lock_order(&mut *tx, order_id).await?;
        if !user.manages_branch(order.branch_id) {
            return Err(AppError::Forbidden(
                "Only a manager of the branch can delete orders".to_string(),
            ));
        }

        let paid: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM payments WHERE order_id = $1)")
            .bind(order_id)
            .fetch_one(&mut *tx)
            .await?;
        if paid {
            return Err(AppError::InvalidState(
                "A settled order cannot be deleted".to_string(),
            ));
        }

        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        recompute_table_status(&mut *tx, order.table_id).await?;
        tx.commit().await?;

        tracing::info!(order_number = %order.order_number, actor = %user.user_id, "Order deleted");
        Ok(())
    }

    /// The waiter permission matrix for an order
    pub async fn waiter_actions(&self, user: &AuthUser, order_id: Uuid) -> AppResult<WaiterActions> {
        let mut conn = self.db.acquire().await?;
        let order = fetch_order(&mut *conn, order_id).await?;
        user.require_branch(order.branch_id)?;
        let items = load_items(&mut *conn, order_id).await?;
        Ok(WaiterActions::for_order(&order, &items))
    }
}
