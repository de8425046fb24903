//! Waiter edits of a live order
//!
//! An edit replaces the pending part of an order. Accepted items stay, and
//! naming an accepted item with a higher quantity adds a pending item for the
//! difference. Every edit leaves an `order_updates` row behind.

use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::{begin_serializable, with_serializable_retry};
use super::notification::NotificationHub;
use super::order::{
    fetch_order, insert_items, insert_update, load_items, load_updates, lock_order,
    require_waiter, save_order, save_update_status, table_number, OrderWithItems,
};
use super::table::recompute_table_status;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use shared::{plan_edit, EditPermission, NewOrderItem, OrderDisplay, OrderUpdate, WaiterActions};

/// Order edit service
#[derive(Clone)]
pub struct OrderUpdateService {
    db: PgPool,
    hub: NotificationHub,
}

/// The full desired item list after an edit
#[derive(Debug, Deserialize)]
pub struct EditOrderInput {
    pub items: Vec<NewOrderItem>,
}

impl OrderUpdateService {
    /// Create a new OrderUpdateService instance
    pub fn new(db: PgPool, hub: NotificationHub) -> Self {
        Self { db, hub }
    }

    /// Apply a waiter edit. An edit that changes nothing is accepted and
    /// leaves no trace.
    pub async fn edit(
        &self,
        user: &AuthUser,
        order_id: Uuid,
        input: EditOrderInput,
    ) -> AppResult<OrderWithItems> {
        let input = &input;
        with_serializable_retry(move || self.edit_once(user, order_id, input)).await
    }

    async fn edit_once(
        &self,
        user: &AuthUser,
        order_id: Uuid,
        input: &EditOrderInput,
    ) -> AppResult<OrderWithItems> {
        let mut tx = begin_serializable(&self.db).await?;
        let mut order = lock_order(&mut *tx, order_id).await?;
        require_waiter(user, order.branch_id)?;
        let items = load_items(&mut *tx, order_id).await?;

        if WaiterActions::for_order(&order, &items).edit == EditPermission::None {
            return Err(AppError::InvalidState(
                "Order can no longer be edited".to_string(),
            ));
        }

        let Some(plan) = plan_edit(&order, &items, &input.items)? else {
            tx.commit().await?;
            tracing::debug!(order_id = %order_id, "Edit changes nothing");
            return Ok(OrderWithItems { order, items });
        };

        let now = Utc::now();
        let earlier = load_updates(&mut *tx, order_id).await?;
        let applied = plan.apply(&mut order, &items, user.user_id, now)?;
        let settled = applied.settle_earlier(earlier, user.user_id, now);

        if !plan.removed_item_ids.is_empty() {
            sqlx::query("DELETE FROM order_items WHERE id = ANY($1) AND status = 'pending'")
                .bind(&plan.removed_item_ids)
                .execute(&mut *tx)
                .await?;
        }
        insert_items(&mut *tx, &applied.created).await?;
        let order = save_order(&mut *tx, &order).await?;
        insert_update(&mut *tx, &applied.update).await?;
        for update in &settled {
            save_update_status(&mut *tx, update).await?;
        }
        recompute_table_status(&mut *tx, order.table_id).await?;
        let table = table_number(&mut *tx, order.table_id).await?;

        tx.commit().await?;

        tracing::info!(
            order_number = %order.order_number,
            update_id = %applied.update.id,
            kind = ?applied.update.update_kind,
            removed = plan.removed_item_ids.len(),
            added = applied.created.len(),
            settled = settled.len(),
            addition_cost = %plan.total_addition_cost,
            "Order edited"
        );
        self.hub
            .notify_stations(order.branch_id, &order.order_number, table, &plan.new_items);

        Ok(OrderWithItems {
            order,
            items: applied.items,
        })
    }

    /// The order split into accepted and pending items, with its update history
    pub async fn display(&self, user: &AuthUser, order_id: Uuid) -> AppResult<OrderDisplay> {
        let mut conn = self.db.acquire().await?;
        let order = fetch_order(&mut *conn, order_id).await?;
        user.require_branch(order.branch_id)?;
        let items = load_items(&mut *conn, order_id).await?;
        let updates = load_updates(&mut *conn, order_id).await?;
        Ok(OrderDisplay::build(order, items, updates))
    }

    pub async fn list_updates(&self, user: &AuthUser, order_id: Uuid) -> AppResult<Vec<OrderUpdate>> {
        let mut conn = self.db.acquire().await?;
        let order = fetch_order(&mut *conn, order_id).await?;
        user.require_branch(order.branch_id)?;
        load_updates(&mut *conn, order_id).await
    }
}
