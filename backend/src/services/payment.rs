//! Payment settlement service

use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::{begin_serializable, with_serializable_retry};
use super::order::{fetch_order, load_items, lock_order, save_order};
use super::table::recompute_table_status;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use shared::{check_settlement, Caller, Payment, PaymentMethod, Role};

/// Payment service
#[derive(Clone)]
pub struct PaymentService {
    db: PgPool,
}

const PAYMENT_COLUMNS: &str = "id, order_id, method, amount, processed_by, processed_at, is_completed";

/// Input for settling an order
#[derive(Debug, Deserialize)]
pub struct SettlePaymentInput {
    pub order_id: Uuid,
    pub method: PaymentMethod,
}

impl PaymentService {
    /// Create a new PaymentService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Settle a printed order. The amount is the order total at this moment
    /// and an order is settled at most once.
    pub async fn settle(&self, user: &AuthUser, input: SettlePaymentInput) -> AppResult<Payment> {
        let input = &input;
        with_serializable_retry(move || self.settle_once(user, input)).await
    }

    async fn settle_once(&self, user: &AuthUser, input: &SettlePaymentInput) -> AppResult<Payment> {
        let mut tx = begin_serializable(&self.db).await?;
        let mut order = lock_order(&mut *tx, input.order_id).await?;
        user.require_branch(order.branch_id)?;
        if user.role != Role::Cashier && !user.manages_branch(order.branch_id) {
            return Err(AppError::Forbidden(
                "Only cashiers and managers can take payments".to_string(),
            ));
        }

        let items = load_items(&mut *tx, order.id).await?;
        let amount = check_settlement(&order, &items)?;

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (id, order_id, method, amount, processed_by, processed_at, is_completed)
            VALUES ($1, $2, $3, $4, $5, $6, true)
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(input.method)
        .bind(amount)
        .bind(user.user_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!(
                "Order {} is already settled",
                order.order_number
            )),
            other => other,
        })?;

        order.payment_option = input.method.payment_option();
        let order = save_order(&mut *tx, &order).await?;
        recompute_table_status(&mut *tx, order.table_id).await?;
        tx.commit().await?;

        tracing::info!(
            order_number = %order.order_number,
            payment_id = %payment.id,
            amount = %payment.amount,
            method = ?payment.method,
            "Payment settled"
        );
        Ok(payment)
    }

    /// The payment recorded for an order
    pub async fn get(&self, user: &AuthUser, order_id: Uuid) -> AppResult<Payment> {
        let mut conn = self.db.acquire().await?;
        let order = fetch_order(&mut *conn, order_id).await?;
        user.require_branch(order.branch_id)?;

        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE order_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment".to_string()))
    }
}
