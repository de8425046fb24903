//! Dining table service

use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use shared::{derive_table_status, Caller, Table, TableOrderSummary, TableStatus};

/// Table service
#[derive(Clone)]
pub struct TableService {
    db: PgPool,
}

pub(crate) const TABLE_COLUMNS: &str = "id, number, branch_id, seats, status, created_by, created_at";

/// Input for creating a table
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTableInput {
    #[validate(range(min = 1, max = 999))]
    pub number: i32,
    #[validate(range(min = 1, max = 50))]
    pub seats: i32,
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TableQuery {
    pub branch_id: Option<Uuid>,
    pub status: Option<TableStatus>,
}

/// Recompute a table's status from its orders and store it
pub async fn recompute_table_status(conn: &mut PgConnection, table_id: Uuid) -> AppResult<TableStatus> {
    let summaries = sqlx::query_as::<_, TableOrderSummary>(
        r#"
        SELECT o.cashier_status,
               EXISTS (
                   SELECT 1 FROM order_items i
                   WHERE i.order_id = o.id AND i.status IN ('pending', 'accepted')
               ) AS has_live_items,
               EXISTS (
                   SELECT 1 FROM payments p
                   WHERE p.order_id = o.id AND p.is_completed = true
               ) AS is_paid,
               o.created_at
        FROM orders o
        WHERE o.table_id = $1
        "#,
    )
    .bind(table_id)
    .fetch_all(&mut *conn)
    .await?;

    let status = derive_table_status(&summaries);
    let previous: Option<TableStatus> =
        sqlx::query_scalar("UPDATE tables SET status = $2 WHERE id = $1 RETURNING status")
            .bind(table_id)
            .bind(status)
            .fetch_optional(&mut *conn)
            .await?;

    if previous.is_none() {
        tracing::warn!(table_id = %table_id, "Table vanished during status recompute");
    }
    Ok(status)
}

impl TableService {
    /// Create a new TableService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Tables of a branch ordered by number
    pub async fn list(&self, user: &AuthUser, query: TableQuery) -> AppResult<Vec<Table>> {
        let branch_id = user.resolve_branch(query.branch_id)?;
        let tables = sqlx::query_as::<_, Table>(&format!(
            r#"
            SELECT {}
            FROM tables
            WHERE branch_id = $1 AND ($2::varchar IS NULL OR status = $2)
            ORDER BY number
            "#,
            TABLE_COLUMNS
        ))
        .bind(branch_id)
        .bind(query.status)
        .fetch_all(&self.db)
        .await?;
        Ok(tables)
    }

    pub async fn get(&self, user: &AuthUser, table_id: Uuid) -> AppResult<Table> {
        let table = sqlx::query_as::<_, Table>(&format!(
            "SELECT {} FROM tables WHERE id = $1",
            TABLE_COLUMNS
        ))
        .bind(table_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Table".to_string()))?;
        user.require_branch(table.branch_id)?;
        Ok(table)
    }

    /// Add a table to a branch. Numbers are unique per branch.
    pub async fn create(&self, user: &AuthUser, input: CreateTableInput) -> AppResult<Table> {
        input.validate()?;
        let branch_id = user.resolve_branch(input.branch_id)?;
        if !user.manages_branch(branch_id) {
            return Err(AppError::Forbidden(
                "Only a manager of the branch can add tables".to_string(),
            ));
        }

        let table = sqlx::query_as::<_, Table>(&format!(
            r#"
            INSERT INTO tables (id, number, branch_id, seats, status, created_by)
            VALUES ($1, $2, $3, $4, 'available', $5)
            RETURNING {}
            "#,
            TABLE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.number)
        .bind(branch_id)
        .bind(input.seats)
        .bind(user.user_id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("Table {} already exists", input.number))
            }
            other => other,
        })?;

        tracing::info!(table_id = %table.id, number = table.number, "Table created");
        Ok(table)
    }
}
