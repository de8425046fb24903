//! Stock ledger service: store and bartender balances plus the append-only
//! transaction log
//!
//! Every balance change goes through this module, and every change appends
//! exactly one `inventory_transactions` row in the same database transaction.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{begin_serializable, with_serializable_retry};
use super::unit::load_graph;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use shared::{
    transfer_between, validate_positive_qty, validate_threshold, Adjustment, BartenderStock,
    Caller, ConversionGraph, InventoryTransaction, NewInventoryTransaction, Product, Role, Stock,
    StockDisplay, StockLevel, TransactionEndpoints, TransactionKind,
};

/// Stock ledger service
#[derive(Clone)]
pub struct InventoryService {
    db: PgPool,
}

const STOCK_COLUMNS: &str = "id, product_id, branch_id, qty_in_base_units, min_threshold_base_units, \
     original_qty, original_unit_id, initial_qty, initial_unit_id, running_out, created_at, updated_at";

const BARTENDER_STOCK_COLUMNS: &str = "id, stock_id, bartender_id, qty_in_base_units, original_qty, \
     original_unit_id, min_threshold_base_units, running_out, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, product_id, branch_id, kind, qty, qty_unit_id, qty_in_base_units, \
     from_stock_id, to_stock_id, from_bartender_stock_id, to_bartender_stock_id, initiator_id, \
     price_at_time, notes, created_at";

/// A store balance with its presentation tuple
#[derive(Debug, Serialize)]
pub struct StockView {
    #[serde(flatten)]
    pub stock: Stock,
    pub product_name: String,
    pub display: StockDisplay,
}

/// A bartender balance with its presentation tuple
#[derive(Debug, Serialize)]
pub struct BartenderStockView {
    #[serde(flatten)]
    pub stock: BartenderStock,
    pub product_id: Uuid,
    pub product_name: String,
    pub display: StockDisplay,
}

/// First receipt of a product into a branch
#[derive(Debug, Deserialize)]
pub struct ReceiveStockInput {
    pub product_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub qty: Decimal,
    pub unit_id: Uuid,
    #[serde(default)]
    pub min_threshold_base_units: Decimal,
}

/// Manual change to a store balance
#[derive(Debug, Deserialize)]
pub struct AdjustStockInput {
    pub qty: Decimal,
    pub unit_id: Uuid,
    pub is_addition: bool,
    /// Recorded as a restock rather than a correction; additions only
    #[serde(default)]
    pub is_restock: bool,
    pub original_qty_delta: Option<Decimal>,
    pub min_threshold_base_units: Option<Decimal>,
    pub notes: Option<String>,
}

/// Direct store → bartender move made by a manager
#[derive(Debug, Deserialize)]
pub struct TransferStockInput {
    pub product_id: Uuid,
    pub bartender_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub qty: Decimal,
    pub unit_id: Uuid,
    pub notes: Option<String>,
}

/// Filters for the transaction log
#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub branch_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub kind: Option<TransactionKind>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BranchQuery {
    pub branch_id: Option<Uuid>,
}

/// Result of a store → bartender move
#[derive(Debug, Serialize)]
pub struct StockMovement {
    pub stock: Stock,
    pub bartender_stock: BartenderStock,
    pub transaction: InventoryTransaction,
}

// ============================================================================
// Ledger primitives, shared with the product, transfer and order services
// ============================================================================

/// Append one row to the transaction log
pub async fn append_transaction(
    conn: &mut PgConnection,
    new: NewInventoryTransaction,
) -> AppResult<InventoryTransaction> {
    new.validate()?;
    let e = new.endpoints;

    let transaction = sqlx::query_as::<_, InventoryTransaction>(&format!(
        r#"
        INSERT INTO inventory_transactions (
            id, product_id, branch_id, kind, qty, qty_unit_id, qty_in_base_units,
            from_stock_id, to_stock_id, from_bartender_stock_id, to_bartender_stock_id,
            initiator_id, price_at_time, notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING {}
        "#,
        TRANSACTION_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(new.product_id)
    .bind(new.branch_id)
    .bind(new.kind)
    .bind(new.qty)
    .bind(new.qty_unit_id)
    .bind(new.qty_in_base_units)
    .bind(e.from_stock_id)
    .bind(e.to_stock_id)
    .bind(e.from_bartender_stock_id)
    .bind(e.to_bartender_stock_id)
    .bind(new.initiator_id)
    .bind(new.price_at_time)
    .bind(&new.notes)
    .fetch_one(&mut *conn)
    .await?;

    Ok(transaction)
}

/// Create the stock row for a product's first receipt into a branch together
/// with its genesis restock transaction
#[allow(clippy::too_many_arguments)]
pub async fn initial_stock(
    conn: &mut PgConnection,
    product: &Product,
    graph: &ConversionGraph,
    branch_id: Uuid,
    qty: Decimal,
    unit_id: Uuid,
    min_threshold_base_units: Decimal,
    initiator_id: Uuid,
) -> AppResult<Stock> {
    validate_threshold(min_threshold_base_units)
        .map_err(|msg| AppError::validation("min_threshold_base_units", msg))?;
    let level = StockLevel::initial(graph, qty, unit_id, min_threshold_base_units)?;

    let stock = sqlx::query_as::<_, Stock>(&format!(
        r#"
        INSERT INTO stocks (
            id, product_id, branch_id, qty_in_base_units, min_threshold_base_units,
            original_qty, original_unit_id, initial_qty, initial_unit_id, running_out
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        STOCK_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(product.id)
    .bind(branch_id)
    .bind(level.qty_in_base_units)
    .bind(level.min_threshold_base_units)
    .bind(level.original_qty)
    .bind(level.original_unit_id)
    .bind(qty)
    .bind(unit_id)
    .bind(level.running_out())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::Conflict(format!(
            "{} is already stocked in this branch",
            product.name
        )),
        other => other,
    })?;

    // An empty first receipt has nothing to record
    if qty > Decimal::ZERO {
        append_transaction(
            conn,
            NewInventoryTransaction {
                product_id: product.id,
                branch_id,
                kind: TransactionKind::Restock,
                qty,
                qty_unit_id: unit_id,
                qty_in_base_units: level.qty_in_base_units,
                endpoints: TransactionEndpoints::restock(stock.id),
                initiator_id,
                price_at_time: Some(product.base_unit_price),
                notes: Some("Initial stock".to_string()),
            },
        )
        .await?;
    }

    tracing::info!(
        product_id = %product.id,
        branch_id = %branch_id,
        qty_in_base_units = %stock.qty_in_base_units,
        "Initial stock recorded"
    );
    Ok(stock)
}

/// Lock the store balance of a product in a branch
pub async fn lock_stock(
    conn: &mut PgConnection,
    product_id: Uuid,
    branch_id: Uuid,
) -> AppResult<Option<Stock>> {
    let stock = sqlx::query_as::<_, Stock>(&format!(
        "SELECT {} FROM stocks WHERE product_id = $1 AND branch_id = $2 FOR UPDATE",
        STOCK_COLUMNS
    ))
    .bind(product_id)
    .bind(branch_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(stock)
}

async fn lock_stock_by_id(conn: &mut PgConnection, stock_id: Uuid) -> AppResult<Stock> {
    sqlx::query_as::<_, Stock>(&format!(
        "SELECT {} FROM stocks WHERE id = $1 FOR UPDATE",
        STOCK_COLUMNS
    ))
    .bind(stock_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Stock".to_string()))
}

/// Lock a bartender's balance of `stock`
async fn lock_bartender_stock(
    conn: &mut PgConnection,
    stock_id: Uuid,
    bartender_id: Uuid,
) -> AppResult<Option<BartenderStock>> {
    let stock = sqlx::query_as::<_, BartenderStock>(&format!(
        "SELECT {} FROM bartender_stocks WHERE stock_id = $1 AND bartender_id = $2 FOR UPDATE",
        BARTENDER_STOCK_COLUMNS
    ))
    .bind(stock_id)
    .bind(bartender_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(stock)
}

/// Lock a bartender's balance, creating an empty one on first use
async fn lock_or_create_bartender_stock(
    conn: &mut PgConnection,
    stock: &Stock,
    bartender_id: Uuid,
) -> AppResult<BartenderStock> {
    sqlx::query(
        r#"
        INSERT INTO bartender_stocks (
            id, stock_id, bartender_id, qty_in_base_units, original_qty, original_unit_id,
            min_threshold_base_units, running_out
        )
        VALUES ($1, $2, $3, 0, 0, $4, $5, true)
        ON CONFLICT (stock_id, bartender_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(stock.id)
    .bind(bartender_id)
    .bind(stock.original_unit_id)
    .bind(stock.min_threshold_base_units)
    .execute(&mut *conn)
    .await?;

    lock_bartender_stock(conn, stock.id, bartender_id)
        .await?
        .ok_or_else(|| AppError::Internal("Bartender stock vanished after insert".to_string()))
}

async fn save_stock(conn: &mut PgConnection, stock: &Stock) -> AppResult<Stock> {
    let saved = sqlx::query_as::<_, Stock>(&format!(
        r#"
        UPDATE stocks
        SET qty_in_base_units = $2, min_threshold_base_units = $3, original_qty = $4,
            original_unit_id = $5, running_out = $6, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        STOCK_COLUMNS
    ))
    .bind(stock.id)
    .bind(stock.qty_in_base_units)
    .bind(stock.min_threshold_base_units)
    .bind(stock.original_qty)
    .bind(stock.original_unit_id)
    .bind(stock.running_out)
    .fetch_one(&mut *conn)
    .await?;
    Ok(saved)
}

async fn save_bartender_stock(
    conn: &mut PgConnection,
    stock: &BartenderStock,
) -> AppResult<BartenderStock> {
    let saved = sqlx::query_as::<_, BartenderStock>(&format!(
        r#"
        UPDATE bartender_stocks
        SET qty_in_base_units = $2, min_threshold_base_units = $3, original_qty = $4,
            original_unit_id = $5, running_out = $6, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        BARTENDER_STOCK_COLUMNS
    ))
    .bind(stock.id)
    .bind(stock.qty_in_base_units)
    .bind(stock.min_threshold_base_units)
    .bind(stock.original_qty)
    .bind(stock.original_unit_id)
    .bind(stock.running_out)
    .fetch_one(&mut *conn)
    .await?;
    Ok(saved)
}

/// Move stock from the store to a bartender: both balances change and one
/// `store_to_bartender` transaction is appended, or nothing happens
#[allow(clippy::too_many_arguments)]
pub async fn move_to_bartender(
    conn: &mut PgConnection,
    product_id: Uuid,
    branch_id: Uuid,
    bartender_id: Uuid,
    qty: Decimal,
    unit_id: Uuid,
    initiator_id: Uuid,
    notes: Option<String>,
) -> AppResult<StockMovement> {
    validate_positive_qty(qty).map_err(|msg| AppError::validation("qty", msg))?;
    let (product, graph) = load_graph(&mut *conn, product_id).await?;

    let mut stock = lock_stock(&mut *conn, product_id, branch_id)
        .await?
        .ok_or_else(|| AppError::InsufficientStock {
            product: product.name.clone(),
            requested: graph.to_base(qty, unit_id).unwrap_or(qty),
            available: Decimal::ZERO,
        })?;
    let mut bartender_stock = lock_or_create_bartender_stock(&mut *conn, &stock, bartender_id).await?;

    let mut from = stock.level();
    let mut to = bartender_stock.level();
    let moved = transfer_between(&mut from, &mut to, &graph, qty, unit_id)?;
    stock.apply_level(from);
    bartender_stock.apply_level(to);

    let stock = save_stock(&mut *conn, &stock).await?;
    let bartender_stock = save_bartender_stock(&mut *conn, &bartender_stock).await?;

    let transaction = append_transaction(
        conn,
        NewInventoryTransaction {
            product_id,
            branch_id,
            kind: TransactionKind::StoreToBartender,
            qty,
            qty_unit_id: unit_id,
            qty_in_base_units: moved,
            endpoints: TransactionEndpoints::store_to_bartender(stock.id, bartender_stock.id),
            initiator_id,
            price_at_time: Some(product.base_unit_price),
            notes,
        },
    )
    .await?;

    if stock.running_out {
        tracing::warn!(product_id = %product_id, branch_id = %branch_id, "Store stock running out");
    }
    tracing::info!(
        product_id = %product_id,
        bartender_id = %bartender_id,
        qty_in_base_units = %moved,
        "Stock moved to bartender"
    );

    Ok(StockMovement {
        stock,
        bartender_stock,
        transaction,
    })
}

/// Draw `quantity` sales units of a product from a bartender's balance and
/// append one `sale` transaction
pub async fn consume_sale(
    conn: &mut PgConnection,
    product_id: Uuid,
    branch_id: Uuid,
    bartender_id: Uuid,
    quantity: i32,
    unit_price: Decimal,
    notes: String,
) -> AppResult<InventoryTransaction> {
    let (product, graph) = load_graph(&mut *conn, product_id).await?;
    let qty = Decimal::from(quantity);
    let unit_id = graph.default_sales_unit_id();
    let requested = graph.to_base(qty, unit_id)?;
    let insufficient = |available| AppError::InsufficientStock {
        product: product.name.clone(),
        requested,
        available,
    };

    let stock = lock_stock(&mut *conn, product_id, branch_id)
        .await?
        .ok_or_else(|| insufficient(Decimal::ZERO))?;
    let mut bartender_stock = lock_bartender_stock(&mut *conn, stock.id, bartender_id)
        .await?
        .ok_or_else(|| insufficient(Decimal::ZERO))?;

    let mut level = bartender_stock.level();
    let outcome = level.adjust(&graph, &Adjustment::remove(qty, unit_id))?;
    if outcome.original_recomputed {
        tracing::debug!(bartender_stock_id = %bartender_stock.id, "original_qty back-converted");
    }
    bartender_stock.apply_level(level);
    let bartender_stock = save_bartender_stock(&mut *conn, &bartender_stock).await?;

    let transaction = append_transaction(
        conn,
        NewInventoryTransaction {
            product_id,
            branch_id,
            kind: TransactionKind::Sale,
            qty,
            qty_unit_id: unit_id,
            qty_in_base_units: outcome.qty_in_base_units,
            endpoints: TransactionEndpoints::bartender_sale(bartender_stock.id),
            initiator_id: bartender_id,
            price_at_time: Some(unit_price),
            notes: Some(notes),
        },
    )
    .await?;

    if bartender_stock.running_out {
        tracing::warn!(
            product_id = %product_id,
            bartender_id = %bartender_id,
            "Bartender stock running out"
        );
    }
    Ok(transaction)
}

// ============================================================================
// Service surface
// ============================================================================

impl InventoryService {
    /// Create a new InventoryService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a product's first receipt into a branch
    pub async fn receive_stock(&self, user: &AuthUser, input: ReceiveStockInput) -> AppResult<StockView> {
        let branch_id = user.resolve_branch(input.branch_id)?;
        require_manager(user, branch_id)?;
        let input = &input;
        with_serializable_retry(move || self.receive_stock_once(user, branch_id, input)).await
    }

    async fn receive_stock_once(
        &self,
        user: &AuthUser,
        branch_id: Uuid,
        input: &ReceiveStockInput,
    ) -> AppResult<StockView> {
        let mut tx = begin_serializable(&self.db).await?;
        let (product, graph) = load_graph(&mut *tx, input.product_id).await?;
        let stock = initial_stock(
            &mut *tx,
            &product,
            &graph,
            branch_id,
            input.qty,
            input.unit_id,
            input.min_threshold_base_units,
            user.user_id,
        )
        .await?;
        tx.commit().await?;

        Ok(StockView {
            display: stock.display(&graph),
            product_name: product.name,
            stock,
        })
    }

    /// Store balances of a branch
    pub async fn list_stocks(&self, user: &AuthUser, branch_id: Option<Uuid>) -> AppResult<Vec<StockView>> {
        let branch_id = user.resolve_branch(branch_id)?;
        let stocks = sqlx::query_as::<_, Stock>(&format!(
            "SELECT {} FROM stocks WHERE branch_id = $1 ORDER BY created_at",
            STOCK_COLUMNS
        ))
        .bind(branch_id)
        .fetch_all(&self.db)
        .await?;
        self.stock_views(stocks).await
    }

    /// Store balances at or below their threshold
    pub async fn running_out(&self, user: &AuthUser, branch_id: Option<Uuid>) -> AppResult<Vec<StockView>> {
        let branch_id = user.resolve_branch(branch_id)?;
        let stocks = sqlx::query_as::<_, Stock>(&format!(
            "SELECT {} FROM stocks WHERE branch_id = $1 AND running_out = true ORDER BY qty_in_base_units",
            STOCK_COLUMNS
        ))
        .bind(branch_id)
        .fetch_all(&self.db)
        .await?;
        self.stock_views(stocks).await
    }

    /// Add to or remove from a store balance
    pub async fn adjust(
        &self,
        user: &AuthUser,
        stock_id: Uuid,
        input: AdjustStockInput,
    ) -> AppResult<StockView> {
        if input.is_restock && !input.is_addition {
            return Err(AppError::validation(
                "is_restock",
                "A restock can only add stock",
            ));
        }
        if let Some(threshold) = input.min_threshold_base_units {
            validate_threshold(threshold)
                .map_err(|msg| AppError::validation("min_threshold_base_units", msg))?;
        }
        let input = &input;
        with_serializable_retry(move || self.adjust_once(user, stock_id, input)).await
    }

    async fn adjust_once(
        &self,
        user: &AuthUser,
        stock_id: Uuid,
        input: &AdjustStockInput,
    ) -> AppResult<StockView> {
        let mut tx = begin_serializable(&self.db).await?;
        let mut stock = lock_stock_by_id(&mut *tx, stock_id).await?;
        require_manager(user, stock.branch_id)?;
        let (product, graph) = load_graph(&mut *tx, stock.product_id).await?;

        let mut level = stock.level();
        if let Some(threshold) = input.min_threshold_base_units {
            level.min_threshold_base_units = threshold;
        }
        let adjustment = Adjustment {
            qty: input.qty,
            unit_id: input.unit_id,
            is_addition: input.is_addition,
            original_qty_delta: input.original_qty_delta,
        };
        let outcome = level.adjust(&graph, &adjustment)?;
        if outcome.original_recomputed {
            tracing::debug!(stock_id = %stock.id, "original_qty back-converted");
        }
        stock.apply_level(level);
        let stock = save_stock(&mut *tx, &stock).await?;

        let kind = if input.is_restock {
            TransactionKind::Restock
        } else {
            TransactionKind::Adjustment
        };
        append_transaction(
            &mut *tx,
            NewInventoryTransaction {
                product_id: product.id,
                branch_id: stock.branch_id,
                kind,
                qty: input.qty,
                qty_unit_id: input.unit_id,
                qty_in_base_units: outcome.qty_in_base_units,
                endpoints: TransactionEndpoints::adjustment(stock.id, input.is_addition),
                initiator_id: user.user_id,
                price_at_time: Some(product.base_unit_price),
                notes: input.notes.clone(),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            stock_id = %stock.id,
            product_id = %product.id,
            kind = kind.as_str(),
            is_addition = input.is_addition,
            qty_in_base_units = %outcome.qty_in_base_units,
            "Stock adjusted"
        );

        Ok(StockView {
            display: stock.display(&graph),
            product_name: product.name,
            stock,
        })
    }

    /// Move stock straight from the store to a bartender
    pub async fn transfer(&self, user: &AuthUser, input: TransferStockInput) -> AppResult<StockMovement> {
        let branch_id = user.resolve_branch(input.branch_id)?;
        require_manager(user, branch_id)?;
        let input = &input;
        with_serializable_retry(move || self.transfer_once(user, branch_id, input)).await
    }

    async fn transfer_once(
        &self,
        user: &AuthUser,
        branch_id: Uuid,
        input: &TransferStockInput,
    ) -> AppResult<StockMovement> {
        let mut tx = begin_serializable(&self.db).await?;
        let bartender_branch: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT branch_id FROM users WHERE id = $1 AND role = 'bartender'")
                .bind(input.bartender_id)
                .fetch_optional(&mut *tx)
                .await?;
        match bartender_branch {
            None => return Err(AppError::NotFound("Bartender".to_string())),
            Some(branch) if branch != Some(branch_id) => {
                return Err(AppError::validation(
                    "bartender_id",
                    "Bartender works in another branch",
                ))
            }
            Some(_) => {}
        }

        let movement = move_to_bartender(
            &mut *tx,
            input.product_id,
            branch_id,
            input.bartender_id,
            input.qty,
            input.unit_id,
            user.user_id,
            input.notes.clone(),
        )
        .await?;
        tx.commit().await?;
        Ok(movement)
    }

    /// A bartender's own balances, or every bartender's balances of a branch
    /// for managers
    pub async fn bartender_stocks(
        &self,
        user: &AuthUser,
        branch_id: Option<Uuid>,
    ) -> AppResult<Vec<BartenderStockView>> {
        let branch_id = user.resolve_branch(branch_id)?;
        let only_bartender = match user.role {
            Role::Bartender => Some(user.user_id),
            _ if user.manages_branch(branch_id) => None,
            _ => {
                return Err(AppError::Forbidden(
                    "Only bartenders and managers can view bartender stock".to_string(),
                ))
            }
        };

        let stocks = sqlx::query_as::<_, BartenderStock>(
            r#"
            SELECT bs.id, bs.stock_id, bs.bartender_id, bs.qty_in_base_units, bs.original_qty,
                   bs.original_unit_id, bs.min_threshold_base_units, bs.running_out,
                   bs.created_at, bs.updated_at
            FROM bartender_stocks bs
            JOIN stocks s ON s.id = bs.stock_id
            WHERE s.branch_id = $1
              AND ($2::uuid IS NULL OR bs.bartender_id = $2)
            ORDER BY bs.created_at
            "#,
        )
        .bind(branch_id)
        .bind(only_bartender)
        .fetch_all(&self.db)
        .await?;

        let product_ids: HashMap<Uuid, Uuid> = sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT id, product_id FROM stocks WHERE branch_id = $1",
        )
        .bind(branch_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .collect();

        let mut conn = self.db.acquire().await?;
        let mut graphs: HashMap<Uuid, (Product, ConversionGraph)> = HashMap::new();
        let mut views = Vec::with_capacity(stocks.len());
        for stock in stocks {
            let product_id = product_ids
                .get(&stock.stock_id)
                .copied()
                .ok_or_else(|| AppError::NotFound("Stock".to_string()))?;
            if !graphs.contains_key(&product_id) {
                let loaded = load_graph(&mut *conn, product_id).await?;
                graphs.insert(product_id, loaded);
            }
            if let Some((product, graph)) = graphs.get(&product_id) {
                views.push(BartenderStockView {
                    display: stock.display(graph),
                    product_id,
                    product_name: product.name.clone(),
                    stock,
                });
            }
        }
        Ok(views)
    }

    /// Recent transactions of a branch, newest first
    pub async fn list_transactions(
        &self,
        user: &AuthUser,
        query: TransactionQuery,
    ) -> AppResult<Vec<InventoryTransaction>> {
        let branch_id = user.resolve_branch(query.branch_id)?;
        let limit = query.limit.unwrap_or(100).clamp(1, 500);

        let transactions = sqlx::query_as::<_, InventoryTransaction>(&format!(
            r#"
            SELECT {}
            FROM inventory_transactions
            WHERE branch_id = $1
              AND ($2::uuid IS NULL OR product_id = $2)
              AND ($3::varchar IS NULL OR kind = $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(branch_id)
        .bind(query.product_id)
        .bind(query.kind)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(transactions)
    }

    async fn stock_views(&self, stocks: Vec<Stock>) -> AppResult<Vec<StockView>> {
        let mut conn = self.db.acquire().await?;
        let mut graphs: HashMap<Uuid, (Product, ConversionGraph)> = HashMap::new();
        let mut views = Vec::with_capacity(stocks.len());
        for stock in stocks {
            if !graphs.contains_key(&stock.product_id) {
                let loaded = load_graph(&mut *conn, stock.product_id).await?;
                graphs.insert(stock.product_id, loaded);
            }
            if let Some((product, graph)) = graphs.get(&stock.product_id) {
                views.push(StockView {
                    display: stock.display(graph),
                    product_name: product.name.clone(),
                    stock,
                });
            }
        }
        Ok(views)
    }
}

fn require_manager(user: &AuthUser, branch_id: Uuid) -> AppResult<()> {
    if user.manages_branch(branch_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only a manager of the branch can change store stock".to_string(),
        ))
    }
}
