//! HTTP handlers for the stock ledger endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::inventory::{
    AdjustStockInput, BartenderStockView, BranchQuery, InventoryService, ReceiveStockInput,
    StockMovement, StockView, TransactionQuery, TransferStockInput,
};
use crate::AppState;
use shared::InventoryTransaction;

/// Receive the first stock of a product into a branch store
pub async fn receive_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ReceiveStockInput>,
) -> AppResult<(StatusCode, Json<StockView>)> {
    let service = InventoryService::new(state.db);
    let stock = service.receive_stock(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(stock)))
}

/// Store balances of a branch
pub async fn list_stocks(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<BranchQuery>,
) -> AppResult<Json<Vec<StockView>>> {
    let service = InventoryService::new(state.db);
    let stocks = service.list_stocks(&current_user.0, query.branch_id).await?;
    Ok(Json(stocks))
}

/// Store balances at or below their threshold
pub async fn running_out(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<BranchQuery>,
) -> AppResult<Json<Vec<StockView>>> {
    let service = InventoryService::new(state.db);
    let stocks = service.running_out(&current_user.0, query.branch_id).await?;
    Ok(Json(stocks))
}

/// Restock or adjust a store balance
pub async fn adjust_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(stock_id): Path<Uuid>,
    Json(input): Json<AdjustStockInput>,
) -> AppResult<Json<StockView>> {
    let service = InventoryService::new(state.db);
    let stock = service.adjust(&current_user.0, stock_id, input).await?;
    Ok(Json(stock))
}

/// Move stock from the store to a bartender directly
pub async fn transfer_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<TransferStockInput>,
) -> AppResult<(StatusCode, Json<StockMovement>)> {
    let service = InventoryService::new(state.db);
    let movement = service.transfer(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// Bartender balances
pub async fn list_bartender_stocks(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<BranchQuery>,
) -> AppResult<Json<Vec<BartenderStockView>>> {
    let service = InventoryService::new(state.db);
    let stocks = service
        .bartender_stocks(&current_user.0, query.branch_id)
        .await?;
    Ok(Json(stocks))
}

/// Ledger entries of a branch
pub async fn list_transactions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<TransactionQuery>,
) -> AppResult<Json<Vec<InventoryTransaction>>> {
    let service = InventoryService::new(state.db);
    let transactions = service.list_transactions(&current_user.0, query).await?;
    Ok(Json(transactions))
}
