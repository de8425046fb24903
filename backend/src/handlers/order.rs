//! HTTP handlers for orders, order items and the waiter permission matrix

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::order::{
    CreateOrderInput, OrderQuery, OrderWithItems, PaymentOptionInput, UpdateItemStatusInput,
};
use crate::services::order_update::EditOrderInput;
use crate::services::{OrderService, OrderUpdateService};
use crate::AppState;
use shared::{Order, OrderDisplay, OrderUpdate, PaginatedResponse, Station, WaiterActions};

#[derive(Debug, Default, Deserialize)]
pub struct StationQuery {
    pub branch_id: Option<Uuid>,
}

fn order_service(state: AppState) -> OrderService {
    OrderService::new(state.db, &state.config, state.notifications)
}

/// Place an order on a table
pub async fn create_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateOrderInput>,
) -> AppResult<(StatusCode, Json<OrderWithItems>)> {
    let order = order_service(state).create(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<OrderQuery>,
) -> AppResult<Json<PaginatedResponse<Order>>> {
    let orders = order_service(state).list(&current_user.0, query).await?;
    Ok(Json(orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderWithItems>> {
    let order = order_service(state).get(&current_user.0, order_id).await?;
    Ok(Json(order))
}

/// Waiter edit of an existing order
pub async fn edit_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<EditOrderInput>,
) -> AppResult<Json<OrderWithItems>> {
    let service = OrderUpdateService::new(state.db, state.notifications);
    let order = service.edit(&current_user.0, order_id, input).await?;
    Ok(Json(order))
}

/// Accepted and pending items side by side, with the update log
pub async fn get_order_display(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDisplay>> {
    let service = OrderUpdateService::new(state.db, state.notifications);
    let display = service.display(&current_user.0, order_id).await?;
    Ok(Json(display))
}

pub async fn list_order_updates(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Vec<OrderUpdate>>> {
    let service = OrderUpdateService::new(state.db, state.notifications);
    let updates = service.list_updates(&current_user.0, order_id).await?;
    Ok(Json(updates))
}

/// Mark the bill as printed
pub async fn print_bill(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    let order = order_service(state)
        .print_bill(&current_user.0, order_id)
        .await?;
    Ok(Json(order))
}

pub async fn set_payment_option(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<PaymentOptionInput>,
) -> AppResult<Json<Order>> {
    let order = order_service(state)
        .set_payment_option(&current_user.0, order_id, input)
        .await?;
    Ok(Json(order))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderWithItems>> {
    let order = order_service(state).cancel(&current_user.0, order_id).await?;
    Ok(Json(order))
}

pub async fn delete_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    order_service(state).delete(&current_user.0, order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Food station queue
pub async fn food_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<StationQuery>,
) -> AppResult<Json<Vec<OrderWithItems>>> {
    let orders = order_service(state)
        .station_orders(&current_user.0, Station::Food, query.branch_id)
        .await?;
    Ok(Json(orders))
}

/// Beverage station queue
pub async fn beverage_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<StationQuery>,
) -> AppResult<Json<Vec<OrderWithItems>>> {
    let orders = order_service(state)
        .station_orders(&current_user.0, Station::Beverage, query.branch_id)
        .await?;
    Ok(Json(orders))
}

/// Accept, reject or cancel a single item
pub async fn update_item_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdateItemStatusInput>,
) -> AppResult<Json<OrderWithItems>> {
    let order = order_service(state)
        .update_item_status(&current_user.0, item_id, input)
        .await?;
    Ok(Json(order))
}

pub async fn get_waiter_actions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<WaiterActions>> {
    let actions = order_service(state)
        .waiter_actions(&current_user.0, order_id)
        .await?;
    Ok(Json(actions))
}
