//! HTTP handlers for transfer requests

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::transfer::{
    CreateTransferInput, TransferQuery, TransferResult, TransferService, UpdateTransferInput,
};
use crate::AppState;
use shared::TransferRequest;

/// Create a transfer request
pub async fn create_transfer_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateTransferInput>,
) -> AppResult<(StatusCode, Json<TransferRequest>)> {
    let service = TransferService::new(state.db);
    let request = service.create(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_transfer_requests(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<TransferQuery>,
) -> AppResult<Json<Vec<TransferRequest>>> {
    let service = TransferService::new(state.db);
    let requests = service.list(&current_user.0, query).await?;
    Ok(Json(requests))
}

pub async fn get_transfer_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<TransferRequest>> {
    let service = TransferService::new(state.db);
    let request = service.get(&current_user.0, request_id).await?;
    Ok(Json(request))
}

/// Accept, reject, mark reached or cancel a request
pub async fn update_transfer_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(request_id): Path<Uuid>,
    Json(input): Json<UpdateTransferInput>,
) -> AppResult<Json<TransferResult>> {
    let service = TransferService::new(state.db);
    let result = service
        .update_status(&current_user.0, request_id, input)
        .await?;
    Ok(Json(result))
}
