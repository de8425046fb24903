//! HTTP handlers for payments

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::payment::{PaymentService, SettlePaymentInput};
use crate::AppState;
use shared::Payment;

/// Settle an order
pub async fn settle_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<SettlePaymentInput>,
) -> AppResult<(StatusCode, Json<Payment>)> {
    let service = PaymentService::new(state.db);
    let payment = service.settle(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Payment>> {
    let service = PaymentService::new(state.db);
    let payment = service.get(&current_user.0, order_id).await?;
    Ok(Json(payment))
}
