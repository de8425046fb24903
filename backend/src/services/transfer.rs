//! Transfer request service: a bartender's claim on store stock
//!
//! Stock only moves when the requester marks the request as reached. That
//! step runs under a row lock on the request and checks the ledger for the
//! fulfilment marker, so it appends at most one transaction per request.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{begin_serializable, with_serializable_retry};
use super::inventory::move_to_bartender;
use super::unit::load_graph;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use shared::{
    check_can_request, validate_positive_qty, Caller, Fulfilment, Role, TransferAction,
    TransferOutcome, TransferRequest, TransferStatus,
};

/// Transfer request service
#[derive(Clone)]
pub struct TransferService {
    db: PgPool,
}

const REQUEST_COLUMNS: &str = "id, product_id, qty, qty_unit_id, status, requester_id, responder_id, \
     branch_id, created_at, responded_at, reached_status, notes";

/// Input for creating a transfer request
#[derive(Debug, Deserialize)]
pub struct CreateTransferInput {
    pub product_id: Uuid,
    pub qty: Decimal,
    pub qty_unit_id: Uuid,
    pub notes: Option<String>,
}

/// Requested status change
#[derive(Debug, Deserialize)]
pub struct UpdateTransferInput {
    pub status: TransferStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransferQuery {
    pub status: Option<TransferStatus>,
    pub branch_id: Option<Uuid>,
}

/// A request after a transition, with the ledger row it produced if any
#[derive(Debug, Serialize)]
pub struct TransferResult {
    #[serde(flatten)]
    pub request: TransferRequest,
    pub transaction_id: Option<Uuid>,
}

impl TransferService {
    /// Create a new TransferService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// A bartender asks the store for stock
    pub async fn create(&self, user: &AuthUser, input: CreateTransferInput) -> AppResult<TransferRequest> {
        let branch_id = user.branch_id.ok_or_else(|| {
            AppError::Forbidden("Only bartenders can request stock transfers".to_string())
        })?;
        check_can_request(user, branch_id)?;
        validate_positive_qty(input.qty).map_err(|msg| AppError::validation("qty", msg))?;

        let mut conn = self.db.acquire().await?;
        // Refuse units the product cannot be counted in before anyone reviews it
        let (product, graph) = load_graph(&mut *conn, input.product_id).await?;
        graph.to_base(input.qty, input.qty_unit_id)?;
        if !product.is_active {
            return Err(AppError::validation("product_id", "Product is no longer active"));
        }

        let request = sqlx::query_as::<_, TransferRequest>(&format!(
            r#"
            INSERT INTO transfer_requests
                (id, product_id, qty, qty_unit_id, status, requester_id, branch_id, notes)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7)
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.product_id)
        .bind(input.qty)
        .bind(input.qty_unit_id)
        .bind(user.user_id)
        .bind(branch_id)
        .bind(&input.notes)
        .fetch_one(&mut *conn)
        .await?;

        tracing::info!(
            request_id = %request.id,
            product_id = %request.product_id,
            qty = %request.qty,
            "Transfer requested"
        );
        Ok(request)
    }

    /// Bartenders see their own requests; managers see their branch
    pub async fn list(&self, user: &AuthUser, query: TransferQuery) -> AppResult<Vec<TransferRequest>> {
        let branch_id = user.resolve_branch(query.branch_id)?;
        let requester = match user.role {
            Role::Bartender => Some(user.user_id),
            _ if user.manages_branch(branch_id) => None,
            _ => {
                return Err(AppError::Forbidden(
                    "Only bartenders and managers can view transfer requests".to_string(),
                ))
            }
        };

        let requests = sqlx::query_as::<_, TransferRequest>(&format!(
            r#"
            SELECT {}
            FROM transfer_requests
            WHERE branch_id = $1
              AND ($2::uuid IS NULL OR requester_id = $2)
              AND ($3::varchar IS NULL OR status = $3)
            ORDER BY created_at DESC
            "#,
            REQUEST_COLUMNS
        ))
        .bind(branch_id)
        .bind(requester)
        .bind(query.status)
        .fetch_all(&self.db)
        .await?;
        Ok(requests)
    }

    pub async fn get(&self, user: &AuthUser, request_id: Uuid) -> AppResult<TransferRequest> {
        let request = sqlx::query_as::<_, TransferRequest>(&format!(
            "SELECT {} FROM transfer_requests WHERE id = $1",
            REQUEST_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Transfer request".to_string()))?;

        let visible = if user.role == Role::Bartender {
            request.requester_id == user.user_id
        } else {
            user.in_branch(request.branch_id)
        };
        if !visible {
            return Err(AppError::Forbidden(
                "Transfer request belongs to someone else".to_string(),
            ));
        }
        Ok(request)
    }

    /// Accept, reject, mark reached or cancel a request
    ///
    /// A caller that loses a race against the same transition is rerun and
    /// sees the request already in its target state.
    pub async fn update_status(
        &self,
        user: &AuthUser,
        request_id: Uuid,
        input: UpdateTransferInput,
    ) -> AppResult<TransferResult> {
        let action = TransferAction::from_status(input.status, input.reason)?;
        let action = &action;
        with_serializable_retry(move || self.update_status_once(user, request_id, action)).await
    }

    async fn update_status_once(
        &self,
        user: &AuthUser,
        request_id: Uuid,
        action: &TransferAction,
    ) -> AppResult<TransferResult> {
        let mut tx = begin_serializable(&self.db).await?;
        let mut request = sqlx::query_as::<_, TransferRequest>(&format!(
            "SELECT {} FROM transfer_requests WHERE id = $1 FOR UPDATE",
            REQUEST_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Transfer request".to_string()))?;

        let status = match request.check_transition(user, action)? {
            TransferOutcome::Unchanged => {
                tx.commit().await?;
                tracing::debug!(request_id = %request.id, "Transfer already in requested state");
                return Ok(TransferResult {
                    request,
                    transaction_id: None,
                });
            }
            TransferOutcome::MoveTo(status) => status,
        };

        let mut transaction_id = None;
        if *action == TransferAction::MarkReached {
            transaction_id = fulfil(&mut *tx, &request, user.user_id).await?;
        }
        if let TransferAction::Reject {
            reason: Some(reason),
        } = action
        {
            request.record_rejection(reason);
        }

        request.apply(status, Some(user.user_id), Utc::now());
        let request = sqlx::query_as::<_, TransferRequest>(&format!(
            r#"
            UPDATE transfer_requests
            SET status = $2, responder_id = $3, responded_at = $4, reached_status = $5, notes = $6
            WHERE id = $1
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        ))
        .bind(request.id)
        .bind(request.status)
        .bind(request.responder_id)
        .bind(request.responded_at)
        .bind(request.reached_status)
        .bind(&request.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            request_id = %request.id,
            status = request.status.as_str(),
            actor = %user.user_id,
            "Transfer request updated"
        );
        Ok(TransferResult {
            request,
            transaction_id,
        })
    }
}

/// Move the requested stock unless the ledger already records this request
async fn fulfil(
    conn: &mut PgConnection,
    request: &TransferRequest,
    initiator_id: Uuid,
) -> AppResult<Option<Uuid>> {
    let notes: Vec<String> = sqlx::query_scalar(
        "SELECT notes FROM inventory_transactions WHERE notes LIKE '%' || $1 || '%'",
    )
    .bind(request.id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let marker = match request.fulfilment(notes.iter().map(String::as_str)) {
        Fulfilment::MoveStock { marker } => marker,
        Fulfilment::AlreadyRecorded => {
            tracing::warn!(request_id = %request.id, "Fulfilment already recorded, not moving stock again");
            return Ok(None);
        }
    };

    let movement = move_to_bartender(
        conn,
        request.product_id,
        request.branch_id,
        request.requester_id,
        request.qty,
        request.qty_unit_id,
        initiator_id,
        Some(marker),
    )
    .await?;
    Ok(Some(movement.transaction.id))
}
