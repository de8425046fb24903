//! Business logic services for the butchery point-of-sale platform

pub mod auth;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod order_update;
pub mod payment;
pub mod product;
pub mod table;
pub mod transfer;
pub mod unit;

pub use auth::AuthService;
pub use inventory::InventoryService;
pub use notification::NotificationHub;
pub use order::OrderService;
pub use order_update::OrderUpdateService;
pub use payment::PaymentService;
pub use product::ProductService;
pub use table::TableService;
pub use transfer::TransferService;
pub use unit::UnitService;

use std::future::Future;
use std::time::Duration;

use sqlx::{PgPool, Postgres, Transaction};

use crate::error::AppResult;

/// Runs of one serializable transaction before a collision reaches the caller
const MAX_TX_ATTEMPTS: u32 = 8;

/// Pause before the first rerun; grows linearly with each attempt
const RETRY_DELAY: Duration = Duration::from_millis(5);

/// Open a transaction for a multi-row write. Every read-modify-write in the
/// services runs inside one of these.
pub async fn begin_serializable(db: &PgPool) -> AppResult<Transaction<'static, Postgres>> {
    let mut tx = db.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Run `operation` and rerun it from scratch while Postgres reports a
/// serialization failure or deadlock. `operation` must open its own
/// transaction so every attempt starts from a fresh snapshot.
pub async fn with_serializable_retry<F, Fut, T>(mut operation: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match operation().await {
            Err(err) if err.is_retryable() && attempts < MAX_TX_ATTEMPTS => {
                tracing::debug!(attempts, "Serialization failure, rerunning transaction");
                tokio::time::sleep(RETRY_DELAY * attempts).await;
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(attempts, "Giving up on transaction after repeated collisions");
                return Err(err);
            }
            result => return result,
        }
    }
}
