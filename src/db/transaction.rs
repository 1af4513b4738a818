/*!
 * Transaction Helper Utilities
 *
 * Scoped transactions that keep the caller's `ServiceError` classification intact
 */

use crate::errors::ServiceError;
use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionError, TransactionTrait};
use tracing::{debug, warn};
use uuid::Uuid;

/// Boxed future returned by transaction closures
pub use futures::future::BoxFuture;

/// Execute a function within a database transaction
///
/// Commits when the closure returns `Ok`, rolls back on `Err` (or if the
/// future is dropped). Errors raised inside the closure come back unchanged,
/// so an `InsufficientStock` stays an `InsufficientStock`.
///
/// # Example
///
/// ```rust,ignore
/// use labstock::db::with_transaction;
///
/// let movement = with_transaction(&db, |txn| {
///     Box::pin(async move {
///         item::Entity::update_many() /* ... */ .exec(txn).await?;
///         Ok(movement_row.insert(txn).await?)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T>(db: &DatabaseConnection, f: F) -> Result<T, ServiceError>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, ServiceError>> + Send,
    T: Send,
{
    let transaction_id = Uuid::new_v4();
    let start = std::time::Instant::now();

    debug!(transaction_id = %transaction_id, "Starting database transaction");
    counter!("labstock_db.transaction.started", 1);

    let result = db.transaction(f).await;

    let elapsed = start.elapsed();
    histogram!("labstock_db.transaction.duration", elapsed);

    match &result {
        Ok(_) => {
            counter!("labstock_db.transaction.committed", 1);
            debug!(transaction_id = %transaction_id, "Transaction committed in {:?}", elapsed);
        }
        Err(e) => {
            counter!("labstock_db.transaction.rolled_back", 1);
            warn!(transaction_id = %transaction_id, error = %e, "Transaction rolled back after {:?}", elapsed);
        }
    }

    result.map_err(|e| match e {
        TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
        TransactionError::Transaction(err) => err,
    })
}
