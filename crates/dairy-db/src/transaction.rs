//! # Transaction Runner
//!
//! All-or-nothing execution of multi-write workflows.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  caller ──► run_in_transaction ──► tokio::spawn ─┐                      │
//! │                                                  ▼                      │
//! │                           BEGIN IMMEDIATE ─► work(tx) ─┬─► COMMIT       │
//! │                                                        └─► ROLLBACK     │
//! │                                                            (warn!, then │
//! │                                                       original error)   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The write lock is taken at `BEGIN`. A deferred transaction would read
//! first and then fail with SQLITE_BUSY when upgrading to a writer if
//! another connection committed in between.
//!
//! Dropping the caller's future before the task is spawned cancels the work.
//! Once spawned, the task always reaches commit or rollback, even if the
//! caller goes away. Aggregate guards move into the task and are released
//! only after it finishes.

use std::future::Future;

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::locks::AggregateGuard;

/// A transaction owned by a unit of work.
pub type Tx = Transaction<'static, Sqlite>;

/// Runs `work` inside one transaction on a spawned task.
///
/// `work` receives the transaction and hands it back with its result: `Ok`
/// commits, `Err` rolls back and the error is returned unchanged.
pub(crate) async fn run_in_transaction<T, F, Fut>(
    pool: &SqlitePool,
    operation: &'static str,
    guards: Vec<AggregateGuard>,
    work: F,
) -> DbResult<T>
where
    T: Send + 'static,
    F: FnOnce(Tx) -> Fut + Send + 'static,
    Fut: Future<Output = (Tx, DbResult<T>)> + Send + 'static,
{
    let task = tokio::spawn(execute(pool.clone(), operation, guards, work));

    task.await
        .map_err(|e| DbError::TransactionFailed(format!("{operation}: {e}")))?
}

async fn execute<T, F, Fut>(
    pool: SqlitePool,
    operation: &'static str,
    guards: Vec<AggregateGuard>,
    work: F,
) -> DbResult<T>
where
    F: FnOnce(Tx) -> Fut,
    Fut: Future<Output = (Tx, DbResult<T>)>,
{
    let _guards = guards;

    let tx = pool.begin_with("BEGIN IMMEDIATE").await?;
    debug!(operation, "Transaction started");

    let (tx, result) = work(tx).await;
    match result {
        Ok(value) => {
            tx.commit().await?;
            debug!(operation, "Transaction committed");
            Ok(value)
        }
        Err(err) => {
            warn!(operation, error = %err, "Rolling back transaction");
            if let Err(rollback_err) = tx.rollback().await {
                warn!(operation, error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
