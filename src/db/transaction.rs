//! Batch transactions on a dedicated link.
//!
//! A batch runs `IDLE -> BEGIN -> statements -> COMMIT -> DONE` on one link
//! checked out of the pool for the whole batch. The first failing statement (or
//! a failing COMMIT) moves it to `ROLLBACK -> FAILED`, and the caller gets the
//! original error wrapped with the batch id, stage and statement index. A
//! rollback failure is logged and never replaces that error.
//!
//! The link leaves on every path: released back to the pool when its state is
//! known to be clean, discarded (closed) otherwise. Closing a link with an open
//! transaction makes the server roll it back. That includes the batch future
//! being dropped mid-flight (a caller timeout, `select!`, an aborted task):
//! [`BatchLink`] then closes the link on a background task.

use crate::db::client::{NativeClient, NativeLink, RawOutcome};
use crate::db::connection::with_deadline;
use crate::db::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::models::{QueryOutcome, QueryParam, Statement, TransactionStage};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A link checked out for one batch.
///
/// Dropped while still holding the link, it discards it instead of letting
/// it return to the pool with the transaction open.
struct BatchLink {
    link: Option<Box<dyn NativeLink>>,
    transaction_id: String,
}

impl BatchLink {
    fn new(link: Box<dyn NativeLink>, transaction_id: &str) -> Self {
        Self {
            link: Some(link),
            transaction_id: transaction_id.to_string(),
        }
    }

    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<RawOutcome> {
        match self.link.as_mut() {
            Some(link) => link.execute(sql, params).await,
            None => Err(DbError::internal("transaction link already returned")),
        }
    }

    async fn release(mut self) {
        if let Some(link) = self.link.take() {
            link.release().await;
        }
    }

    async fn discard(mut self) {
        if let Some(link) = self.link.take() {
            link.discard().await;
        }
    }
}

impl Drop for BatchLink {
    fn drop(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        warn!(
            transaction_id = %self.transaction_id,
            "Transaction abandoned before completion, discarding connection"
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(link.discard());
            }
            // No runtime left to close it on.
            Err(_) => drop(link),
        }
    }
}

/// Generate a batch id for log correlation.
pub fn new_transaction_id() -> String {
    format!("tx_{}", Uuid::new_v4().simple())
}

/// Run `batch` atomically and return one outcome per statement, in order.
///
/// Failing to check out a link or to open the transaction returns the
/// underlying error unchanged; nothing has been applied at that point.
pub(crate) async fn run_batch(
    client: &dyn NativeClient,
    dialect: Dialect,
    batch: &[Statement],
    statement_timeout: Duration,
) -> DbResult<Vec<QueryOutcome>> {
    let transaction_id = new_transaction_id();
    let mut link = BatchLink::new(client.acquire().await?, &transaction_id);

    debug!(
        transaction_id = %transaction_id,
        engine = %dialect.engine(),
        statements = batch.len(),
        "Beginning transaction"
    );

    if let Err(e) = with_deadline(
        "begin transaction",
        statement_timeout,
        link.execute(dialect.begin_statement(), &[]),
    )
    .await
    {
        warn!(transaction_id = %transaction_id, error = %e, "Failed to begin transaction");
        link.discard().await;
        return Err(e);
    }

    let mut outcomes = Vec::with_capacity(batch.len());
    for (index, statement) in batch.iter().enumerate() {
        let sql = dialect.translate_placeholders(&statement.sql, &statement.params);
        let started = Instant::now();
        let result = with_deadline(
            "query execution",
            statement_timeout,
            link.execute(&sql, &statement.params),
        )
        .await;

        match result {
            Ok(raw) => outcomes.push(dialect.outcome(&statement.sql, raw, started.elapsed())),
            Err(cause) => {
                let err = abort(
                    link,
                    dialect,
                    &transaction_id,
                    TransactionStage::Statement,
                    Some(index),
                    cause,
                    statement_timeout,
                )
                .await;
                return Err(err);
            }
        }
    }

    if let Err(cause) = with_deadline(
        "commit",
        statement_timeout,
        link.execute(dialect.commit_statement(), &[]),
    )
    .await
    {
        let err = abort(
            link,
            dialect,
            &transaction_id,
            TransactionStage::Commit,
            None,
            cause,
            statement_timeout,
        )
        .await;
        return Err(err);
    }

    link.release().await;
    info!(
        transaction_id = %transaction_id,
        statements = outcomes.len(),
        "Transaction committed"
    );
    Ok(outcomes)
}

/// Roll back after a failure at `stage` and wrap `cause` for the caller.
async fn abort(
    mut link: BatchLink,
    dialect: Dialect,
    transaction_id: &str,
    stage: TransactionStage,
    statement_index: Option<usize>,
    cause: DbError,
    rollback_timeout: Duration,
) -> DbError {
    warn!(
        transaction_id = %transaction_id,
        stage = %stage,
        statement_index = ?statement_index,
        error = %cause,
        "Transaction failed, rolling back"
    );

    if cause.is_link_failure() {
        // The link may be mid-statement; closing it is the rollback.
        link.discard().await;
        return DbError::transaction(transaction_id, stage, statement_index, cause);
    }

    match with_deadline(
        "rollback",
        rollback_timeout,
        link.execute(dialect.rollback_statement(), &[]),
    )
    .await
    {
        Ok(_) => {
            link.release().await;
            debug!(transaction_id = %transaction_id, "Transaction rolled back");
        }
        Err(rollback_err) => {
            warn!(
                transaction_id = %transaction_id,
                error = %rollback_err,
                "Rollback failed, discarding connection"
            );
            link.discard().await;
        }
    }

    DbError::transaction(transaction_id, stage, statement_index, cause)
}
