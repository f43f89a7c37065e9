//! Construction and call-style wrappers.
//!
//! [`create_connection`] picks the adapter for an engine. The free functions
//! adapt [`Connection`] methods to the two convenience call styles: outcome or
//! `None`, and an `(outcome, error)` pair with exactly one side populated.

use crate::config::ConnectionConfig;
use crate::db::Connection;
use crate::error::{DbError, DbResult};
use crate::models::{Engine, QueryOutcome, QueryParam, Statement};
use tracing::{debug, warn};

/// Create a connection for `engine`. The pool is lazy; call
/// [`Connection::connect`] to verify the server is reachable.
pub fn create_connection(engine: Engine, config: &ConnectionConfig) -> DbResult<Connection> {
    debug!(engine = %engine, config = ?config, "Creating connection");
    Connection::new(engine, config)
}

/// Run one statement; failures are logged and reported as `None`.
pub async fn query(db: &Connection, sql: &str, params: &[QueryParam]) -> Option<QueryOutcome> {
    match db.query(sql, params).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!(engine = %db.engine(), error = %e, "Query failed");
            None
        }
    }
}

/// Run one statement and return `(outcome, error)`.
pub async fn query_ex(
    db: &Connection,
    sql: &str,
    params: &[QueryParam],
) -> (Option<QueryOutcome>, Option<DbError>) {
    match db.query(sql, params).await {
        Ok(outcome) => (Some(outcome), None),
        Err(e) => (None, Some(e)),
    }
}

/// Run `batch` atomically.
pub async fn transaction(db: &Connection, batch: &[Statement]) -> DbResult<Vec<QueryOutcome>> {
    db.transaction(batch).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use crate::db::{ConnectionOptions, NativeClient, NativeLink, RawOutcome};
    use crate::models::{ColumnMetadata, StatementKind, Value};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Answers `SELECT 1` and rejects everything else.
    struct EchoClient;

    #[async_trait]
    impl NativeClient for EchoClient {
        fn engine(&self) -> Engine {
            Engine::MySql
        }

        async fn execute(&self, sql: &str, _params: &[QueryParam]) -> DbResult<RawOutcome> {
            if sql == "SELECT 1" {
                Ok(RawOutcome::rows(
                    vec![ColumnMetadata::new("1", "BIGINT")],
                    vec![vec![Value::Int(1)]],
                ))
            } else {
                Err(DbError::query(
                    "You have an error in your SQL syntax",
                    Some("42000".into()),
                    "Check the syntax",
                ))
            }
        }

        async fn acquire(&self) -> DbResult<Box<dyn NativeLink>> {
            Err(DbError::connection("no links", "none"))
        }

        async fn close(&self) {}

        fn is_closed(&self) -> bool {
            false
        }
    }

    fn conn() -> Connection {
        Connection::from_client(Arc::new(EchoClient), ConnectionOptions::default())
    }

    #[tokio::test]
    async fn test_query_returns_outcome_or_none() {
        let db = conn();
        let outcome = query(&db, "SELECT 1", &[]).await.unwrap();
        assert_eq!(outcome.kind(), StatementKind::Select);
        assert!(query(&db, "SELEC 1", &[]).await.is_none());
    }

    #[tokio::test]
    async fn test_query_ex_populates_exactly_one_side() {
        let db = conn();
        let (outcome, error) = query_ex(&db, "SELECT 1", &[]).await;
        assert!(outcome.is_some() && error.is_none());

        let (outcome, error) = query_ex(&db, "bogus", &[]).await;
        assert!(outcome.is_none());
        assert!(matches!(error, Some(DbError::Query { .. })));
    }

    #[tokio::test]
    async fn test_transaction_surfaces_acquire_failure() {
        let db = conn();
        let result = transaction(&db, &[Statement::new("SELECT 1")]).await;
        assert!(matches!(result, Err(DbError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_create_connection_rejects_invalid_pool() {
        let config = ConnectionConfig::new("localhost", "root", "").with_pool(PoolOptions {
            max_connections: Some(0),
            ..Default::default()
        });
        assert!(matches!(
            create_connection(Engine::Postgres, &config),
            Err(DbError::InvalidInput { .. })
        ));
    }
}
