//! Connection pool management.
//!
//! This module provides the sqlx-backed [`NativeClient`]: one database-specific
//! pool (MySqlPool, PgPool) per connection, to keep full type support.

use crate::config::ConnectionConfig;
use crate::db::client::{NativeClient, NativeLink, RawOutcome};
use crate::db::executor;
use crate::error::{DbError, DbResult};
use crate::models::{Engine, QueryParam};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{
    MySql, MySqlPool, PgPool, Postgres, mysql::MySqlConnectOptions, mysql::MySqlPoolOptions,
    postgres::PgConnectOptions, postgres::PgPoolOptions,
};
use std::time::Duration;
use tracing::{debug, warn};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
}

impl DbPool {
    /// Get the engine for this pool.
    pub fn engine(&self) -> Engine {
        match self {
            DbPool::MySql(_) => Engine::MySql,
            DbPool::Postgres(_) => Engine::Postgres,
        }
    }

    /// The acquire timeout the pool was built with.
    pub fn acquire_timeout(&self) -> Duration {
        match self {
            DbPool::MySql(pool) => pool.options().get_acquire_timeout(),
            DbPool::Postgres(pool) => pool.options().get_acquire_timeout(),
        }
    }

    /// Convert a sqlx error raised through this pool.
    ///
    /// `PoolTimedOut` carries no duration, so it is reported with the
    /// configured acquire timeout.
    fn db_error(&self, err: sqlx::Error) -> DbError {
        match err {
            sqlx::Error::PoolTimedOut => {
                let secs = u32::try_from(self.acquire_timeout().as_secs()).unwrap_or(u32::MAX);
                DbError::timeout("connection pool acquire", secs)
            }
            other => other.into(),
        }
    }
}

/// Create a lazy pool: no link is opened until the first statement or `connect()`.
///
/// Must be called from within a tokio runtime, since the pool spawns its
/// maintenance task on creation.
pub fn create_pool(engine: Engine, config: &ConnectionConfig) -> DbResult<DbPool> {
    config.validate()?;

    let pool_opts = &config.pool;
    let acquire_timeout = Duration::from_secs(pool_opts.acquire_timeout_or_default());
    let idle_timeout = Some(Duration::from_secs(pool_opts.idle_timeout_or_default()));
    let port = config.port_or_default(engine);

    debug!(
        engine = %engine,
        host = %config.host,
        port = port,
        database = ?config.database,
        max_connections = pool_opts.max_connections_or_default(),
        "Creating connection pool"
    );

    match engine {
        Engine::MySql => {
            let mut options = MySqlConnectOptions::new()
                .host(&config.host)
                .port(port)
                .username(&config.user)
                .password(&config.password)
                .charset("utf8mb4");
            if let Some(database) = &config.database {
                options = options.database(database);
            }

            let pool = MySqlPoolOptions::new()
                .min_connections(pool_opts.min_connections_or_default())
                .max_connections(pool_opts.max_connections_or_default())
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .test_before_acquire(pool_opts.test_before_acquire_or_default())
                .connect_lazy_with(options);
            Ok(DbPool::MySql(pool))
        }
        Engine::Postgres => {
            let mut options = PgConnectOptions::new()
                .host(&config.host)
                .port(port)
                .username(&config.user)
                .password(&config.password);
            if let Some(database) = &config.database {
                options = options.database(database);
            }

            let pool = PgPoolOptions::new()
                .min_connections(pool_opts.min_connections_or_default())
                .max_connections(pool_opts.max_connections_or_default())
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .test_before_acquire(pool_opts.test_before_acquire_or_default())
                .connect_lazy_with(options);
            Ok(DbPool::Postgres(pool))
        }
    }
}

/// Generate a helpful suggestion for connection errors.
pub(crate) fn connection_suggestion(engine: Engine, message: &str) -> String {
    let message = message.to_lowercase();

    if message.contains("connection refused") {
        return format!("Check that the {} server is running and accessible", engine);
    }

    if message.contains("authentication")
        || message.contains("password")
        || message.contains("access denied")
    {
        return "Verify the user name and password".to_string();
    }

    if message.contains("does not exist") || message.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if message.contains("tls") || message.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    format!(
        "Verify host and port (default {} port is {})",
        engine,
        engine.default_port()
    )
}

#[async_trait]
impl NativeClient for DbPool {
    fn engine(&self) -> Engine {
        DbPool::engine(self)
    }

    async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<RawOutcome> {
        let result = match self {
            DbPool::MySql(pool) => executor::mysql::execute(pool, sql, params).await,
            DbPool::Postgres(pool) => executor::postgres::execute(pool, sql, params).await,
        };
        result.map_err(|e| self.db_error(e))
    }

    async fn acquire(&self) -> DbResult<Box<dyn NativeLink>> {
        let link = match self {
            DbPool::MySql(pool) => {
                PooledLink::MySql(pool.acquire().await.map_err(|e| self.db_error(e))?)
            }
            DbPool::Postgres(pool) => {
                PooledLink::Postgres(pool.acquire().await.map_err(|e| self.db_error(e))?)
            }
        };
        Ok(Box::new(link))
    }

    async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
        }
    }

    fn is_closed(&self) -> bool {
        match self {
            DbPool::MySql(pool) => pool.is_closed(),
            DbPool::Postgres(pool) => pool.is_closed(),
        }
    }
}

/// A physical connection checked out of a [`DbPool`].
pub enum PooledLink {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
}

#[async_trait]
impl NativeLink for PooledLink {
    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<RawOutcome> {
        let result = match self {
            PooledLink::MySql(conn) => executor::mysql::execute(&mut **conn, sql, params).await,
            PooledLink::Postgres(conn) => {
                executor::postgres::execute(&mut **conn, sql, params).await
            }
        };
        Ok(result?)
    }

    async fn release(self: Box<Self>) {
        // Dropping a PoolConnection returns it to the pool.
        drop(self);
    }

    async fn discard(self: Box<Self>) {
        let result = match *self {
            PooledLink::MySql(conn) => conn.close().await,
            PooledLink::Postgres(conn) => conn.close().await,
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to close discarded connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;

    #[test]
    fn test_connection_suggestion() {
        assert!(connection_suggestion(Engine::MySql, "Connection refused (os error 111)")
            .contains("MySQL server is running"));
        assert!(
            connection_suggestion(Engine::Postgres, "password authentication failed")
                .contains("password")
        );
        assert!(connection_suggestion(Engine::Postgres, "timed out").contains("5432"));
    }

    #[tokio::test]
    async fn test_create_pool_is_lazy() {
        // Nothing listens here; creation must still succeed without a round trip.
        let config = ConnectionConfig::new("127.0.0.1", "nobody", "").with_port(1);
        let pool = create_pool(Engine::Postgres, &config).unwrap();
        assert_eq!(pool.engine(), Engine::Postgres);
        assert!(!NativeClient::is_closed(&pool));
        NativeClient::close(&pool).await;
        assert!(NativeClient::is_closed(&pool));
    }

    #[tokio::test]
    async fn test_acquire_timeout_reports_configured_duration() {
        let mut config = ConnectionConfig::new("127.0.0.1", "nobody", "").with_port(1);
        config.pool.acquire_timeout_secs = Some(7);
        let pool = create_pool(Engine::MySql, &config).unwrap();
        assert_eq!(pool.acquire_timeout(), Duration::from_secs(7));

        match pool.db_error(sqlx::Error::PoolTimedOut) {
            DbError::Timeout {
                operation,
                elapsed_secs,
            } => {
                assert_eq!(operation, "connection pool acquire");
                assert_eq!(elapsed_secs, 7);
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
        assert!(matches!(
            pool.db_error(sqlx::Error::PoolClosed),
            DbError::Connection { .. }
        ));
    }

    #[tokio::test]
    async fn test_create_pool_rejects_invalid_config() {
        let config = ConnectionConfig::new("", "root", "");
        assert!(matches!(
            create_pool(Engine::MySql, &config),
            Err(DbError::InvalidInput { .. })
        ));
    }
}
