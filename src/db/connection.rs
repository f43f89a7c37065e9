//! The engine-agnostic connection.
//!
//! A [`Connection`] owns a lazy pool for one engine plus the [`Dialect`] picked
//! for it, and is the single entry point for statements, transactions and
//! escaping. It is cheap to clone; clones share the pool and the liveness flag.

use crate::config::ConnectionConfig;
use crate::db::client::{NativeClient, RawOutcome};
use crate::db::dialect::Dialect;
use crate::db::pool::{connection_suggestion, create_pool};
use crate::db::transaction::run_batch;
use crate::error::{DbError, DbResult};
use crate::models::{Engine, QueryOutcome, QueryParam, Statement};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback for statements slower than a threshold: `(duration, sql)`.
pub type SlowQueryHook = Arc<dyn Fn(Duration, &str) + Send + Sync>;

/// Runtime behaviour of a [`Connection`].
#[derive(Clone)]
pub struct ConnectionOptions {
    /// Deadline for each statement, including transaction control statements.
    pub query_timeout: Duration,
    /// Deadline for [`Connection::connect`].
    pub connect_timeout: Duration,
    /// Retry a statement once when its link turns out to be dead.
    pub retry_on_disconnect: bool,
    pub slow_query: Option<(Duration, SlowQueryHook)>,
}

impl ConnectionOptions {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            query_timeout: config.query_timeout(),
            connect_timeout: config.connect_timeout(),
            retry_on_disconnect: config.retry_on_disconnect,
            slow_query: None,
        }
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from_config(&ConnectionConfig::new("localhost", "root", ""))
    }
}

impl std::fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("query_timeout", &self.query_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("retry_on_disconnect", &self.retry_on_disconnect)
            .field(
                "slow_query_threshold",
                &self.slow_query.as_ref().map(|(threshold, _)| threshold),
            )
            .finish()
    }
}

/// Run `fut` under a deadline; running out yields [`DbError::Timeout`].
pub(crate) async fn with_deadline<T, F>(operation: &str, limit: Duration, fut: F) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DbError::timeout(
            operation,
            u32::try_from(limit.as_secs()).unwrap_or(u32::MAX),
        )),
    }
}

#[derive(Clone)]
pub struct Connection {
    dialect: Dialect,
    client: Arc<dyn NativeClient>,
    connected: Arc<AtomicBool>,
    options: Arc<ConnectionOptions>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("engine", &self.engine())
            .field("connected", &self.is_connected())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Build a connection over a lazy sqlx pool. No link is opened yet.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(engine: Engine, config: &ConnectionConfig) -> DbResult<Self> {
        let pool = create_pool(engine, config)?;
        Ok(Self::from_client(
            Arc::new(pool),
            ConnectionOptions::from_config(config),
        ))
    }

    /// Build a connection over any native client.
    pub fn from_client(client: Arc<dyn NativeClient>, options: ConnectionOptions) -> Self {
        Self {
            dialect: Dialect::for_engine(client.engine()),
            client,
            connected: Arc::new(AtomicBool::new(false)),
            options: Arc::new(options),
        }
    }

    /// Call `hook` for every statement that takes at least `threshold`.
    pub fn with_slow_query_hook<F>(mut self, threshold: Duration, hook: F) -> Self
    where
        F: Fn(Duration, &str) + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.options).slow_query = Some((threshold, Arc::new(hook)));
        self
    }

    pub fn engine(&self) -> Engine {
        self.dialect.engine()
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Verify that the server is reachable with a `SELECT 1` round trip.
    pub async fn connect(&self) -> DbResult<()> {
        let engine = self.engine();
        if self.client.is_closed() {
            self.connected.store(false, Ordering::SeqCst);
            return Err(DbError::connection(
                "Connection has been destroyed",
                "Create a new connection",
            ));
        }

        let result = with_deadline(
            "connect",
            self.options.connect_timeout,
            self.client.execute("SELECT 1", &[]),
        )
        .await;

        match result {
            Ok(_) => {
                self.connected.store(true, Ordering::SeqCst);
                info!(engine = %engine, "Connected");
                Ok(())
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                let message = match &e {
                    DbError::Connection { message, .. } | DbError::Query { message, .. } => {
                        message.clone()
                    }
                    other => other.to_string(),
                };
                warn!(engine = %engine, error = %message, "Failed to connect");
                let suggestion = connection_suggestion(engine, &message);
                Err(DbError::connection(message, suggestion))
            }
        }
    }

    /// Execute one statement with `?` placeholders.
    pub async fn query(&self, sql: &str, params: &[QueryParam]) -> DbResult<QueryOutcome> {
        let translated = self.dialect.translate_placeholders(sql, params);
        let started = Instant::now();

        let mut result = self.dispatch(&translated, params).await;
        let retry = match &result {
            Err(e) if self.should_retry(e) => {
                warn!(
                    engine = %self.engine(),
                    error = %e,
                    "Connection lost, retrying statement once"
                );
                true
            }
            _ => false,
        };
        if retry {
            result = self.dispatch(&translated, params).await;
        }
        self.track(&result);

        let raw = result?;
        let elapsed = started.elapsed();
        self.observe(sql, params.len(), elapsed);
        Ok(self.dialect.outcome(sql, raw, elapsed))
    }

    pub async fn query_statement(&self, statement: &Statement) -> DbResult<QueryOutcome> {
        self.query(&statement.sql, &statement.params).await
    }

    /// Execute in the background and hand the result to `on_result`.
    ///
    /// Returns right away; `on_result` is called exactly once, with either the
    /// outcome or the error.
    pub fn query_callback<F>(
        &self,
        sql: impl Into<String>,
        params: Vec<QueryParam>,
        on_result: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(DbResult<QueryOutcome>) + Send + 'static,
    {
        let conn = self.clone();
        let sql = sql.into();
        tokio::spawn(async move {
            let result = conn.query(&sql, &params).await;
            on_result(result);
        })
    }

    /// Run `batch` in one transaction on a dedicated link.
    pub async fn transaction(&self, batch: &[Statement]) -> DbResult<Vec<QueryOutcome>> {
        let result = run_batch(
            self.client.as_ref(),
            self.dialect,
            batch,
            self.options.query_timeout,
        )
        .await;
        self.track(&result);
        result
    }

    /// Callback flavour of [`Connection::transaction`]: exactly one of
    /// `on_success` and `on_failure` is called.
    pub async fn execute_transaction<S, F>(&self, batch: &[Statement], on_success: S, on_failure: F)
    where
        S: FnOnce(Vec<QueryOutcome>),
        F: FnOnce(DbError),
    {
        match self.transaction(batch).await {
            Ok(outcomes) => on_success(outcomes),
            Err(e) => on_failure(e),
        }
    }

    /// Inline literal for `value`. Fails with `UnsupportedOperation` on PostgreSQL.
    pub fn escape(&self, value: &QueryParam) -> DbResult<String> {
        self.dialect.escape_literal(value)
    }

    pub fn escape_identifier(&self, name: &str) -> String {
        self.dialect.escape_identifier(name)
    }

    pub fn escape_table(&self, database: &str, table: &str) -> String {
        self.dialect.escape_table(database, table)
    }

    /// Liveness as of the last operation; not a live check.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Close the pool. Safe to call repeatedly, and on a connection that never connected.
    pub async fn destroy(&self) {
        if !self.client.is_closed() {
            self.client.close().await;
            info!(engine = %self.engine(), "Connection destroyed");
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Server version string, from `SELECT version()`.
    pub async fn server_version(&self) -> DbResult<String> {
        let outcome = self.query("SELECT version()", &[]).await?;
        outcome
            .result_set()
            .and_then(|rs| rs.rows().first())
            .and_then(|row| row.get_string(0usize))
            .ok_or_else(|| DbError::internal("Server did not report a version"))
    }

    async fn dispatch(&self, sql: &str, params: &[QueryParam]) -> DbResult<RawOutcome> {
        with_deadline(
            "query execution",
            self.options.query_timeout,
            self.client.execute(sql, params),
        )
        .await
    }

    fn should_retry(&self, err: &DbError) -> bool {
        matches!(err, DbError::Connection { .. })
            && self.options.retry_on_disconnect
            && !self.client.is_closed()
    }

    /// Link failures mark the connection dead; anything the engine answered marks it alive.
    fn track<T>(&self, result: &DbResult<T>) {
        let alive = match result {
            Ok(_) => true,
            Err(e) => !e.is_link_failure(),
        };
        self.connected.store(alive, Ordering::SeqCst);
    }

    fn observe(&self, sql: &str, params: usize, elapsed: Duration) {
        debug!(
            engine = %self.engine(),
            sql = %sql,
            params = params,
            elapsed_ms = elapsed.as_millis() as u64,
            "Statement executed"
        );
        if let Some((threshold, hook)) = &self.options.slow_query {
            if elapsed >= *threshold {
                warn!(
                    engine = %self.engine(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Slow query"
                );
                (**hook)(elapsed, sql);
            }
        }
    }
}
