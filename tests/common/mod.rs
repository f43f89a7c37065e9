//! In-memory native client for driving `Connection` without a server.
//!
//! Every statement is recorded. Failures are scripted by substring match, and
//! link checkouts are counted so tests can assert that no link leaks.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlbridge::db::{Connection, ConnectionOptions, NativeClient, NativeLink, RawOutcome};
use sqlbridge::models::{ColumnMetadata, Engine, QueryParam, StatementKind, Value};
use sqlbridge::{DbError, DbResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The engine rejects the statement.
    Query,
    /// The link dies while running the statement.
    Connection,
}

impl Failure {
    fn to_error(self, sql: &str) -> DbError {
        match self {
            Failure::Query => DbError::query(
                format!("You have an error in your SQL syntax near '{}'", sql),
                Some("42000".to_string()),
                "Check the SQL syntax",
            ),
            Failure::Connection => {
                DbError::connection("Lost connection to server during query", "Reconnect")
            }
        }
    }
}

#[derive(Default)]
struct State {
    log: Mutex<Vec<String>>,
    params: Mutex<Vec<Vec<QueryParam>>>,
    rules: Mutex<Vec<(String, Failure)>>,
    responses: Mutex<Vec<(String, RawOutcome)>>,
    delays: Mutex<Vec<(String, Duration)>>,
    lost_connections: AtomicUsize,
    acquire_fails: AtomicBool,
    acquired: AtomicUsize,
    released: AtomicUsize,
    discarded: AtomicUsize,
    leaked: AtomicUsize,
    closes: AtomicUsize,
    closed: AtomicBool,
}

impl State {
    fn record(&self, sql: &str, params: &[QueryParam]) {
        self.log.lock().unwrap().push(sql.to_string());
        self.params.lock().unwrap().push(params.to_vec());
    }

    fn delay_for(&self, sql: &str) -> Option<Duration> {
        self.delays
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, d)| *d)
    }

    fn respond(&self, engine: Engine, sql: &str) -> DbResult<RawOutcome> {
        let lost = self
            .lost_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            return Err(Failure::Connection.to_error(sql));
        }

        if let Some((_, failure)) = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
        {
            return Err(failure.to_error(sql));
        }

        if let Some((_, raw)) = self
            .responses
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
        {
            return Ok(raw.clone());
        }

        Ok(match StatementKind::detect(sql) {
            StatementKind::Select => RawOutcome::rows(
                vec![ColumnMetadata::new("1", "BIGINT")],
                vec![vec![Value::Int(1)]],
            ),
            StatementKind::Insert if engine == Engine::MySql => {
                RawOutcome::affected(1).with_last_insert_id(42)
            }
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete => {
                RawOutcome::affected(1)
            }
            StatementKind::Other => RawOutcome::affected(0),
        })
    }

    async fn run(&self, engine: Engine, sql: &str, params: &[QueryParam]) -> DbResult<RawOutcome> {
        self.record(sql, params);
        if let Some(delay) = self.delay_for(sql) {
            tokio::time::sleep(delay).await;
        }
        self.respond(engine, sql)
    }
}

/// Scripted stand-in for a sqlx pool.
#[derive(Clone)]
pub struct ScriptedClient {
    engine: Engine,
    state: Arc<State>,
}

impl ScriptedClient {
    pub fn new(engine: Engine) -> Arc<Self> {
        Arc::new(Self {
            engine,
            state: Arc::new(State::default()),
        })
    }

    /// Fail every statement containing `pattern`.
    pub fn fail_on(&self, pattern: &str, failure: Failure) {
        self.state
            .rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), failure));
    }

    /// Answer statements containing `pattern` with `raw`.
    pub fn respond_with(&self, pattern: &str, raw: RawOutcome) {
        self.state
            .responses
            .lock()
            .unwrap()
            .push((pattern.to_string(), raw));
    }

    /// Stall statements containing `pattern` for `delay`.
    pub fn delay_on(&self, pattern: &str, delay: Duration) {
        self.state
            .delays
            .lock()
            .unwrap()
            .push((pattern.to_string(), delay));
    }

    /// The next `n` statements fail as if the link died.
    pub fn lose_connection(&self, n: usize) {
        self.state.lost_connections.store(n, Ordering::SeqCst);
    }

    pub fn fail_acquire(&self) {
        self.state.acquire_fails.store(true, Ordering::SeqCst);
    }

    pub fn log(&self) -> Vec<String> {
        self.state.log.lock().unwrap().clone()
    }

    pub fn params_log(&self) -> Vec<Vec<QueryParam>> {
        self.state.params.lock().unwrap().clone()
    }

    pub fn acquired(&self) -> usize {
        self.state.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    pub fn discarded(&self) -> usize {
        self.state.discarded.load(Ordering::SeqCst)
    }

    /// Links dropped without being released or discarded.
    pub fn leaked(&self) -> usize {
        self.state.leaked.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Links checked out and not yet returned.
    pub fn outstanding(&self) -> usize {
        self.acquired() - self.released() - self.discarded()
    }
}

#[async_trait]
impl NativeClient for ScriptedClient {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<RawOutcome> {
        if self.is_closed() {
            return Err(DbError::connection(
                "Connection pool is closed",
                "Create a new connection",
            ));
        }
        self.state.run(self.engine, sql, params).await
    }

    async fn acquire(&self) -> DbResult<Box<dyn NativeLink>> {
        if self.state.acquire_fails.load(Ordering::SeqCst) {
            return Err(DbError::connection(
                "Too many connections",
                "Raise max_connections",
            ));
        }
        self.state.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedLink {
            engine: self.engine,
            state: self.state.clone(),
            returned: false,
        }))
    }

    async fn close(&self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

struct ScriptedLink {
    engine: Engine,
    state: Arc<State>,
    returned: bool,
}

impl Drop for ScriptedLink {
    fn drop(&mut self) {
        if !self.returned {
            self.state.leaked.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl NativeLink for ScriptedLink {
    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<RawOutcome> {
        self.state.run(self.engine, sql, params).await
    }

    async fn release(mut self: Box<Self>) {
        self.returned = true;
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }

    async fn discard(mut self: Box<Self>) {
        self.returned = true;
        self.state.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

/// A connection over a fresh scripted client.
pub fn scripted(engine: Engine) -> (Connection, Arc<ScriptedClient>) {
    scripted_with(engine, ConnectionOptions::default())
}

pub fn scripted_with(
    engine: Engine,
    options: ConnectionOptions,
) -> (Connection, Arc<ScriptedClient>) {
    let client = ScriptedClient::new(engine);
    let conn = Connection::from_client(client.clone(), options);
    (conn, client)
}
