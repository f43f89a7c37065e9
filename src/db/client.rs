//! Boundary to the native engine clients.
//!
//! Everything above this module talks to an engine through [`NativeClient`]
//! (the shared pool) and [`NativeLink`] (one dedicated physical connection).
//! The sqlx-backed implementation lives in [`crate::db::pool`].

use crate::error::DbResult;
use crate::models::{ColumnMetadata, Engine, QueryParam, Value};
use async_trait::async_trait;

/// Rows and execution metadata exactly as the engine reported them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutcome {
    /// Columns of the returned rows; empty when no rows came back.
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: u64,
    /// Only engines with insert-id metadata (MySQL) fill this in.
    pub last_insert_id: Option<u64>,
}

impl RawOutcome {
    /// Outcome of a statement that returned no rows.
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }

    /// Outcome of a statement that returned rows.
    pub fn rows(columns: Vec<ColumnMetadata>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            ..Self::default()
        }
    }

    pub fn with_last_insert_id(mut self, id: u64) -> Self {
        self.last_insert_id = Some(id);
        self
    }
}

/// A pool of links to one engine.
#[async_trait]
pub trait NativeClient: Send + Sync + 'static {
    fn engine(&self) -> Engine;

    /// Run one statement on any available link. `sql` is already in the
    /// engine's placeholder syntax.
    async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<RawOutcome>;

    /// Check out a dedicated link. It stays out of the pool until released or discarded.
    async fn acquire(&self) -> DbResult<Box<dyn NativeLink>>;

    /// Shut the pool down, closing every link.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// One physical link checked out of a [`NativeClient`].
#[async_trait]
pub trait NativeLink: Send {
    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<RawOutcome>;

    /// Hand the link back to the pool for reuse.
    async fn release(self: Box<Self>);

    /// Close the link instead of returning it, for links left in an unknown state.
    async fn discard(self: Box<Self>);
}
