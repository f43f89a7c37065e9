//! sqlbridge: one database access layer over MySQL and PostgreSQL.
//!
//! Callers write statements with `?` placeholders against a [`Connection`] and
//! read rows through a [`ResultSet`] cursor; per-engine differences
//! (placeholder syntax, quoting, generated ids, value decoding) are handled by
//! the engine's [`Dialect`](db::Dialect).

pub mod config;
pub mod db;
pub mod error;
pub mod facade;
pub mod format;
pub mod models;

pub use config::{Config, ConnectionConfig, PoolOptions};
pub use db::Connection;
pub use error::{DbError, DbResult};
pub use facade::{create_connection, query, query_ex, transaction};
pub use models::{Engine, QueryOutcome, QueryParam, ResultSet, Row, Statement, StatementKind, Value};
