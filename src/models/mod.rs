//! Data models for sqlbridge.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod result;
pub mod value;

// Re-export commonly used types
pub use connection::{Engine, TransactionStage};
pub use query::{ColumnMetadata, QueryOutcome, QueryParam, Statement, StatementKind};
pub use result::{FieldRef, FieldSet, ResultSet, Row};
pub use value::Value;
