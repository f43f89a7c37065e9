//! Database access layer.
//!
//! This module provides:
//! - The native client boundary and its sqlx pool implementation
//! - Statement execution and row decoding
//! - Per-engine dialect rules
//! - The engine-agnostic `Connection` and its transaction coordinator

pub mod client;
pub mod connection;
pub mod dialect;
pub mod executor;
pub mod params;
pub mod pool;
pub mod transaction;
pub mod types;

pub use client::{NativeClient, NativeLink, RawOutcome};
pub use connection::{Connection, ConnectionOptions, SlowQueryHook};
pub use dialect::Dialect;
pub use pool::{DbPool, create_pool};
pub use types::{TypeCategory, categorize_type};
