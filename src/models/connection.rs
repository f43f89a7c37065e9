//! Connection-related data models.
//!
//! This module defines the supported engines and the stages a transaction
//! batch moves through.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Includes MariaDB
    #[value(name = "mysql", alias = "mariadb")]
    #[serde(alias = "mariadb")]
    MySql,
    #[value(name = "postgres", alias = "postgresql", alias = "pg")]
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
}

impl Engine {
    /// Get the display name for this engine.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::Postgres => "PostgreSQL",
        }
    }

    /// Get the default port for this engine.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Stage of a transaction batch at which it failed.
///
/// Failures to begin are returned unwrapped, since nothing ran yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStage {
    /// One of the batch's statements.
    Statement,
    Commit,
}

impl TransactionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Statement => "statement",
            Self::Commit => "commit",
        }
    }
}

impl std::fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
