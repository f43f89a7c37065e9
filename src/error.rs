//! Error types for sqlbridge.
//!
//! Every fallible operation returns [`DbResult`]. The variants follow the
//! access layer's taxonomy: link failures (`Connection`), statements rejected
//! by the engine (`Query`), failed batches (`Transaction`) and operations an
//! engine cannot perform safely (`UnsupportedOperation`). Connection and query
//! variants carry a suggestion to help callers recover.

use crate::config::DEFAULT_ACQUIRE_TIMEOUT_SECS;
use crate::models::{Engine, TransactionStage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Transaction {transaction_id} failed during {stage}: {source}")]
    Transaction {
        transaction_id: String,
        stage: TransactionStage,
        /// Zero-based position of the failing statement within the batch.
        statement_index: Option<usize>,
        #[source]
        source: Box<DbError>,
    },

    #[error("Unsupported operation on {engine}: {operation}. {reason}")]
    UnsupportedOperation {
        engine: Engine,
        operation: String,
        reason: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Field not found: {field}")]
    FieldNotFound { field: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Wrap the error that aborted a transaction batch.
    pub fn transaction(
        transaction_id: impl Into<String>,
        stage: TransactionStage,
        statement_index: Option<usize>,
        source: DbError,
    ) -> Self {
        Self::Transaction {
            transaction_id: transaction_id.into(),
            stage,
            statement_index,
            source: Box::new(source),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(
        engine: Engine,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedOperation {
            engine,
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a field not found error.
    pub fn field_not_found(field: impl Into<String>) -> Self {
        Self::FieldNotFound {
            field: field.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Query { suggestion, .. } => Some(suggestion),
            Self::Transaction { source, .. } => source.suggestion(),
            _ => None,
        }
    }

    /// SQLSTATE reported by the engine, looking through transaction wrappers.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query { sql_state, .. } => sql_state.as_deref(),
            Self::Transaction { source, .. } => source.sql_state(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// True when the failure says something about the link rather than the statement.
    pub fn is_link_failure(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => true,
            Self::Transaction { source, .. } => source.is_link_failure(),
            _ => false,
        }
    }

    /// The error that triggered a transaction rollback, or `self` for any other variant.
    pub fn root_cause(&self) -> &DbError {
        match self {
            Self::Transaction { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check host, port, credentials and pool options",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::query(
                    db_err.message(),
                    code,
                    "Check the SQL syntax, constraints and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::query(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            // Pools report their own acquire timeout; see `DbPool`.
            sqlx::Error::PoolTimedOut => DbError::timeout(
                "connection pool acquire",
                DEFAULT_ACQUIRE_TIMEOUT_SECS as u32,
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Create a new connection")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => DbError::query(
                format!("Type not found: {}", type_name),
                None,
                "Check the parameter and column types",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::field_not_found(col),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                DbError::field_not_found(format!("#{} (len: {})", index, len))
            }
            sqlx::Error::ColumnDecode { index, source } => DbError::query(
                format!("Failed to decode column {}: {}", index, source),
                None,
                "Check that the column type matches the requested representation",
            ),
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::connection(
                "Database worker crashed",
                "Create a new connection",
            ),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::query("Syntax error", Some("42601".to_string()), "Check SQL syntax");
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(err.sql_state(), Some("42601"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", 30).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::query("bad", None, "fix").is_retryable());
        assert!(!DbError::unsupported(Engine::Postgres, "escape", "use parameters").is_retryable());
    }

    #[test]
    fn test_transaction_error_keeps_original_message() {
        let cause = DbError::query(
            "You have an error in your SQL syntax",
            Some("42000".to_string()),
            "check syntax",
        );
        let err = DbError::transaction("tx_1", TransactionStage::Statement, Some(1), cause);

        let message = err.to_string();
        assert!(message.contains("tx_1"));
        assert!(message.contains("You have an error in your SQL syntax"));
        assert_eq!(err.sql_state(), Some("42000"));
        assert!(matches!(err.root_cause(), DbError::Query { .. }));
    }

    #[test]
    fn test_link_failure_classification() {
        assert!(DbError::connection("gone", "retry").is_link_failure());
        assert!(DbError::timeout("query execution", 5).is_link_failure());
        assert!(!DbError::query("dup key", Some("23000".into()), "fix").is_link_failure());

        let wrapped = DbError::transaction(
            "tx_2",
            TransactionStage::Commit,
            None,
            DbError::connection("reset", "retry"),
        );
        assert!(wrapped.is_link_failure());
    }

    #[test]
    fn test_unsupported_display_names_engine() {
        let err = DbError::unsupported(
            Engine::Postgres,
            "escape",
            "Use bound parameters instead",
        );
        assert!(err.to_string().contains("PostgreSQL"));
        assert!(err.to_string().contains("escape"));
    }

    #[test]
    fn test_pool_closed_maps_to_connection() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::Connection { .. }));
    }

    #[test]
    fn test_column_not_found_maps_to_field_not_found() {
        let err: DbError = sqlx::Error::ColumnNotFound("missing".to_string()).into();
        assert!(matches!(err, DbError::FieldNotFound { field } if field == "missing"));
    }
}
