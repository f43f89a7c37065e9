//! Configuration handling for sqlbridge.
//!
//! [`ConnectionConfig`] is what the library needs to open a connection; it can be
//! built in code or deserialized. [`Config`] is the command line of the
//! `sqlbridge` binary, with environment variable fallbacks.

use crate::error::{DbError, DbResult};
use crate::format::OutputFormat;
use crate::models::{Engine, QueryParam};
use clap::Parser;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
/// Zero keeps the pool lazy: no link is opened until the first statement.
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10)
    #[serde(default)]
    pub max_connections: Option<u32>,
    /// Minimum connections kept open (default: 0)
    #[serde(default)]
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    #[serde(default)]
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    #[serde(default)]
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    pub fn max_connections_or_default(&self) -> u32 {
        self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        let max = self.max_connections_or_default();
        if max == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }
        let min = self.min_connections_or_default();
        if min > max {
            return Err(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                min, max
            ));
        }
        if self.acquire_timeout_or_default() == 0 {
            return Err("acquire_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Everything needed to open a connection to one database server.
#[derive(Clone, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    /// Engine default (3306 / 5432) when absent
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(alias = "username")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Server default database when absent
    #[serde(default)]
    pub database: Option<String>,
    #[serde(flatten)]
    pub pool: PoolOptions,
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// Retry a statement once when its link turns out to be dead (default: true)
    #[serde(default = "default_retry")]
    pub retry_on_disconnect: bool,
}

fn default_retry() -> bool {
    true
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("pool", &self.pool)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("retry_on_disconnect", &self.retry_on_disconnect)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: user.into(),
            password: password.into(),
            database: None,
            pool: PoolOptions::default(),
            query_timeout_secs: None,
            connect_timeout_secs: None,
            retry_on_disconnect: true,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_query_timeout(mut self, secs: u64) -> Self {
        self.query_timeout_secs = Some(secs);
        self
    }

    pub fn with_retry_on_disconnect(mut self, retry: bool) -> Self {
        self.retry_on_disconnect = retry;
        self
    }

    pub fn port_or_default(&self, engine: Engine) -> u16 {
        self.port.unwrap_or_else(|| engine.default_port())
    }

    /// Per-statement deadline.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(
            self.query_timeout_secs
                .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
        )
    }

    /// Deadline for `connect()`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.host.trim().is_empty() {
            return Err(DbError::invalid_input("host must not be empty"));
        }
        if self.user.trim().is_empty() {
            return Err(DbError::invalid_input("user must not be empty"));
        }
        if self.query_timeout_secs == Some(0) {
            return Err(DbError::invalid_input(
                "query_timeout_secs must be greater than 0",
            ));
        }
        if self.connect_timeout_secs == Some(0) {
            return Err(DbError::invalid_input(
                "connect_timeout_secs must be greater than 0",
            ));
        }
        self.pool.validate().map_err(DbError::invalid_input)
    }
}

/// Command line of the `sqlbridge` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "sqlbridge")]
#[command(version, about = "Run SQL against MySQL or PostgreSQL through one access layer")]
pub struct Config {
    /// Database engine
    #[arg(short, long, value_enum, env = "SQLBRIDGE_ENGINE")]
    pub engine: Engine,

    /// Server host
    #[arg(long, default_value = DEFAULT_HOST, env = "SQLBRIDGE_HOST")]
    pub host: String,

    /// Server port (default: 3306 for MySQL, 5432 for PostgreSQL)
    #[arg(long, env = "SQLBRIDGE_PORT")]
    pub port: Option<u16>,

    /// User name
    #[arg(short, long, env = "SQLBRIDGE_USER")]
    pub user: String,

    /// Password
    #[arg(long, default_value = "", env = "SQLBRIDGE_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Database to use
    #[arg(short = 'D', long, env = "SQLBRIDGE_DATABASE")]
    pub database: Option<String>,

    /// Statements to run, in order. Use `?` for parameters.
    #[arg(value_name = "SQL", required = true)]
    pub sql: Vec<String>,

    /// Positional parameter for a single statement: null, true/false, a number or text.
    /// Can be specified multiple times.
    #[arg(short = 'p', long = "param", value_name = "VALUE", value_parser = parse_param)]
    pub params: Vec<QueryParam>,

    /// Run all statements as one transaction
    #[arg(short, long)]
    pub transaction: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", env = "SQLBRIDGE_FORMAT")]
    pub format: OutputFormat,

    /// Query timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "SQLBRIDGE_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "SQLBRIDGE_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Maximum pooled connections
    #[arg(long, env = "SQLBRIDGE_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    /// Log statements slower than this many milliseconds
    #[arg(long, env = "SQLBRIDGE_SLOW_QUERY_MS")]
    pub slow_query_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "SQLBRIDGE_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SQLBRIDGE_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            engine: Engine::MySql,
            host: DEFAULT_HOST.to_string(),
            port: None,
            user: "root".to_string(),
            password: String::new(),
            database: None,
            sql: Vec::new(),
            params: Vec::new(),
            transaction: false,
            format: OutputFormat::Table,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_connections: None,
            slow_query_ms: None,
            log_level: "warn".to_string(),
            json_logs: false,
        }
    }

    /// Library connection settings derived from the command line.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            pool: PoolOptions {
                max_connections: self.max_connections,
                ..PoolOptions::default()
            },
            query_timeout_secs: Some(self.query_timeout),
            connect_timeout_secs: Some(self.connect_timeout),
            retry_on_disconnect: true,
        }
    }

    pub fn slow_query_threshold(&self) -> Option<Duration> {
        self.slow_query_ms.map(Duration::from_millis)
    }

    /// Check combinations clap cannot express.
    pub fn validate(&self) -> DbResult<()> {
        if !self.params.is_empty() && self.sql.len() > 1 {
            return Err(DbError::invalid_input(
                "--param can only be used with a single statement",
            ));
        }
        self.connection_config().validate()
    }
}

/// Parse a `--param` value.
///
/// `null`, `true` and `false` (any case) map to their SQL counterparts, integers
/// and finite decimals to numbers; anything else is bound as text.
pub fn parse_param(s: &str) -> Result<QueryParam, String> {
    let lower = s.to_ascii_lowercase();
    match lower.as_str() {
        "null" => return Ok(QueryParam::Null),
        "true" => return Ok(QueryParam::Bool(true)),
        "false" => return Ok(QueryParam::Bool(false)),
        _ => {}
    }
    if let Ok(v) = s.parse::<i64>() {
        return Ok(QueryParam::Int(v));
    }
    if let Ok(v) = s.parse::<f64>() {
        if v.is_finite() {
            return Ok(QueryParam::Float(v));
        }
    }
    Ok(QueryParam::String(s.to_string()))
}
