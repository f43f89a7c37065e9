//! sqlbridge - run SQL against MySQL or PostgreSQL from the command line.

use sqlbridge::config::Config;
use sqlbridge::create_connection;
use sqlbridge::format::format_outcome;
use sqlbridge::models::Statement;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout carries only results.
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    init_tracing(&config);
    config.validate()?;

    info!(
        engine = %config.engine,
        host = %config.host,
        "Starting sqlbridge v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut db = create_connection(config.engine, &config.connection_config())?;
    if let Some(threshold) = config.slow_query_threshold() {
        db = db.with_slow_query_hook(threshold, |elapsed, sql| {
            warn!(elapsed_ms = elapsed.as_millis() as u64, sql = %sql, "Slow query");
        });
    }

    let result = run(&db, &config).await;
    db.destroy().await;
    result
}

async fn run(
    db: &sqlbridge::Connection,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    db.connect().await?;

    if config.transaction {
        let batch: Vec<Statement> = config
            .sql
            .iter()
            .map(|sql| Statement::new(sql.as_str()).with_params(config.params.clone()))
            .collect();
        let outcomes = db.transaction(&batch).await?;
        for outcome in &outcomes {
            println!("{}", format_outcome(outcome, config.format));
        }
        return Ok(());
    }

    for (index, sql) in config.sql.iter().enumerate() {
        // Parameters belong to the single statement; validate() enforces it.
        match db.query(sql, &config.params).await {
            Ok(outcome) => println!("{}", format_outcome(&outcome, config.format)),
            Err(e) => {
                warn!(statement_index = index, error = %e, "Statement failed");
                if let Some(suggestion) = e.suggestion() {
                    eprintln!("Hint: {}", suggestion);
                }
                return Err(e.into());
            }
        }
    }

    Ok(())
}
