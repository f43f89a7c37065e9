//! Statement execution over sqlx executors.
//!
//! Each engine submodule runs one statement on anything that implements
//! `sqlx::Executor` (the shared pool or a dedicated connection) and collects
//! rows and execution metadata from a single `fetch_many` stream:
//! - `Either::Left` items carry affected-row counts (and MySQL's last insert id)
//! - `Either::Right` items are rows, decoded into [`Value`](crate::models::Value)s
//!
//! Errors stay as `sqlx::Error` so the caller can map them with its pool settings.

use crate::db::client::RawOutcome;
use crate::db::types::RowDecode;
use crate::models::QueryParam;
use futures_util::TryStreamExt;
use sqlx::Either;

pub(crate) mod mysql {
    use super::*;
    use crate::db::params::bind_all_mysql;
    use sqlx::{Executor, MySql};

    pub async fn execute<'e, 'c: 'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> Result<RawOutcome, sqlx::Error>
    where
        E: 'e + Executor<'c, Database = MySql>,
    {
        // Without parameters, use the text protocol: some statements
        // (e.g. CREATE PROCEDURE) cannot be prepared.
        let mut stream = if params.is_empty() {
            executor.fetch_many(sql)
        } else {
            executor.fetch_many(bind_all_mysql(sql, params))
        };

        let mut outcome = RawOutcome::default();
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => {
                    outcome.rows_affected += done.rows_affected();
                    if done.last_insert_id() > 0 {
                        outcome.last_insert_id = Some(done.last_insert_id());
                    }
                }
                Either::Right(row) => {
                    if outcome.columns.is_empty() {
                        outcome.columns = row.column_metadata();
                    }
                    outcome.rows.push(row.decode_values());
                }
            }
        }
        Ok(outcome)
    }
}

pub(crate) mod postgres {
    use super::*;
    use crate::db::params::bind_all_postgres;
    use sqlx::{Executor, Postgres};

    pub async fn execute<'e, 'c: 'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> Result<RawOutcome, sqlx::Error>
    where
        E: 'e + Executor<'c, Database = Postgres>,
    {
        let mut stream = if params.is_empty() {
            executor.fetch_many(sql)
        } else {
            executor.fetch_many(bind_all_postgres(sql, params))
        };

        let mut outcome = RawOutcome::default();
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => outcome.rows_affected += done.rows_affected(),
                Either::Right(row) => {
                    if outcome.columns.is_empty() {
                        outcome.columns = row.column_metadata();
                    }
                    outcome.rows.push(row.decode_values());
                }
            }
        }
        Ok(outcome)
    }
}
