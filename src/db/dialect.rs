//! Per-engine SQL dialect rules.
//!
//! A [`Dialect`] is chosen once, when a connection is built, and holds every
//! engine difference the access layer has to paper over: placeholder syntax,
//! quoting and literal escaping, transaction control statements, and how the
//! generated identifier of an INSERT is recovered. All functions are pure.

use crate::db::client::RawOutcome;
use crate::error::{DbError, DbResult};
use crate::models::{Engine, QueryOutcome, QueryParam, ResultSet, StatementKind};
use std::borrow::Cow;
use std::fmt::Write as _;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySql,
    Postgres,
}

impl Dialect {
    pub fn for_engine(engine: Engine) -> Self {
        match engine {
            Engine::MySql => Self::MySql,
            Engine::Postgres => Self::Postgres,
        }
    }

    pub fn engine(&self) -> Engine {
        match self {
            Self::MySql => Engine::MySql,
            Self::Postgres => Engine::Postgres,
        }
    }

    /// Rewrite `?` markers into the engine's native placeholders.
    ///
    /// MySQL takes `?` as is. PostgreSQL gets `$1, $2, ...` in left-to-right
    /// order, but only when parameters are supplied: without parameters a `?`
    /// may be literal text (or a JSONB operator) and the statement is left alone.
    /// Quoted literals are not skipped.
    pub fn translate_placeholders<'a>(&self, sql: &'a str, params: &[QueryParam]) -> Cow<'a, str> {
        match self {
            Self::MySql => Cow::Borrowed(sql),
            Self::Postgres if params.is_empty() || !sql.contains('?') => Cow::Borrowed(sql),
            Self::Postgres => {
                let mut out = String::with_capacity(sql.len() + 8);
                let mut n = 0usize;
                for ch in sql.chars() {
                    if ch == '?' {
                        n += 1;
                        // Writing to a String cannot fail.
                        let _ = write!(out, "${}", n);
                    } else {
                        out.push(ch);
                    }
                }
                Cow::Owned(out)
            }
        }
    }

    pub fn quote_char(&self) -> char {
        match self {
            Self::MySql => '`',
            Self::Postgres => '"',
        }
    }

    /// Quote an identifier, doubling any embedded quote character.
    ///
    /// The name is treated as a single identifier; dots are not split.
    pub fn escape_identifier(&self, name: &str) -> String {
        let q = self.quote_char();
        let mut out = String::with_capacity(name.len() + 2);
        out.push(q);
        for ch in name.chars() {
            if ch == q {
                out.push(q);
            }
            out.push(ch);
        }
        out.push(q);
        out
    }

    /// `database.table`, each part quoted separately.
    pub fn escape_table(&self, database: &str, table: &str) -> String {
        format!(
            "{}.{}",
            self.escape_identifier(database),
            self.escape_identifier(table)
        )
    }

    /// Inline literal for manual SQL construction.
    ///
    /// PostgreSQL refuses: whether a backslash is an escape depends on the
    /// server's `standard_conforming_strings`, so only bound parameters are safe.
    pub fn escape_literal(&self, value: &QueryParam) -> DbResult<String> {
        match self {
            Self::Postgres => Err(DbError::unsupported(
                Engine::Postgres,
                "escape",
                "Client-side literal escaping is not safe for PostgreSQL; bind the value as a parameter instead",
            )),
            Self::MySql => mysql_literal(value),
        }
    }

    /// Statement that opens a transaction.
    pub fn begin_statement(&self) -> &'static str {
        match self {
            Self::MySql => "START TRANSACTION",
            Self::Postgres => "BEGIN",
        }
    }

    pub fn commit_statement(&self) -> &'static str {
        "COMMIT"
    }

    pub fn rollback_statement(&self) -> &'static str {
        "ROLLBACK"
    }

    /// Generated identifier of a statement.
    ///
    /// MySQL reports it in the execution metadata. PostgreSQL has no such field;
    /// for non-SELECT statements that returned rows (`RETURNING ...`), the first
    /// row's `id` column is used, else its first column. Anything else is zero.
    pub fn generated_id(&self, kind: StatementKind, raw: &RawOutcome) -> u64 {
        match self {
            Self::MySql => raw.last_insert_id.unwrap_or(0),
            Self::Postgres => {
                if kind == StatementKind::Select {
                    return 0;
                }
                let Some(first) = raw.rows.first() else {
                    return 0;
                };
                let index = raw
                    .columns
                    .iter()
                    .position(|c| c.name == "id")
                    .unwrap_or(0);
                first
                    .get(index)
                    .and_then(|v| v.to_integer_text().parse::<u64>().ok())
                    .unwrap_or(0)
            }
        }
    }

    /// Normalize a raw engine result into a [`QueryOutcome`].
    pub fn outcome(&self, sql: &str, raw: RawOutcome, elapsed: Duration) -> QueryOutcome {
        let kind = StatementKind::detect(sql);
        let insert_id = self.generated_id(kind, &raw);
        let affected_rows = raw.rows_affected;
        let result_set = if raw.rows.is_empty() {
            None
        } else {
            Some(ResultSet::new(raw.columns, raw.rows))
        };
        QueryOutcome::new(kind, insert_id, affected_rows, result_set, elapsed)
    }
}

/// MySQL literal escaping, matching the client library's rules.
fn mysql_literal(value: &QueryParam) -> DbResult<String> {
    Ok(match value {
        QueryParam::Null => "NULL".to_string(),
        QueryParam::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        QueryParam::Int(v) => v.to_string(),
        QueryParam::Float(v) if v.is_finite() => v.to_string(),
        QueryParam::Float(v) => {
            return Err(DbError::invalid_input(format!(
                "{} has no SQL literal form",
                v
            )));
        }
        QueryParam::String(s) => quote_mysql_string(s),
        QueryParam::Bytes(b) => {
            let mut hex = String::with_capacity(b.len() * 2 + 3);
            hex.push_str("X'");
            for byte in b {
                let _ = write!(hex, "{:02X}", byte);
            }
            hex.push('\'');
            hex
        }
        QueryParam::Json(v) => quote_mysql_string(&v.to_string()),
    })
}

fn quote_mysql_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\0' => out.push_str("\\0"),
            '\x08' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
