//! Integration tests for `Connection` over a scripted native client.

mod common;

use common::{Failure, scripted, scripted_with};
use sqlbridge::db::{ConnectionOptions, RawOutcome};
use sqlbridge::models::{ColumnMetadata, Engine, QueryParam, StatementKind, Value};
use sqlbridge::{DbError, query, query_ex};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_select_one() {
    let (db, _client) = scripted(Engine::MySql);
    assert_ok!(db.connect().await);

    let mut outcome = query(&db, "SELECT 1", &[]).await.unwrap();
    assert_eq!(outcome.kind(), StatementKind::Select);

    let rs = outcome.result_set_mut().unwrap();
    assert_eq!(rs.row_count(), 1);
    assert_eq!(rs.field_count(), 1);
    let row = rs.fetch_row().unwrap();
    assert_eq!(row.get_int(0usize), 1);
    assert!(!rs.more_rows());
}

#[tokio::test]
async fn test_connect_marks_connected() {
    let (db, client) = scripted(Engine::Postgres);
    assert!(!db.is_connected());
    assert_ok!(db.connect().await);
    assert!(db.is_connected());
    assert_eq!(client.log(), vec!["SELECT 1"]);
}

#[tokio::test]
async fn test_connect_failure_is_connection_error() {
    let (db, client) = scripted(Engine::MySql);
    client.fail_on("SELECT 1", Failure::Query);

    let err = assert_err!(db.connect().await);
    assert!(matches!(err, DbError::Connection { .. }));
    assert!(!db.is_connected());
}

#[tokio::test]
async fn test_statement_kind_detection() {
    let (db, _client) = scripted(Engine::MySql);
    let cases = [
        ("  select * from t", StatementKind::Select),
        ("INSERT INTO t VALUES (1)", StatementKind::Insert),
        ("Update t SET a = 1", StatementKind::Update),
        ("delete from t", StatementKind::Delete),
        ("CREATE TABLE t (id INT)", StatementKind::Other),
    ];
    for (sql, kind) in cases {
        let outcome = assert_ok!(db.query(sql, &[]).await);
        assert_eq!(outcome.kind(), kind, "{}", sql);
    }
}

#[tokio::test]
async fn test_mysql_insert_reports_insert_id() {
    let (db, client) = scripted(Engine::MySql);
    let outcome = assert_ok!(
        db.query("INSERT INTO users (name) VALUES (?)", &["ada".into()])
            .await
    );
    assert_eq!(outcome.insert_id(), 42);
    assert_eq!(outcome.affected_rows(), 1);
    assert!(outcome.result_set().is_none());
    assert_eq!(client.log(), vec!["INSERT INTO users (name) VALUES (?)"]);
    assert_eq!(client.params_log()[0], vec![QueryParam::String("ada".into())]);
}

#[tokio::test]
async fn test_postgres_translates_placeholders() {
    let (db, client) = scripted(Engine::Postgres);
    let params = vec![QueryParam::Int(1), QueryParam::String("x".into())];
    assert_ok!(db.query("SELECT * FROM t WHERE a = ? AND b = ?", &params).await);
    assert_ok!(db.query("SELECT '?' AS q", &[]).await);

    assert_eq!(
        client.log(),
        vec!["SELECT * FROM t WHERE a = $1 AND b = $2", "SELECT '?' AS q"]
    );
}

#[tokio::test]
async fn test_postgres_returning_id() {
    let (db, client) = scripted(Engine::Postgres);
    client.respond_with(
        "RETURNING",
        RawOutcome::rows(
            vec![
                ColumnMetadata::new("name", "TEXT"),
                ColumnMetadata::new("id", "INT8"),
            ],
            vec![vec![Value::Text("ada".into()), Value::Int(7)]],
        ),
    );

    let outcome = assert_ok!(
        db.query("INSERT INTO users (name) VALUES (?) RETURNING name, id", &["ada".into()])
            .await
    );
    assert_eq!(outcome.insert_id(), 7);
    assert_eq!(outcome.result_set().unwrap().row_count(), 1);

    // No RETURNING clause: nothing to read the id from.
    let outcome = assert_ok!(db.query("INSERT INTO users (name) VALUES ('bob')", &[]).await);
    assert_eq!(outcome.insert_id(), 0);
}

#[tokio::test]
async fn test_query_error_is_surfaced() {
    let (db, client) = scripted(Engine::MySql);
    assert_ok!(db.connect().await);
    client.fail_on("SELEC ", Failure::Query);

    let (outcome, error) = query_ex(&db, "SELEC 1", &[]).await;
    assert!(outcome.is_none());
    let error = error.unwrap();
    assert_eq!(error.sql_state(), Some("42000"));
    assert!(!error.to_string().is_empty());

    // The engine answered, so the link is still considered alive.
    assert!(db.is_connected());
}

#[tokio::test]
async fn test_retries_once_after_lost_connection() {
    let (db, client) = scripted(Engine::MySql);
    client.lose_connection(1);

    let outcome = assert_ok!(db.query("SELECT 1", &[]).await);
    assert_eq!(outcome.kind(), StatementKind::Select);
    assert_eq!(client.log().len(), 2);
    assert!(db.is_connected());
}

#[tokio::test]
async fn test_retry_is_not_a_loop() {
    let (db, client) = scripted(Engine::MySql);
    client.lose_connection(5);

    let err = assert_err!(db.query("SELECT 1", &[]).await);
    assert!(matches!(err, DbError::Connection { .. }));
    assert_eq!(client.log().len(), 2);
    assert!(!db.is_connected());
}

#[tokio::test]
async fn test_no_retry_when_disabled() {
    let options = ConnectionOptions {
        retry_on_disconnect: false,
        ..ConnectionOptions::default()
    };
    let (db, client) = scripted_with(Engine::MySql, options);
    client.lose_connection(1);

    assert_err!(db.query("SELECT 1", &[]).await);
    assert_eq!(client.log().len(), 1);
    assert!(!db.is_connected());

    // The next success brings the flag back.
    assert_ok!(db.query("SELECT 1", &[]).await);
    assert!(db.is_connected());
}

#[tokio::test]
async fn test_query_rejected_engine_errors_are_not_retried() {
    let (db, client) = scripted(Engine::MySql);
    client.fail_on("bogus", Failure::Query);
    assert_err!(db.query("bogus", &[]).await);
    assert_eq!(client.log().len(), 1);
}

#[tokio::test]
async fn test_statement_deadline() {
    let options = ConnectionOptions {
        query_timeout: Duration::from_millis(50),
        ..ConnectionOptions::default()
    };
    let (db, client) = scripted_with(Engine::MySql, options);
    assert_ok!(db.connect().await);
    client.delay_on("SLEEP", Duration::from_secs(5));

    let err = assert_err!(db.query("SELECT SLEEP(10)", &[]).await);
    assert!(matches!(err, DbError::Timeout { .. }));
    assert!(!db.is_connected());
}

#[tokio::test]
async fn test_query_callback_fires_once() {
    let (db, client) = scripted(Engine::MySql);
    client.fail_on("broken", Failure::Query);

    let calls = Arc::new(Mutex::new(Vec::new()));

    let seen = calls.clone();
    let handle = db.query_callback("SELECT 1", Vec::new(), move |result| {
        seen.lock().unwrap().push(result.map(|o| o.kind()).map_err(|e| e.to_string()));
    });
    assert_ok!(handle.await);

    let seen = calls.clone();
    let handle = db.query_callback("broken", Vec::new(), move |result| {
        seen.lock().unwrap().push(result.map(|o| o.kind()).map_err(|e| e.to_string()));
    });
    assert_ok!(handle.await);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], Ok(StatementKind::Select));
    assert!(calls[1].is_err());
}

#[tokio::test]
async fn test_slow_query_hook() {
    let slow = Arc::new(Mutex::new(Vec::new()));
    let seen = slow.clone();

    let (db, client) = scripted(Engine::MySql);
    let db = db.with_slow_query_hook(Duration::from_millis(30), move |elapsed, sql| {
        seen.lock().unwrap().push((elapsed, sql.to_string()));
    });
    client.delay_on("SLEEP", Duration::from_millis(60));

    assert_ok!(db.query("SELECT SLEEP(0.06)", &[]).await);

    let slow = slow.lock().unwrap();
    assert_eq!(slow.len(), 1);
    assert_eq!(slow[0].1, "SELECT SLEEP(0.06)");
    assert!(slow[0].0 >= Duration::from_millis(30));
}

#[tokio::test]
async fn test_escape_per_engine() {
    let (mysql, _) = scripted(Engine::MySql);
    assert_eq!(
        assert_ok!(mysql.escape(&QueryParam::String("it's".into()))),
        "'it\\'s'"
    );
    assert_eq!(mysql.escape_identifier("a`b"), "`a``b`");
    assert_eq!(mysql.escape_table("shop", "orders"), "`shop`.`orders`");

    let (pg, _) = scripted(Engine::Postgres);
    let err = assert_err!(pg.escape(&QueryParam::String("x".into())));
    assert!(matches!(
        err,
        DbError::UnsupportedOperation {
            engine: Engine::Postgres,
            ..
        }
    ));
    assert_eq!(pg.escape_identifier("a\"b"), "\"a\"\"b\"");
    assert_eq!(pg.escape_table("public", "orders"), "\"public\".\"orders\"");
}

#[tokio::test]
async fn test_destroy_is_idempotent() {
    let (db, client) = scripted(Engine::MySql);

    // Never connected.
    db.destroy().await;
    db.destroy().await;
    assert_eq!(client.closes(), 1);
    assert!(!db.is_connected());

    let err = assert_err!(db.connect().await);
    assert!(matches!(err, DbError::Connection { .. }));

    let err = assert_err!(db.query("SELECT 1", &[]).await);
    assert!(matches!(err, DbError::Connection { .. }));
    // A closed pool is not retried.
    assert!(client.log().is_empty());
}

#[tokio::test]
async fn test_clones_share_state() {
    let (db, _client) = scripted(Engine::MySql);
    let other = db.clone();
    assert_ok!(db.connect().await);
    assert!(other.is_connected());
    other.destroy().await;
    assert!(!db.is_connected());
}

#[tokio::test]
async fn test_server_version() {
    let (db, client) = scripted(Engine::Postgres);
    client.respond_with(
        "version()",
        RawOutcome::rows(
            vec![ColumnMetadata::new("version", "TEXT")],
            vec![vec![Value::Text("PostgreSQL 16.2".into())]],
        ),
    );
    assert_eq!(assert_ok!(db.server_version().await), "PostgreSQL 16.2");
}
