//! Output formatting for query outcomes.
//!
//! Used by the `sqlbridge` binary to print results as JSON, as an ASCII table
//! (like the MySQL CLI) or as a Markdown table.

use crate::models::{QueryOutcome, ResultSet, Value};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use unicode_width::UnicodeWidthStr;

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format
    Json,
    /// ASCII table format (like MySQL CLI)
    #[default]
    Table,
    /// Markdown table format
    Markdown,
}

pub fn format_outcome(outcome: &QueryOutcome, format: OutputFormat) -> String {
    match (format, outcome.result_set()) {
        (OutputFormat::Json, _) => {
            serde_json::to_string_pretty(&outcome_to_json(outcome)).unwrap_or_default()
        }
        (OutputFormat::Table, Some(rs)) => format_as_table(rs, outcome.execution_time_ms()),
        (OutputFormat::Markdown, Some(rs)) => format_as_markdown(rs),
        (OutputFormat::Table, None) => {
            let mut out = format!(
                "Query OK, {} {} affected ({:.2} sec)\n",
                outcome.affected_rows(),
                plural(outcome.affected_rows() as usize),
                outcome.execution_time_ms() as f64 / 1000.0
            );
            if outcome.insert_id() > 0 {
                out.push_str(&format!("Last insert id: {}\n", outcome.insert_id()));
            }
            out
        }
        (OutputFormat::Markdown, None) => format!(
            "*Query OK, {} {} affected*",
            outcome.affected_rows(),
            plural(outcome.affected_rows() as usize)
        ),
    }
}

pub fn outcome_to_json(outcome: &QueryOutcome) -> JsonValue {
    let mut obj = json!({
        "kind": outcome.kind(),
        "affected_rows": outcome.affected_rows(),
        "insert_id": outcome.insert_id(),
        "execution_time_ms": outcome.execution_time_ms(),
    });
    if let (Some(rs), Some(map)) = (outcome.result_set(), obj.as_object_mut()) {
        let columns: Vec<JsonValue> = rs
            .fields()
            .columns()
            .iter()
            .map(|c| json!({ "name": c.name, "type": c.type_name }))
            .collect();
        let rows: Vec<JsonValue> = rs.rows().iter().map(|r| r.to_json()).collect();
        map.insert("columns".to_string(), JsonValue::Array(columns));
        map.insert("row_count".to_string(), JsonValue::from(rs.row_count()));
        map.insert("rows".to_string(), JsonValue::Array(rows));
    }
    obj
}

pub fn format_as_table(rs: &ResultSet, execution_time_ms: u64) -> String {
    if rs.field_count() == 0 {
        return "Empty set".to_string();
    }

    let names: Vec<&str> = rs.fields().columns().iter().map(|c| c.name.as_str()).collect();
    let cells: Vec<Vec<String>> = rs
        .rows()
        .iter()
        .map(|row| row.values().iter().map(Value::to_string).collect())
        .collect();

    let mut widths: Vec<usize> = names.iter().map(|n| n.width()).collect();
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.width());
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    for (name, w) in names.iter().zip(&widths) {
        output.push_str("| ");
        output.push_str(&pad(name, *w, Align::Center));
        output.push(' ');
    }
    output.push_str("|\n");
    output.push_str(&separator);

    for (row, text) in rs.rows().iter().zip(&cells) {
        for ((value, cell), w) in row.values().iter().zip(text).zip(&widths) {
            let align = if value.is_numeric() {
                Align::Right
            } else {
                Align::Left
            };
            output.push_str("| ");
            output.push_str(&pad(cell, *w, align));
            output.push(' ');
        }
        output.push_str("|\n");
    }

    output.push_str(&separator);
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        rs.row_count(),
        plural(rs.row_count()),
        execution_time_ms as f64 / 1000.0
    ));

    output
}

pub fn format_as_markdown(rs: &ResultSet) -> String {
    if rs.field_count() == 0 {
        return "*Empty set*".to_string();
    }

    let mut output = String::new();
    for col in rs.fields().columns() {
        output.push_str(&format!("| {} ", escape_markdown(&col.name)));
    }
    output.push_str("|\n");
    output.push_str(&"|---".repeat(rs.field_count()));
    output.push_str("|\n");

    for row in rs.rows() {
        for value in row.values() {
            output.push_str(&format!("| {} ", escape_markdown(&value.to_string())));
        }
        output.push_str("|\n");
    }

    output.push_str(&format!("\n*{} {}*", rs.row_count(), plural(rs.row_count())));
    output
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
    Center,
}

/// Pad to a display width; `format!` width counts chars, not terminal columns.
fn pad(s: &str, width: usize, align: Align) -> String {
    let fill = width.saturating_sub(s.width());
    let (left, right) = match align {
        Align::Left => (0, fill),
        Align::Right => (fill, 0),
        Align::Center => (fill / 2, fill - fill / 2),
    };
    format!("{}{}{}", " ".repeat(left), s, " ".repeat(right))
}

fn escape_markdown(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "row" } else { "rows" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnMetadata, StatementKind};
    use std::time::Duration;

    fn select_outcome() -> QueryOutcome {
        let rs = ResultSet::new(
            vec![ColumnMetadata::new("id", "INT"), ColumnMetadata::new("name", "VARCHAR")],
            vec![
                vec![Value::Int(1), Value::Text("日本".into())],
                vec![Value::Int(20), Value::Null],
            ],
        );
        QueryOutcome::new(StatementKind::Select, 0, 0, Some(rs), Duration::from_millis(5))
    }

    #[test]
    fn test_table_uses_display_width() {
        let out = format_outcome(&select_outcome(), OutputFormat::Table);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "+----+------+");
        assert_eq!(lines[1], "| id | name |");
        assert_eq!(lines[3], "|  1 | 日本 |");
        assert_eq!(lines[4], "| 20 | NULL |");
        assert!(out.contains("2 rows in set"));
    }

    #[test]
    fn test_markdown() {
        let out = format_outcome(&select_outcome(), OutputFormat::Markdown);
        assert!(out.starts_with("| id | name |\n|---|---|\n| 1 | 日本 |"));
        assert!(out.ends_with("*2 rows*"));
    }

    #[test]
    fn test_json() {
        let json = outcome_to_json(&select_outcome());
        assert_eq!(json["kind"], "SELECT");
        assert_eq!(json["row_count"], 2);
        assert_eq!(json["rows"][1]["name"], JsonValue::Null);
        assert_eq!(json["columns"][0]["type"], "INT");
    }

    #[test]
    fn test_write_outcome() {
        let outcome = QueryOutcome::new(StatementKind::Insert, 7, 1, None, Duration::ZERO);
        let out = format_outcome(&outcome, OutputFormat::Table);
        assert!(out.starts_with("Query OK, 1 row affected"));
        assert!(out.contains("Last insert id: 7"));

        let json = outcome_to_json(&outcome);
        assert!(json.get("rows").is_none());
        assert_eq!(json["insert_id"], 7);
    }

    #[test]
    fn test_markdown_escapes_pipes() {
        assert_eq!(escape_markdown("a|b"), "a\\|b");
    }
}
