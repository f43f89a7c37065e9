//! Result cursor and row accessors.
//!
//! A [`ResultSet`] owns a fully materialized record set. Rows handed out by the
//! cursor are cheap snapshots sharing the underlying storage, so they stay valid
//! after the cursor moves on, rewinds or is dropped.

use crate::error::{DbError, DbResult};
use crate::models::{ColumnMetadata, Value};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered column set of a record set, with name lookup.
#[derive(Debug, Default)]
pub struct FieldSet {
    columns: Vec<ColumnMetadata>,
    /// Name to first position; later duplicates stay reachable by index only.
    index: HashMap<String, usize>,
}

impl FieldSet {
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            index.entry(col.name.clone()).or_insert(i);
        }
        Self { columns, index }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|c| c.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn column(&self, index: usize) -> Option<&ColumnMetadata> {
        self.columns.get(index)
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }
}

/// Anything a field can be addressed by: a zero-based position or a column name.
pub trait FieldRef {
    fn resolve(&self, fields: &FieldSet) -> Option<usize>;

    /// Human-readable form for error messages.
    fn describe(&self) -> String;
}

impl FieldRef for usize {
    fn resolve(&self, fields: &FieldSet) -> Option<usize> {
        (*self < fields.len()).then_some(*self)
    }

    fn describe(&self) -> String {
        format!("#{}", self)
    }
}

impl FieldRef for &str {
    fn resolve(&self, fields: &FieldSet) -> Option<usize> {
        fields.position(self)
    }

    fn describe(&self) -> String {
        (*self).to_string()
    }
}

impl FieldRef for &String {
    fn resolve(&self, fields: &FieldSet) -> Option<usize> {
        fields.position(self)
    }

    fn describe(&self) -> String {
        (*self).clone()
    }
}

/// One record of a result set.
///
/// Accessors never fail: unknown fields and NULLs read as `None` or a zero
/// value. Use [`Row::is_null`] to tell them apart, or [`Row::try_get`] to get
/// an explicit [`DbError::FieldNotFound`].
#[derive(Debug, Clone)]
pub struct Row {
    fields: Arc<FieldSet>,
    values: Arc<[Value]>,
}

impl Row {
    fn new(fields: Arc<FieldSet>, values: Vec<Value>) -> Self {
        Self {
            fields,
            values: values.into(),
        }
    }

    pub fn get(&self, field: impl FieldRef) -> Option<&Value> {
        field
            .resolve(&self.fields)
            .and_then(|i| self.values.get(i))
    }

    pub fn try_get(&self, field: impl FieldRef) -> DbResult<&Value> {
        match field.resolve(&self.fields).and_then(|i| self.values.get(i)) {
            Some(value) => Ok(value),
            None => Err(DbError::field_not_found(field.describe())),
        }
    }

    /// Text of the field; `None` for NULL or an unknown field.
    pub fn get_string(&self, field: impl FieldRef) -> Option<String> {
        self.get(field).and_then(Value::to_text)
    }

    /// Integer value of the field; zero for NULL or an unknown field.
    pub fn get_int(&self, field: impl FieldRef) -> i64 {
        self.get(field).map(Value::as_i64).unwrap_or(0)
    }

    pub fn get_float(&self, field: impl FieldRef) -> f64 {
        self.get(field).map(Value::as_f64).unwrap_or(0.0)
    }

    /// Exact decimal text of an integer field, `"0"` for NULL or an unknown field.
    ///
    /// Unlike [`Row::get_int`] this never saturates, so `BIGINT UNSIGNED` and
    /// wide `DECIMAL` values keep every digit.
    pub fn get_int64(&self, field: impl FieldRef) -> String {
        self.get(field)
            .map(Value::to_integer_text)
            .unwrap_or_else(|| "0".to_string())
    }

    pub fn get_bool(&self, field: impl FieldRef) -> bool {
        self.get(field).map(Value::as_bool).unwrap_or(false)
    }

    /// True for SQL NULL and for fields that do not exist.
    pub fn is_null(&self, field: impl FieldRef) -> bool {
        self.get(field).is_none_or(Value::is_null)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// JSON object keyed by column name (first occurrence wins on duplicates).
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::with_capacity(self.values.len());
        for (col, value) in self.fields.columns().iter().zip(self.values.iter()) {
            if !map.contains_key(&col.name) {
                map.insert(col.name.clone(), value.to_json());
            }
        }
        JsonValue::Object(map)
    }
}

/// Forward cursor over a materialized record set, with rewind.
#[derive(Debug, Clone)]
pub struct ResultSet {
    fields: Arc<FieldSet>,
    rows: Vec<Row>,
    /// Number of rows consumed; the current row is `rows[position - 1]`.
    position: usize,
}

impl ResultSet {
    /// Build a cursor from decoded rows. A record set without rows has no fields.
    pub fn new(columns: Vec<ColumnMetadata>, rows: Vec<Vec<Value>>) -> Self {
        let fields = if rows.is_empty() {
            Arc::new(FieldSet::default())
        } else {
            Arc::new(FieldSet::new(columns))
        };
        let rows = rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&fields), values))
            .collect();
        Self {
            fields,
            rows,
            position: 0,
        }
    }

    pub fn more_rows(&self) -> bool {
        self.position < self.rows.len()
    }

    /// Advance by one row and return it, or `None` once exhausted.
    pub fn fetch_row(&mut self) -> Option<Row> {
        let row = self.rows.get(self.position)?.clone();
        self.position += 1;
        Some(row)
    }

    /// The row returned by the last [`ResultSet::fetch_row`].
    pub fn current_row(&self) -> Option<&Row> {
        self.position.checked_sub(1).and_then(|i| self.rows.get(i))
    }

    /// Reset to before the first row. No data is re-read from the engine.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_name_to_num(&self, name: &str) -> Option<usize> {
        self.fields.position(name)
    }

    pub fn field_num_to_name(&self, index: usize) -> Option<&str> {
        self.fields.name(index)
    }

    pub fn field_type(&self, index: usize) -> Option<&ColumnMetadata> {
        self.fields.column(index)
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// All rows, independent of the cursor position.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

impl Iterator for ResultSet {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch_row()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.rows.len() - self.position;
        (remaining, Some(remaining))
    }
}
