//! Engine type classification and row decoding.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the engine's column type name
//! 2. Engine-specific decoders turn each column into a [`Value`]
//!
//! Columns whose typed decode fails fall back to the raw wire bytes, kept as
//! text when they are valid UTF-8.

use crate::models::{ColumnMetadata, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::error::BoxDynError;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};
use std::fmt::Write as _;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    /// Dates, times and timestamps
    Temporal,
    Unknown,
}

impl TypeCategory {
    pub fn from_type_name(type_name: &str) -> Self {
        categorize_type(type_name)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Decimal)
    }
}

/// Classify an engine type name into a logical category.
///
/// Names are matched whole (after dropping a MySQL `UNSIGNED` suffix) so that
/// e.g. `INTERVAL` or `POINT` are not mistaken for integers.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.trim().to_ascii_lowercase();
    let base = lower.strip_suffix(" unsigned").unwrap_or(&lower);

    match base {
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "int2" | "int4"
        | "int8" | "serial" | "smallserial" | "bigserial" | "year" | "oid" => TypeCategory::Integer,
        "float" | "double" | "real" | "float4" | "float8" | "double precision" => {
            TypeCategory::Float
        }
        "decimal" | "numeric" => TypeCategory::Decimal,
        "bool" | "boolean" => TypeCategory::Boolean,
        "char" | "varchar" | "text" | "tinytext" | "mediumtext" | "longtext" | "bpchar"
        | "name" | "citext" | "enum" | "set" | "character" | "character varying" => {
            TypeCategory::Text
        }
        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "bytea" => {
            TypeCategory::Binary
        }
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "date" | "time" | "datetime" | "timestamp" | "timestamptz" | "timetz" | "interval" => {
            TypeCategory::Temporal
        }
        _ => TypeCategory::Unknown,
    }
}

fn is_unsigned(type_name: &str) -> bool {
    type_name.to_ascii_lowercase().ends_with(" unsigned")
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        categorize_type(ty.name()) == TypeCategory::Decimal
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, BoxDynError> {
        // MySQL sends DECIMAL as text in both protocols.
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        categorize_type(ty.name()) == TypeCategory::Decimal
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => numeric_to_string(value.as_bytes()?).map(RawDecimal),
        }
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render PostgreSQL's binary NUMERIC (base-10000 digit groups) as exact decimal text.
///
/// Layout: `ndigits: i16, weight: i16, sign: u16, dscale: u16, digits: [i16; ndigits]`.
pub fn numeric_to_string(bytes: &[u8]) -> Result<String, BoxDynError> {
    if bytes.len() < 8 {
        return Err("NUMERIC value shorter than its header".into());
    }
    let read = |at: usize| u16::from_be_bytes([bytes[at], bytes[at + 1]]);

    let ndigits = usize::from(read(0));
    let weight = i32::from(read(2) as i16);
    let sign = read(4);
    let dscale = usize::from(read(6));

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }
    if bytes.len() < 8 + ndigits * 2 {
        return Err(format!("NUMERIC value truncated: expected {} digit groups", ndigits).into());
    }

    let digits: Vec<i16> = (0..ndigits).map(|i| read(8 + i * 2) as i16).collect();
    let group = |i: i32| -> i16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG && ndigits > 0 {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                write!(out, "{}", group(i))?;
            } else {
                write!(out, "{:04}", group(i))?;
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while frac.len() < dscale {
            write!(frac, "{:04}", group(i))?;
            i += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }

    Ok(out)
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Turns one engine row into column metadata and materialized values.
pub trait RowDecode {
    fn column_metadata(&self) -> Vec<ColumnMetadata>;
    fn decode_values(&self) -> Vec<Value>;
}

impl RowDecode for MySqlRow {
    fn column_metadata(&self) -> Vec<ColumnMetadata> {
        columns_of(self)
    }

    fn decode_values(&self) -> Vec<Value> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| mysql::decode_column(self, idx, col.type_info().name()))
            .collect()
    }
}

impl RowDecode for PgRow {
    fn column_metadata(&self) -> Vec<ColumnMetadata> {
        columns_of(self)
    }

    fn decode_values(&self) -> Vec<Value> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| postgres::decode_column(self, idx, col.type_info().name()))
            .collect()
    }
}

fn columns_of<R: Row>(row: &R) -> Vec<ColumnMetadata> {
    row.columns()
        .iter()
        .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
        .collect()
}

/// Decode one column as `T`. `None` means the typed decode failed and the
/// caller should fall back to the raw bytes.
fn decode_as<'r, R, T>(row: &'r R, idx: usize, wrap: impl FnOnce(T) -> Value) -> Option<Value>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => Some(wrap(v)),
        Ok(None) => Some(Value::Null),
        Err(e) => {
            tracing::debug!(column = idx, error = %e, "Typed decode failed, using raw value");
            None
        }
    }
}

fn raw_to_value(bytes: &[u8]) -> Value {
    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => Value::Text(s),
        Err(e) => Value::Bytes(e.into_bytes()),
    }
}

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
        let decoded = match categorize_type(type_name) {
            TypeCategory::Integer if is_unsigned(type_name) => {
                decode_as::<_, u64>(row, idx, Value::UInt)
            }
            TypeCategory::Integer => decode_as::<_, i64>(row, idx, Value::Int),
            TypeCategory::Float => decode_as::<_, f64>(row, idx, Value::Float)
                .or_else(|| decode_as::<_, f32>(row, idx, |v| Value::Float(f64::from(v)))),
            TypeCategory::Decimal => decode_as::<_, RawDecimal>(row, idx, |d| Value::Decimal(d.0)),
            TypeCategory::Boolean => decode_as::<_, bool>(row, idx, Value::Bool),
            TypeCategory::Text => decode_as::<_, String>(row, idx, Value::Text),
            TypeCategory::Binary => decode_as::<_, Vec<u8>>(row, idx, Value::Bytes),
            TypeCategory::Json => decode_as::<_, JsonValue>(row, idx, Value::Json),
            TypeCategory::Temporal => decode_temporal(row, idx, type_name),
            TypeCategory::Uuid | TypeCategory::Unknown => None,
        };
        decoded.unwrap_or_else(|| decode_raw(row, idx))
    }

    fn decode_temporal(row: &MySqlRow, idx: usize, type_name: &str) -> Option<Value> {
        match type_name.to_ascii_lowercase().as_str() {
            "date" => decode_as::<_, NaiveDate>(row, idx, |d| Value::Text(d.to_string())),
            "time" => decode_as::<_, NaiveTime>(row, idx, |t| Value::Text(t.to_string())),
            "datetime" | "timestamp" => {
                decode_as::<_, NaiveDateTime>(row, idx, |t| Value::Text(t.to_string()))
            }
            _ => None,
        }
    }

    fn decode_raw(row: &MySqlRow, idx: usize) -> Value {
        let Ok(raw) = row.try_get_raw(idx) else {
            return Value::Null;
        };
        if raw.is_null() {
            return Value::Null;
        }
        match <&[u8] as Decode<sqlx::MySql>>::decode(raw) {
            Ok(bytes) => raw_to_value(bytes),
            Err(e) => {
                tracing::error!(column = idx, error = %e, "Failed to read raw MySQL value");
                Value::Null
            }
        }
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Value {
        let decoded = match categorize_type(type_name) {
            TypeCategory::Integer => decode_as::<_, i64>(row, idx, Value::Int)
                .or_else(|| decode_as::<_, i32>(row, idx, |v| Value::Int(i64::from(v))))
                .or_else(|| decode_as::<_, i16>(row, idx, |v| Value::Int(i64::from(v)))),
            TypeCategory::Float => decode_as::<_, f64>(row, idx, Value::Float)
                .or_else(|| decode_as::<_, f32>(row, idx, |v| Value::Float(f64::from(v)))),
            TypeCategory::Decimal => decode_as::<_, RawDecimal>(row, idx, |d| Value::Decimal(d.0)),
            TypeCategory::Boolean => decode_as::<_, bool>(row, idx, Value::Bool),
            TypeCategory::Text => decode_as::<_, String>(row, idx, Value::Text),
            TypeCategory::Binary => decode_as::<_, Vec<u8>>(row, idx, Value::Bytes),
            TypeCategory::Json => decode_as::<_, JsonValue>(row, idx, Value::Json),
            TypeCategory::Uuid => {
                decode_as::<_, uuid::Uuid>(row, idx, |u| Value::Text(u.to_string()))
            }
            TypeCategory::Temporal => decode_temporal(row, idx, type_name),
            TypeCategory::Unknown => None,
        };
        decoded.unwrap_or_else(|| decode_raw(row, idx))
    }

    fn decode_temporal(row: &PgRow, idx: usize, type_name: &str) -> Option<Value> {
        match type_name.to_ascii_lowercase().as_str() {
            "date" => decode_as::<_, NaiveDate>(row, idx, |d| Value::Text(d.to_string())),
            "time" => decode_as::<_, NaiveTime>(row, idx, |t| Value::Text(t.to_string())),
            "timestamp" => decode_as::<_, NaiveDateTime>(row, idx, |t| Value::Text(t.to_string())),
            "timestamptz" => {
                decode_as::<_, DateTime<Utc>>(row, idx, |t| Value::Text(t.to_rfc3339()))
            }
            _ => None,
        }
    }

    fn decode_raw(row: &PgRow, idx: usize) -> Value {
        let Ok(raw) = row.try_get_raw(idx) else {
            return Value::Null;
        };
        if raw.is_null() {
            return Value::Null;
        }
        match <&[u8] as Decode<sqlx::Postgres>>::decode(raw) {
            Ok(bytes) => raw_to_value(bytes),
            Err(e) => {
                tracing::error!(column = idx, error = %e, "Failed to read raw PostgreSQL value");
                Value::Null
            }
        }
    }
}
