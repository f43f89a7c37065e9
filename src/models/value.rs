//! Materialized column values.
//!
//! Rows are decoded once, when the engine hands them over, into [`Value`]s.
//! Accessors coerce from there; nothing in a `Value` borrows from the driver.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use std::fmt;

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    Bool(bool),
    Int(i64),
    /// Unsigned integers that may not fit in `i64` (MySQL `BIGINT UNSIGNED`)
    UInt(u64),
    Float(f64),
    /// Exact DECIMAL/NUMERIC text as reported by the engine
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Coerce to `i64`. NULL and non-numeric text become 0, fractions truncate,
    /// and out-of-range values saturate.
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Null => 0,
            Self::Bool(b) => i64::from(*b),
            Self::Int(v) => *v,
            Self::UInt(v) => i64::try_from(*v).unwrap_or(i64::MAX),
            Self::Float(v) => *v as i64,
            Self::Decimal(s) | Self::Text(s) => parse_i64(s),
            Self::Bytes(b) => std::str::from_utf8(b).map(parse_i64).unwrap_or(0),
            Self::Json(v) => match v {
                JsonValue::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .unwrap_or(0),
                JsonValue::Bool(b) => i64::from(*b),
                JsonValue::String(s) => parse_i64(s),
                _ => 0,
            },
        }
    }

    /// Coerce to `f64`. NULL and non-numeric text become 0.0.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Int(v) => *v as f64,
            Self::UInt(v) => *v as f64,
            Self::Float(v) => *v,
            Self::Decimal(s) | Self::Text(s) => s.trim().parse().unwrap_or(0.0),
            Self::Bytes(b) => std::str::from_utf8(b)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0.0),
            Self::Json(v) => match v {
                JsonValue::Number(n) => n.as_f64().unwrap_or(0.0),
                JsonValue::Bool(b) => f64::from(u8::from(*b)),
                JsonValue::String(s) => s.trim().parse().unwrap_or(0.0),
                _ => 0.0,
            },
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Text(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "t" | "true" | "y" | "yes" | "on" | "1"
            ),
            Self::Json(JsonValue::Bool(b)) => *b,
            other => other.as_f64() != 0.0,
        }
    }

    /// Text form of the value, `None` for NULL.
    ///
    /// Binary values that are valid UTF-8 come back as text, anything else as base64.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bytes(b) => Some(bytes_to_text(b)),
            Self::Json(v) => Some(v.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Exact base-10 integer text, without going through a float.
    ///
    /// Integers of any width and DECIMAL values keep every digit; fractional
    /// parts are dropped. NULL yields `"0"`.
    pub fn to_integer_text(&self) -> String {
        match self {
            Self::Null => "0".to_string(),
            Self::Int(v) => v.to_string(),
            Self::UInt(v) => v.to_string(),
            Self::Bool(b) => u8::from(*b).to_string(),
            Self::Float(v) => float_integer_text(*v),
            Self::Decimal(s) | Self::Text(s) => integer_text(s),
            Self::Bytes(b) => std::str::from_utf8(b)
                .map(integer_text)
                .unwrap_or_else(|_| "0".to_string()),
            Self::Json(JsonValue::Number(n)) => integer_text(&n.to_string()),
            Self::Json(JsonValue::String(s)) => integer_text(s),
            Self::Json(_) => "0".to_string(),
        }
    }

    /// JSON representation used by the output formatters.
    ///
    /// DECIMAL stays a string so no digits are lost; binary data is base64.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(v) => JsonValue::Number((*v).into()),
            Self::UInt(v) => JsonValue::Number((*v).into()),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string())),
            Self::Decimal(s) | Self::Text(s) => JsonValue::String(s.clone()),
            Self::Bytes(b) => JsonValue::String(STANDARD.encode(b)),
            Self::Json(v) => v.clone(),
        }
    }

    /// Whether the value is numeric (used for right-aligning table cells).
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int(_) | Self::UInt(_) | Self::Float(_) | Self::Decimal(_)
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(v) => write!(f, "{}", v),
            Self::UInt(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Decimal(s) | Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&bytes_to_text(b)),
            Self::Json(v) => write!(f, "{}", v),
        }
    }
}

fn bytes_to_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => STANDARD.encode(bytes),
    }
}

fn parse_i64(s: &str) -> i64 {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        .unwrap_or(0)
}

/// Integer part of a base-10 number in text form, digits preserved.
/// Whole part of a float as decimal text; NaN and infinities read as `"0"`.
fn float_integer_text(v: f64) -> String {
    let whole = v.trunc();
    if !whole.is_finite() || whole == 0.0 {
        return "0".to_string();
    }
    format!("{:.0}", whole)
}

fn integer_text(s: &str) -> String {
    let s = s.trim();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.strip_prefix('+').unwrap_or(s)),
    };
    let whole = digits.split('.').next().unwrap_or("");
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        // Exponent notation and the like: fall back to a float round-trip.
        return match s.parse::<f64>() {
            Ok(v) => float_integer_text(v),
            Err(_) => "0".to_string(),
        };
    }
    let whole = whole.trim_start_matches('0');
    if whole.is_empty() {
        "0".to_string()
    } else {
        format!("{}{}", sign, whole)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}
