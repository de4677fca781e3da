//! SQL value types and conversion from JSON record values.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::{Result, SinkError};

use super::schema::FieldKind;
use super::sql_type::SqlType;

/// Type hint for NULL values so drivers can bind a typed NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    I64,
    F64,
    String,
    Decimal,
    DateTime,
    Date,
    Time,
}

/// SQL value for a single cell.
///
/// Uses `Cow` for text so borrowed data can flow through without copying;
/// call [`SqlValue::into_owned`] to detach it from the source.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue<'a> {
    /// NULL with type hint.
    Null(SqlNullType),
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(Cow<'a, str>),
    Decimal(Decimal),
    /// Timestamp without timezone.
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl<'a> SqlValue<'a> {
    #[must_use]
    pub fn into_owned(self) -> SqlValue<'static> {
        match self {
            SqlValue::Null(t) => SqlValue::Null(t),
            SqlValue::Bool(v) => SqlValue::Bool(v),
            SqlValue::I64(v) => SqlValue::I64(v),
            SqlValue::F64(v) => SqlValue::F64(v),
            SqlValue::Text(v) => SqlValue::Text(Cow::Owned(v.into_owned())),
            SqlValue::Decimal(v) => SqlValue::Decimal(v),
            SqlValue::DateTime(v) => SqlValue::DateTime(v),
            SqlValue::Date(v) => SqlValue::Date(v),
            SqlValue::Time(v) => SqlValue::Time(v),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Typed NULL for a column type.
    pub fn null_for(sql_type: &SqlType) -> SqlValue<'static> {
        SqlValue::Null(match sql_type {
            SqlType::Text { .. } | SqlType::Other(_) => SqlNullType::String,
            SqlType::Integer => SqlNullType::I64,
            SqlType::Numeric { .. } => SqlNullType::Decimal,
            SqlType::Float => SqlNullType::F64,
            SqlType::Boolean => SqlNullType::Bool,
            SqlType::Date => SqlNullType::Date,
            SqlType::Time => SqlNullType::Time,
            SqlType::Timestamp => SqlNullType::DateTime,
        })
    }

    /// Convert a JSON record value into a value of the column's type.
    ///
    /// `kind` is the declared property kind; it decides how booleans are
    /// spelled in text columns.
    pub fn from_json(
        value: &Value,
        kind: FieldKind,
        sql_type: &SqlType,
        column: &str,
    ) -> Result<SqlValue<'static>> {
        if value.is_null() {
            return Ok(Self::null_for(sql_type));
        }

        let invalid = |expected: &str| {
            SinkError::invalid_value(column, format!("expected {}, got {}", expected, value))
        };

        let converted = match sql_type {
            SqlType::Text { .. } | SqlType::Other(_) => SqlValue::Text(Cow::Owned(match value {
                Value::String(s) => s.clone(),
                Value::Bool(b) if kind == FieldKind::Boolean => {
                    (if *b { "1" } else { "0" }).to_string()
                }
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other => serde_json::to_string(other)?,
            })),
            SqlType::Integer => match value {
                Value::Number(n) => match n.as_i64() {
                    Some(i) => SqlValue::I64(i),
                    None => match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                            SqlValue::I64(f as i64)
                        }
                        _ => return Err(invalid("an integer")),
                    },
                },
                Value::String(s) => {
                    SqlValue::I64(s.trim().parse().map_err(|_| invalid("an integer"))?)
                }
                _ => return Err(invalid("an integer")),
            },
            SqlType::Numeric { .. } => match value {
                Value::Number(n) => SqlValue::Decimal(
                    parse_decimal(&n.to_string()).ok_or_else(|| invalid("a number"))?,
                ),
                Value::String(s) => SqlValue::Decimal(
                    parse_decimal(s.trim()).ok_or_else(|| invalid("a number"))?,
                ),
                _ => return Err(invalid("a number")),
            },
            SqlType::Float => match value {
                Value::Number(n) => SqlValue::F64(n.as_f64().ok_or_else(|| invalid("a number"))?),
                Value::String(s) => {
                    SqlValue::F64(s.trim().parse().map_err(|_| invalid("a number"))?)
                }
                _ => return Err(invalid("a number")),
            },
            SqlType::Boolean => match value {
                Value::Bool(b) => SqlValue::Bool(*b),
                Value::Number(n) if n.as_i64() == Some(0) => SqlValue::Bool(false),
                Value::Number(n) if n.as_i64() == Some(1) => SqlValue::Bool(true),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "t" | "1" | "yes" => SqlValue::Bool(true),
                    "false" | "f" | "0" | "no" => SqlValue::Bool(false),
                    _ => return Err(invalid("a boolean")),
                },
                _ => return Err(invalid("a boolean")),
            },
            SqlType::Date => {
                let s = value.as_str().ok_or_else(|| invalid("a date string"))?;
                SqlValue::Date(parse_date(s).ok_or_else(|| invalid("a date"))?)
            }
            SqlType::Time => {
                let s = value.as_str().ok_or_else(|| invalid("a time string"))?;
                SqlValue::Time(parse_time(s).ok_or_else(|| invalid("a time"))?)
            }
            SqlType::Timestamp => {
                let s = value.as_str().ok_or_else(|| invalid("a timestamp string"))?;
                SqlValue::DateTime(parse_timestamp(s).ok_or_else(|| invalid("a timestamp"))?)
            }
        };

        Ok(converted)
    }
}

/// Type-appropriate empty value substituted for NULL when null replacement
/// is enabled. Temporal kinds have no empty value and stay NULL.
pub fn null_default(kind: FieldKind) -> Option<Value> {
    match kind {
        FieldKind::String | FieldKind::Unknown => Some(Value::String(String::new())),
        FieldKind::Integer | FieldKind::Number => Some(Value::from(0)),
        FieldKind::Boolean => Some(Value::Bool(false)),
        FieldKind::Object => Some(Value::Object(Default::default())),
        FieldKind::Array => Some(Value::Array(Vec::new())),
        FieldKind::Date | FieldKind::Time | FieldKind::DateTime => None,
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Parse RFC 3339 (normalized to UTC) or a naive timestamp; a bare date is
/// taken as midnight.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
