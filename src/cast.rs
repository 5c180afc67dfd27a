//! Type casts between raw storage values and domain values.
//!
//! A cast is named in mapping configuration (`int`, `float`, `bool`, `string`,
//! `date`, `json`, `json-assoc`, with a `?` prefix for the nullable variant).
//! Nullable casts pass null through untouched in both directions.

use crate::error::{ConfigError, OrmError};
use crate::value::Value;
use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// strftime-style format shared by every `date` cast of one manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateFormat(String);

impl DateFormat {
    pub fn new(format: impl Into<String>) -> Result<Self, ConfigError> {
        let format = format.into();
        if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Validation(format!("invalid date format '{}'", format)));
        }
        Ok(DateFormat(format))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn format(&self, date: &NaiveDateTime) -> Result<String, OrmError> {
        use std::fmt::Write;
        let mut out = String::new();
        write!(out, "{}", date.format(&self.0))
            .map_err(|_| OrmError::Conversion(format!("cannot format date with '{}'", self.0)))?;
        Ok(out)
    }

    /// Parse a full timestamp, falling back to a date-only format (midnight).
    pub fn parse(&self, s: &str) -> Result<NaiveDateTime, OrmError> {
        NaiveDateTime::parse_from_str(s, &self.0)
            .or_else(|_| NaiveDate::parse_from_str(s, &self.0).map(|d| d.and_time(NaiveTime::MIN)))
            .map_err(|e| OrmError::Conversion(format!("'{}' does not match date format '{}': {}", s, self.0, e)))
    }
}

impl Default for DateFormat {
    fn default() -> Self {
        DateFormat(DEFAULT_DATE_FORMAT.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastKind {
    Integer,
    Float,
    Boolean,
    String,
    Date,
    Json,
    JsonAssoc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cast {
    pub kind: CastKind,
    pub nullable: bool,
}

impl Cast {
    pub const fn new(kind: CastKind) -> Self {
        Cast { kind, nullable: false }
    }

    pub const fn nullable(kind: CastKind) -> Self {
        Cast { kind, nullable: true }
    }

    /// Storage → domain.
    pub fn get(&self, raw: &JsonValue, format: &DateFormat) -> Result<Value, OrmError> {
        if raw.is_null() && self.nullable {
            return Ok(Value::Null);
        }
        Ok(match self.kind {
            CastKind::Integer => Value::Int(json_to_i64(raw)?),
            CastKind::Float => Value::Float(json_to_f64(raw)?),
            CastKind::Boolean => Value::Bool(json_truthy(raw)),
            CastKind::String => Value::Text(json_to_string(raw)),
            CastKind::Date => match raw {
                JsonValue::String(s) => Value::Date(format.parse(s)?),
                other => {
                    return Err(OrmError::Conversion(format!("cannot read {} as a date", other)));
                }
            },
            CastKind::Json | CastKind::JsonAssoc => match raw {
                JsonValue::Null => Value::Null,
                JsonValue::String(s) => match serde_json::from_str(s)? {
                    JsonValue::Null => Value::Null,
                    v => Value::Json(v),
                },
                other => Value::Json(other.clone()),
            },
        })
    }

    /// Domain → storage.
    pub fn set(&self, value: Value, format: &DateFormat) -> Result<JsonValue, OrmError> {
        if value.is_null() && self.nullable {
            return Ok(JsonValue::Null);
        }
        Ok(match self.kind {
            CastKind::Integer => JsonValue::from(value_to_i64(&value)?),
            CastKind::Float => {
                let n = value_to_f64(&value)?;
                serde_json::Number::from_f64(n)
                    .map(JsonValue::Number)
                    .ok_or_else(|| OrmError::Conversion(format!("{} is not a finite number", n)))?
            }
            CastKind::Boolean => JsonValue::from(i64::from(value_truthy(&value))),
            CastKind::String => JsonValue::String(value_to_string(&value, format)?),
            CastKind::Date => match &value {
                Value::Date(d) => JsonValue::String(format.format(d)?),
                Value::Text(s) => JsonValue::String(format.format(&format.parse(s)?)?),
                other => {
                    return Err(OrmError::Conversion(format!("cannot store {:?} as a date", other)));
                }
            },
            CastKind::Json | CastKind::JsonAssoc => {
                let json = match value {
                    Value::Json(v) => v,
                    other => other.into_raw(format)?,
                };
                JsonValue::String(serde_json::to_string(&json)?)
            }
        })
    }
}

impl FromStr for Cast {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (nullable, name) = match s.strip_prefix('?') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let kind = match name {
            "int" | "integer" => CastKind::Integer,
            "float" => CastKind::Float,
            "bool" | "boolean" => CastKind::Boolean,
            "string" => CastKind::String,
            "date" => CastKind::Date,
            "json" => CastKind::Json,
            "json-assoc" => CastKind::JsonAssoc,
            _ => return Err(OrmError::InvalidCastType(s.to_string())),
        };
        Ok(Cast { kind, nullable })
    }
}

impl fmt::Display for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.kind {
            CastKind::Integer => "int",
            CastKind::Float => "float",
            CastKind::Boolean => "bool",
            CastKind::String => "string",
            CastKind::Date => "date",
            CastKind::Json => "json",
            CastKind::JsonAssoc => "json-assoc",
        };
        if self.nullable {
            write!(f, "?{}", name)
        } else {
            f.write_str(name)
        }
    }
}

fn parse_i64(s: &str) -> Result<i64, OrmError> {
    let t = s.trim();
    if let Ok(n) = t.parse::<i64>() {
        return Ok(n);
    }
    t.parse::<f64>()
        .map(|f| f.trunc() as i64)
        .map_err(|_| OrmError::Conversion(format!("'{}' is not an integer", s)))
}

fn parse_f64(s: &str) -> Result<f64, OrmError> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| OrmError::Conversion(format!("'{}' is not a number", s)))
}

fn json_to_i64(raw: &JsonValue) -> Result<i64, OrmError> {
    match raw {
        JsonValue::Null => Ok(0),
        JsonValue::Bool(b) => Ok(i64::from(*b)),
        JsonValue::Number(n) => Ok(n.as_i64().unwrap_or_else(|| n.as_f64().unwrap_or(0.0).trunc() as i64)),
        JsonValue::String(s) => parse_i64(s),
        other => Err(OrmError::Conversion(format!("cannot read {} as an integer", other))),
    }
}

fn json_to_f64(raw: &JsonValue) -> Result<f64, OrmError> {
    match raw {
        JsonValue::Null => Ok(0.0),
        JsonValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        JsonValue::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        JsonValue::String(s) => parse_f64(s),
        other => Err(OrmError::Conversion(format!("cannot read {} as a float", other))),
    }
}

fn json_truthy(raw: &JsonValue) -> bool {
    match raw {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        JsonValue::String(s) => !(s.is_empty() || s == "0"),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(_) => true,
    }
}

fn json_to_string(raw: &JsonValue) -> String {
    match raw {
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_to_i64(value: &Value) -> Result<i64, OrmError> {
    match value {
        Value::Null => Ok(0),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Int(n) => Ok(*n),
        Value::Float(f) => Ok(f.trunc() as i64),
        Value::Text(s) => parse_i64(s),
        Value::Json(v) => json_to_i64(v),
        Value::Date(_) => Err(OrmError::Conversion("cannot store a date as an integer".into())),
    }
}

fn value_to_f64(value: &Value) -> Result<f64, OrmError> {
    match value {
        Value::Null => Ok(0.0),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Int(n) => Ok(*n as f64),
        Value::Float(f) => Ok(*f),
        Value::Text(s) => parse_f64(s),
        Value::Json(v) => json_to_f64(v),
        Value::Date(_) => Err(OrmError::Conversion("cannot store a date as a float".into())),
    }
}

fn value_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(n) => *n != 0,
        Value::Float(f) => *f != 0.0,
        Value::Text(s) => !(s.is_empty() || s == "0"),
        Value::Date(_) => true,
        Value::Json(v) => json_truthy(v),
    }
}

fn value_to_string(value: &Value, format: &DateFormat) -> Result<String, OrmError> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Date(d) => format.format(d)?,
        Value::Json(v) => json_to_string(v),
    })
}
