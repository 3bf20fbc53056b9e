//! Document metadata: dotted keys and tagged values.
//!
//! A document's key/value map is produced by the extractors (flattened JSON
//! paths) and queried by HAVING predicates. Values are scalars or homogeneous
//! arrays; boolean arrays are not representable.

use crate::codec::{Decode, Encode, ReadBuffer, WriteBuffer};
use crate::error::{QuarryError, Result};
use crate::types::{format_datetime, parse_datetime};
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::fmt;

/// A dotted metadata key such as `glossary.GlossDiv.title`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(String);

impl Key {
    /// Parse a dotted key. Empty segments (`a..b`, `.a`, `a.`) are rejected.
    pub fn parse(dotted: &str) -> Result<Self> {
        if dotted.is_empty() || dotted.split('.').any(str::is_empty) {
            return Err(QuarryError::InvalidKey {
                key: dotted.to_string(),
            });
        }
        Ok(Key(dotted.to_string()))
    }

    /// Build a key from already separated segments.
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Result<Self> {
        let joined = segments
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(".");
        Self::parse(&joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Encode for Key {
    fn encode(&self, w: &mut WriteBuffer) {
        w.write_str(&self.0);
    }
}

impl Decode for Key {
    fn decode(r: &mut ReadBuffer<'_>) -> Result<Self> {
        let s = r.read_string()?;
        Key::parse(&s).map_err(|_| QuarryError::corrupted(format!("bad key {:?}", s)))
    }
}

/// Scalar kind of a [`Value`], shared by its array form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    Bool,
    Number,
    String,
    DateTime,
}

impl ValueType {
    fn tag(self) -> u8 {
        match self {
            ValueType::Null => 0,
            ValueType::Bool => 1,
            ValueType::Number => 2,
            ValueType::String => 3,
            ValueType::DateTime => 4,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

/// A metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    DateTime(NaiveDateTime),
    Numbers(Vec<f64>),
    Strings(Vec<String>),
    DateTimes(Vec<NaiveDateTime>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Number(_) | Value::Numbers(_) => ValueType::Number,
            Value::String(_) | Value::Strings(_) => ValueType::String,
            Value::DateTime(_) | Value::DateTimes(_) => ValueType::DateTime,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Value::Numbers(_) | Value::Strings(_) | Value::DateTimes(_)
        )
    }

    /// Element count for arrays, `None` for scalars.
    pub fn array_len(&self) -> Option<usize> {
        match self {
            Value::Numbers(v) => Some(v.len()),
            Value::Strings(v) => Some(v.len()),
            Value::DateTimes(v) => Some(v.len()),
            _ => None,
        }
    }

    /// Build an array value from scalars that must all share one type.
    ///
    /// An empty list becomes an empty number array. Bool, null and nested
    /// arrays cannot be elements.
    pub fn array_from(items: Vec<Value>) -> Result<Value> {
        let first = match items.first() {
            Some(v) => v.value_type(),
            None => return Ok(Value::Numbers(Vec::new())),
        };
        let mismatch = || {
            QuarryError::invalid_value(format!(
                "array elements must all be {} scalars",
                first
            ))
        };
        match first {
            ValueType::Number => items
                .into_iter()
                .map(|v| match v {
                    Value::Number(n) => Ok(n),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Numbers),
            ValueType::String => items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Strings),
            ValueType::DateTime => items
                .into_iter()
                .map(|v| match v {
                    Value::DateTime(d) => Ok(d),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::DateTimes),
            ValueType::Null | ValueType::Bool => Err(QuarryError::invalid_value(format!(
                "{} arrays are not supported",
                first
            ))),
        }
    }

    /// Order two scalars of compatible types.
    ///
    /// A string compared against a datetime is parsed as a datetime first.
    /// Arrays and mismatched types are unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::String(b)) => parse_datetime(b).ok().map(|b| a.cmp(&b)),
            (Value::String(a), Value::DateTime(b)) => parse_datetime(a).ok().map(|a| a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T, F: Fn(&T) -> String>(items: &[T], show: F) -> String {
            items.iter().map(show).collect::<Vec<_>>().join(", ")
        }
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::DateTime(d) => write!(f, "{}", format_datetime(d)),
            Value::Numbers(v) => write!(f, "[{}]", list(v, |n| n.to_string())),
            Value::Strings(v) => write!(f, "[{}]", list(v, |s| format!("{:?}", s))),
            Value::DateTimes(v) => write!(f, "[{}]", list(v, format_datetime)),
        }
    }
}

impl Encode for Value {
    fn encode(&self, w: &mut WriteBuffer) {
        w.write_u8(self.value_type().tag());
        w.write_u8(u8::from(self.is_array()));
        match self {
            Value::Null => {}
            Value::Bool(b) => w.write_u8(u8::from(*b)),
            Value::Number(n) => w.write_f64(*n),
            Value::String(s) => w.write_str(s),
            Value::DateTime(d) => w.write_datetime(d),
            Value::Numbers(v) => v.encode(w),
            Value::Strings(v) => v.encode(w),
            Value::DateTimes(v) => v.encode(w),
        }
    }
}

impl Decode for Value {
    fn decode(r: &mut ReadBuffer<'_>) -> Result<Self> {
        let tag = r.read_u8()?;
        let is_array = r.read_u8()? != 0;
        Ok(match (tag, is_array) {
            (0, false) => Value::Null,
            (1, false) => Value::Bool(r.read_u8()? != 0),
            (2, false) => Value::Number(r.read_f64()?),
            (3, false) => Value::String(r.read_string()?),
            (4, false) => Value::DateTime(r.read_datetime()?),
            (2, true) => Value::Numbers(r.read_vec()?),
            (3, true) => Value::Strings(r.read_vec()?),
            (4, true) => Value::DateTimes(r.read_vec()?),
            (tag, is_array) => {
                return Err(QuarryError::corrupted(format!(
                    "unknown value tag {} (array: {})",
                    tag, is_array
                )))
            }
        })
    }
}
