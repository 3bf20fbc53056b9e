//! Flattening JSON documents into dotted key/value metadata.

use crate::document::KvMap;
use crate::error::{QuarryError, Result};
use crate::types::parse_datetime;
use crate::value::{Key, Value};
use serde_json::Value as Json;

/// Flatten a parsed JSON document into dotted keys.
///
/// Objects contribute one key segment per field. An array holding at least
/// one object keeps only its object elements, each under its original index
/// (`items.0.name`, `items.2.name`). Any other array must hold scalars of one
/// type and becomes a single array value. Strings in `YYYY-MM-DD HH:MM:SS`
/// form become datetimes.
pub fn flatten(root: &Json) -> Result<KvMap> {
    let mut out = KvMap::new();
    let mut path = Vec::new();
    flatten_into(root, &mut path, &mut out)?;
    Ok(out)
}

/// Parse and flatten JSON text.
pub fn flatten_str(text: &[u8]) -> Result<KvMap> {
    let root: Json = serde_json::from_slice(text)?;
    flatten(&root)
}

fn flatten_into(node: &Json, path: &mut Vec<String>, out: &mut KvMap) -> Result<()> {
    match node {
        Json::Object(fields) => {
            for (name, child) in fields {
                path.push(name.clone());
                flatten_into(child, path, out)?;
                path.pop();
            }
        }
        Json::Array(items) if items.iter().any(Json::is_object) => {
            for (i, item) in items.iter().enumerate().filter(|(_, v)| v.is_object()) {
                path.push(i.to_string());
                flatten_into(item, path, out)?;
                path.pop();
            }
        }
        leaf => {
            // a bare scalar document has nothing to name it by
            if path.is_empty() {
                return Ok(());
            }
            out.insert(Key::from_segments(path)?, to_value(leaf)?);
        }
    }
    Ok(())
}

fn to_value(node: &Json) -> Result<Value> {
    match node {
        Json::Array(items) => {
            let scalars = items.iter().map(to_scalar).collect::<Result<Vec<_>>>()?;
            Value::array_from(demote_partial_datetimes(scalars))
        }
        other => to_scalar(other),
    }
}

fn to_scalar(node: &Json) -> Result<Value> {
    Ok(match node {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(
            n.as_f64()
                .ok_or_else(|| QuarryError::invalid_value(format!("number {} out of range", n)))?,
        ),
        Json::String(s) => match parse_datetime(s) {
            Ok(dt) => Value::DateTime(dt),
            Err(_) => Value::String(s.clone()),
        },
        Json::Array(_) => return Err(QuarryError::invalid_value("nested arrays are not supported")),
        Json::Object(_) => return Err(QuarryError::invalid_value("unexpected object in array")),
    })
}

/// Turn datetimes back into strings when an array mixes them with plain
/// strings, so `["2020-01-01 00:00:00", "later"]` stays a string array.
fn demote_partial_datetimes(items: Vec<Value>) -> Vec<Value> {
    let has_string = items.iter().any(|v| matches!(v, Value::String(_)));
    let has_datetime = items.iter().any(|v| matches!(v, Value::DateTime(_)));
    if !(has_string && has_datetime) {
        return items;
    }
    items
        .into_iter()
        .map(|v| match v {
            Value::DateTime(dt) => Value::String(crate::types::format_datetime(&dt)),
            other => other,
        })
        .collect()
}
