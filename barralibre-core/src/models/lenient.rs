//! Tolerant decoding of documents written by any version of the app.
//!
//! Only a missing or non-integer id keeps a record out of the graph. A field
//! that does not decode falls back to its default; fields that are skipped
//! when empty keep the raw value in the record's pass-through map instead,
//! so it is written back unchanged.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::record::RecordId;

/// Deserializes a sequence of records, skipping entries without an id.
///
/// Entries without an identifier cannot be deduplicated or tombstoned, so
/// they never enter the graph. A missing or `null` sequence decodes as empty.
pub(crate) fn lenient_records<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| {
            if value.get("id").and_then(Value::as_i64).is_none() {
                tracing::warn!("Dropping record without an integer id");
                return None;
            }
            match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Dropping malformed record: {}", e);
                    None
                }
            }
        })
        .collect())
}

pub(crate) fn take_id(map: &mut Map<String, Value>) -> Result<RecordId, String> {
    let id = map
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| "record without an integer id".to_string())?;
    map.remove("id");
    Ok(RecordId::new(id))
}

/// Removes and decodes `key`. A value that does not decode is put back.
pub(crate) fn take_field<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = map.remove(key)?;
    if value.is_null() {
        return None;
    }
    match T::deserialize(&value) {
        Ok(decoded) => Some(decoded),
        Err(_) => {
            map.insert(key.to_string(), value);
            None
        }
    }
}

/// Removes `key` and reads it as text. Numbers are accepted.
pub(crate) fn take_text(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    let value = map.remove(key)?;
    as_text(&value).or_else(|| discard(key, &value))
}

pub(crate) fn take_u32(map: &mut Map<String, Value>, key: &str) -> Option<u32> {
    let value = map.remove(key)?;
    as_u32(&value).or_else(|| discard(key, &value))
}

/// Removes `key` and decodes every element that can be decoded.
pub(crate) fn take_list<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Vec<T> {
    match map.remove(key) {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    tracing::warn!("Dropping malformed entry of '{}': {}", key, e);
                    None
                }
            })
            .collect(),
        Some(value) => {
            discard::<()>(key, &value);
            Vec::new()
        }
        None => Vec::new(),
    }
}

pub(crate) fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads a non-negative integer, also from its decimal text ("2").
pub(crate) fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    let number: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// Logs a value that is being replaced by a default.
pub(crate) fn discard<T>(key: &str, value: &Value) -> Option<T> {
    if !value.is_null() {
        tracing::warn!("Ignoring unreadable '{}': {}", key, value);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_take_field_puts_back_unreadable_value() {
        let mut map = object(json!({ "date": "", "when": "2025-01-01" }));
        assert_eq!(take_field::<NaiveDate>(&mut map, "date"), None);
        assert_eq!(map.get("date"), Some(&json!("")));

        assert_eq!(
            take_field::<NaiveDate>(&mut map, "when"),
            NaiveDate::from_ymd_opt(2025, 1, 1)
        );
        assert!(!map.contains_key("when"));
    }

    #[test]
    fn test_scalars_accept_text() {
        assert_eq!(as_u32(&json!("2")), Some(2));
        assert_eq!(as_u32(&json!(3)), Some(3));
        assert_eq!(as_u32(&json!(-1)), None);
        assert_eq!(as_u32(&json!("dos")), None);
        assert_eq!(as_f64(&json!("72,5")), Some(72.5));
        assert_eq!(as_text(&json!(5)), Some("5".to_string()));
        assert_eq!(as_text(&json!({})), None);
    }

    #[test]
    fn test_take_list_skips_bad_entries() {
        let mut map = object(json!({ "ids": [1, "x", 3], "other": 5 }));
        assert_eq!(take_list::<u32>(&mut map, "ids"), vec![1, 3]);
        assert!(take_list::<u32>(&mut map, "other").is_empty());
        assert!(take_list::<u32>(&mut map, "missing").is_empty());
    }
}
