//! Field deserializers for server payloads.
//!
//! A field with the wrong JSON type becomes `None` (or an empty list)
//! instead of failing the whole payload, so one bad field never costs the
//! rest of an event. Use with `#[serde(default, deserialize_with = "...")]`.

use crate::{flag_from, id_from};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Free text. Anything but a string is dropped.
pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Codes and identifiers, which servers send as strings or numbers.
pub fn id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(id_from(&Value::deserialize(deserializer)?))
}

/// Booleans that may arrive as numbers or strings.
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(flag_from(&Value::deserialize(deserializer)?))
}

/// A nested record, or `None` when it does not have the expected shape.
pub fn record<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Value::deserialize(deserializer)?;
    if !raw.is_object() {
        return Ok(None);
    }
    Ok(serde_json::from_value(raw).ok())
}

/// A list keeping only the entries that parse.
pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Sample {
        #[serde(deserialize_with = "super::text")]
        note: Option<String>,
        #[serde(deserialize_with = "super::id")]
        code: Option<String>,
        #[serde(deserialize_with = "super::list")]
        counts: Vec<u32>,
    }

    #[test]
    fn test_wrong_types_degrade_to_defaults() {
        let sample: Sample =
            serde_json::from_value(json!({"note": 42, "code": 1234, "counts": "many"})).unwrap();
        assert_eq!(sample.note, None);
        assert_eq!(sample.code.as_deref(), Some("1234"));
        assert!(sample.counts.is_empty());
    }

    #[test]
    fn test_list_keeps_parseable_entries() {
        let sample: Sample = serde_json::from_value(json!({"counts": [1, "x", 3]})).unwrap();
        assert_eq!(sample.counts, vec![1, 3]);
    }

    #[test]
    fn test_missing_fields_default() {
        let sample: Sample = serde_json::from_value(json!({})).unwrap();
        assert_eq!(sample.note, None);
        assert_eq!(sample.code, None);
    }
}
