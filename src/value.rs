//! # Value model
//!
//! The JSON-serialisable scalar model shared by filter right-hand-sides,
//! projected columns, and the `order_by`/`limit` literals. Distinct from a
//! bare `serde_json::Value` only in that timestamps round-trip through an
//! explicit tag (`{"$timestamp": "..."}`) rather than being indistinguishable
//! strings, and that object-typed values preserve key order (`Map` is an
//! association list, not a `HashMap`) so re-serialisation is byte-stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;

const TIMESTAMP_TAG: &str = "$timestamp";

/// A filter/projection scalar, list, or ordered map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to the JSON form used on the wire, tagging timestamps
    /// explicitly so `from_json` can distinguish them from plain strings.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.clone()),
            Value::Timestamp(ts) => {
                let mut obj = serde_json::Map::new();
                obj.insert(
                    TIMESTAMP_TAG.to_string(),
                    Json::String(ts.to_rfc3339()),
                );
                Json::Object(obj)
            }
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in entries {
                    obj.insert(k.clone(), v.to_json());
                }
                Json::Object(obj)
            }
        }
    }

    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(obj) => {
                if obj.len() == 1 {
                    if let Some(Json::String(ts)) = obj.get(TIMESTAMP_TAG) {
                        if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
                            return Value::Timestamp(parsed.with_timezone(&Utc));
                        }
                    }
                }
                Value::Map(
                    obj.iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_round_trips_through_json() {
        let ts = Utc::now();
        let value = Value::Timestamp(ts);
        let json = value.to_json();
        let back = Value::from_json(&json);
        match back {
            Value::Timestamp(parsed) => {
                assert_eq!(parsed.timestamp_millis(), ts.timestamp_millis());
            }
            other => panic!("expected timestamp, got {other:?}"),
        }
    }

    #[test]
    fn map_preserves_key_order() {
        let value = Value::Map(vec![
            ("b".to_string(), Value::Int(1)),
            ("a".to_string(), Value::Int(2)),
        ]);
        let json = value.to_json();
        let rendered = json.to_string();
        assert!(rendered.find("\"b\"").unwrap() < rendered.find("\"a\"").unwrap());
    }

    #[test]
    fn plain_string_is_not_mistaken_for_timestamp() {
        let value = Value::Str("hello".to_string());
        let json = value.to_json();
        assert_eq!(Value::from_json(&json), value);
    }
}
