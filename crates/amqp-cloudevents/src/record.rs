// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Structured log record payloads as handed over by the host pipeline.
//!
//! Records decoded from msgpack can carry values JSON has no representation for (non-finite
//! floats, binary map keys, raw bytes). [`Value`] keeps them as-is and its `Serialize` impl
//! rejects them, so encoding a record is an explicit, fallible step.

use chrono::{DateTime, Utc};
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Key/value pairs in record order. Keys must be strings to be encodable. When a key
    /// repeats, the last value wins in the encoded JSON object.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Builds a map value from string keys.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (Value::String(key.into()), value))
                .collect(),
        )
    }

    /// Looks up a string key in a map value. The last entry wins for a repeated key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries
                .iter()
                .rev()
                .find(|(k, _)| matches!(k, Value::String(s) if s == key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Encodes the value as a JSON document.
    pub fn to_json(&self) -> Result<serde_json::Value, Error> {
        serde_json::to_value(self).map_err(Error::from)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::UInt(u) => serializer.serialize_u64(*u),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(f) => Err(S::Error::custom(format!(
                "non-finite float {f} has no JSON representation"
            ))),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => serializer.serialize_str(s),
                Err(e) => Err(S::Error::custom(format!(
                    "binary value is not valid UTF-8: {e}"
                ))),
            },
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    let key = match key {
                        Value::String(s) => s.as_str(),
                        Value::Bytes(bytes) => std::str::from_utf8(bytes).map_err(|e| {
                            S::Error::custom(format!("map key is not valid UTF-8: {e}"))
                        })?,
                        other => {
                            return Err(S::Error::custom(format!(
                                "map key must be a string, got {}",
                                other.type_name()
                            )))
                        }
                    };
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::UInt(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value))),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// Timestamp attached to a record by the host pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventTime {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl EventTime {
    pub fn new(seconds: i64, nanoseconds: u32) -> Self {
        Self {
            seconds,
            nanoseconds,
        }
    }

    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// Converts to UTC with whole-second precision; sub-second parts are dropped.
    pub fn to_datetime(self) -> Result<DateTime<Utc>, Error> {
        DateTime::from_timestamp(self.seconds, 0).ok_or(Error::InvalidTimestamp {
            seconds: self.seconds,
            nanoseconds: self.nanoseconds,
        })
    }
}

impl From<DateTime<Utc>> for EventTime {
    fn from(time: DateTime<Utc>) -> Self {
        Self::new(time.timestamp(), time.timestamp_subsec_nanos())
    }
}

/// One entry of a flushed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: EventTime,
    pub record: Value,
}

impl LogRecord {
    pub fn new(timestamp: EventTime, record: Value) -> Self {
        Self { timestamp, record }
    }
}
