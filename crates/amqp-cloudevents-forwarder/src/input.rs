// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Newline-delimited JSON input.
//!
//! A line is either `[timestamp, record]`, with the timestamp in integer or fractional epoch
//! seconds, or a bare record that gets stamped with the time it was read.

use amqp_cloudevents::{EventTime, LogRecord, Value};
use serde_json::Value as JsonValue;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected [timestamp, record], got an array of {0} elements")]
    ArrayShape(usize),
    #[error("invalid timestamp: {0}")]
    Timestamp(JsonValue),
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<LogRecord>, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let record = match serde_json::from_str::<JsonValue>(line)? {
        JsonValue::Array(mut pair) => {
            if pair.len() != 2 {
                return Err(InputError::ArrayShape(pair.len()));
            }
            let record = pair.pop().unwrap_or_default();
            let timestamp = pair.pop().unwrap_or_default();
            LogRecord::new(parse_timestamp(timestamp)?, Value::from(record))
        }
        other => LogRecord::new(EventTime::now(), Value::from(other)),
    };
    Ok(Some(record))
}

fn parse_timestamp(value: JsonValue) -> Result<EventTime, InputError> {
    if let Some(seconds) = value.as_i64() {
        return Ok(EventTime::new(seconds, 0));
    }

    match value.as_f64() {
        Some(ts) if ts.is_finite() && ts >= i64::MIN as f64 && ts < i64::MAX as f64 => {
            let seconds = ts.floor();
            let nanoseconds = ((ts - seconds) * 1e9).round().min(999_999_999.0) as u32;
            Ok(EventTime::new(seconds as i64, nanoseconds))
        }
        _ => Err(InputError::Timestamp(value)),
    }
}
