// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use amqp_cloudevents::amqp::mock::MockTransport;
use amqp_cloudevents::{EventTime, FlushStatus, LogRecord, OutputPlugin, Value};
use std::collections::HashMap;

/// 2024-05-01T12:00:00Z
pub const BASE_SECONDS: i64 = 1_714_564_800;

/// Record `{"msg": <msg>}` stamped `offset` seconds after [`BASE_SECONDS`]
pub fn message_record(msg: &str, offset: i64) -> LogRecord {
    LogRecord::new(
        EventTime::new(BASE_SECONDS + offset, 0),
        Value::map([("msg", Value::from(msg))]),
    )
}

/// Record whose payload cannot be encoded as JSON
pub fn unencodable_record() -> LogRecord {
    LogRecord::new(
        EventTime::new(BASE_SECONDS, 0),
        Value::map([("ratio", Value::Float(f64::NAN))]),
    )
}

pub fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Plugin initialized with default settings against a fresh mock broker
pub async fn initialized_plugin() -> (OutputPlugin<MockTransport>, MockTransport) {
    let transport = MockTransport::new();
    let mut plugin = OutputPlugin::new(transport.clone());
    let status = plugin.init(&settings(&[])).await;
    assert_eq!(status, FlushStatus::Ok, "plugin failed to initialize");
    (plugin, transport)
}
