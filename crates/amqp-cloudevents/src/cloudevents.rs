// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! CloudEvents 1.0 envelopes in structured JSON mode.
//!
//! Every flushed record becomes one [`Envelope`]:
//!
//! ```text
//! {
//!   "specversion": "1.0",
//!   "id": "5b0c3c58-...",
//!   "source": "fluent-bit",
//!   "type": "fluent-bit.log",
//!   "datacontenttype": "application/json",
//!   "time": "2024-05-01T12:00:00Z",
//!   "data": { ...record... },
//!   "fluentbittag": "app"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::record::{EventTime, Value};

pub const SPEC_VERSION: &str = "1.0";
pub const APPLICATION_JSON: &str = "application/json";
/// Extension attribute carrying the host pipeline tag.
pub const TAG_EXTENSION: &str = "fluentbittag";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub specversion: String,
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub datacontenttype: String,
    pub time: DateTime<Utc>,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluentbittag: Option<String>,
}

impl Envelope {
    pub fn tag(&self) -> Option<&str> {
        self.fluentbittag.as_deref()
    }

    /// Encodes the envelope in structured mode.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(Error::from)
    }
}

/// Static attributes stamped on every event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperConfig {
    pub source: String,
    pub event_type: String,
}

#[derive(Debug, Clone)]
pub struct Wrapper {
    config: WrapperConfig,
}

impl Wrapper {
    pub fn new(config: WrapperConfig) -> Self {
        Self { config }
    }

    /// Converts a record into an envelope with a freshly generated id.
    ///
    /// The tag is attached only when non-empty.
    pub fn wrap(&self, timestamp: EventTime, record: &Value, tag: &str) -> Result<Envelope, Error> {
        let time = timestamp.to_datetime()?;
        let data = record.to_json()?;

        Ok(Envelope {
            specversion: SPEC_VERSION.to_string(),
            id: Uuid::new_v4().to_string(),
            source: self.config.source.clone(),
            event_type: self.config.event_type.clone(),
            datacontenttype: APPLICATION_JSON.to_string(),
            time,
            data,
            fluentbittag: (!tag.is_empty()).then(|| tag.to_string()),
        })
    }
}
