// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::cloudevents::{Envelope, APPLICATION_JSON};
use crate::error::Error;

/// Failure reported by the broker client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection (or the channel riding on it) was torn down, locally or by the broker.
    #[error("connection closed")]
    ConnectionClosed,
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, TransportError::ConnectionClosed)
    }
}

/// Queue declaration flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    pub auto_delete: bool,
    pub exclusive: bool,
    pub no_wait: bool,
}

/// A message ready to go on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub body: Vec<u8>,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
}

impl Message {
    /// Structured-mode body plus `ce-*` headers, so brokers can route and filter without
    /// parsing the body.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, Error> {
        Ok(Self {
            body: envelope.to_json_bytes()?,
            content_type: APPLICATION_JSON.to_string(),
            headers: vec![
                ("ce-specversion".to_string(), envelope.specversion.clone()),
                ("ce-type".to_string(), envelope.event_type.clone()),
                ("ce-source".to_string(), envelope.source.clone()),
                ("ce-id".to_string(), envelope.id.clone()),
            ],
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Opens connections to a broker.
#[async_trait]
pub trait Transport: Send + Sync {
    type Connection: BrokerConnection;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError>;
}

#[async_trait]
pub trait BrokerConnection: Send + Sync {
    type Channel: BrokerChannel;

    async fn open_channel(&self) -> Result<Self::Channel, TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn declare_queue(&self, queue: &str, options: QueueOptions)
        -> Result<(), TransportError>;

    /// Publishes without the mandatory or immediate flags; unroutable messages may be dropped
    /// by the broker.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
    ) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}
