// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`Transport`] backed by the `lapin` AMQP 0.9.1 client.

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{
    BasicProperties, Channel, ChannelState, Connection, ConnectionProperties, ConnectionState,
};

use super::transport::{
    BrokerChannel, BrokerConnection, Message, QueueOptions, Transport, TransportError,
};

const REPLY_SUCCESS: u16 = 200;

impl From<lapin::Error> for TransportError {
    fn from(err: lapin::Error) -> Self {
        match err {
            // A dropped socket or missed heartbeat leaves both sides in the Error state.
            lapin::Error::InvalidChannelState(
                ChannelState::Closed | ChannelState::Closing | ChannelState::Error,
            )
            | lapin::Error::InvalidConnectionState(
                ConnectionState::Closed | ConnectionState::Closing | ConnectionState::Error,
            )
            | lapin::Error::IOError(_) => TransportError::ConnectionClosed,
            other => TransportError::Other(other.to_string()),
        }
    }
}

#[derive(Clone, Default)]
pub struct LapinTransport {
    properties: ConnectionProperties,
}

impl LapinTransport {
    pub fn new(properties: ConnectionProperties) -> Self {
        Self { properties }
    }
}

#[async_trait]
impl Transport for LapinTransport {
    type Connection = Connection;

    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        Ok(Connection::connect(url, self.properties.clone()).await?)
    }
}

#[async_trait]
impl BrokerConnection for Connection {
    type Channel = Channel;

    async fn open_channel(&self) -> Result<Channel, TransportError> {
        Ok(self.create_channel().await?)
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(Connection::close(self, REPLY_SUCCESS, "OK").await?)
    }
}

#[async_trait]
impl BrokerChannel for Channel {
    async fn declare_queue(
        &self,
        queue: &str,
        options: QueueOptions,
    ) -> Result<(), TransportError> {
        let options = QueueDeclareOptions {
            passive: false,
            durable: options.durable,
            exclusive: options.exclusive,
            auto_delete: options.auto_delete,
            nowait: options.no_wait,
        };
        self.queue_declare(queue, options, FieldTable::default())
            .await?;
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
    ) -> Result<(), TransportError> {
        // Publisher confirms are not enabled on the channel.
        let _confirm = self
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties(message),
            )
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(Channel::close(self, REPLY_SUCCESS, "OK").await?)
    }
}

fn properties(message: &Message) -> BasicProperties {
    let mut headers = FieldTable::default();
    for (key, value) in &message.headers {
        headers.insert(
            ShortString::from(key.clone()),
            AMQPValue::LongString(LongString::from(value.clone())),
        );
    }
    BasicProperties::default()
        .with_content_type(ShortString::from(message.content_type.clone()))
        .with_headers(headers)
}
