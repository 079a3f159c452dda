// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use tracing::{debug, error, info, warn};

use super::transport::{
    BrokerChannel, BrokerConnection, Message, QueueOptions, Transport, TransportError,
};
use crate::cloudevents::Envelope;
use crate::config::{redact_url, Config};
use crate::error::{ConnectStage, Error};

/// Upper bound on sends per [`Publisher::publish`] call: the first try plus one retry after a
/// reconnect.
pub const MAX_PUBLISH_ATTEMPTS: usize = 2;

/// The subset of [`Config`] the publisher needs to address the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    pub url: String,
    pub exchange: String,
    pub routing_key: String,
    pub queue: String,
    pub queue_options: QueueOptions,
}

impl From<&Config> for PublisherConfig {
    fn from(config: &Config) -> Self {
        Self {
            url: config.url.clone(),
            exchange: config.exchange.clone(),
            routing_key: config.routing_key.clone(),
            queue: config.queue.clone(),
            queue_options: QueueOptions {
                durable: config.durable,
                auto_delete: config.auto_delete,
                exclusive: config.exclusive,
                no_wait: config.no_wait,
            },
        }
    }
}

/// A connection and the channel opened on it. They are opened and closed together.
struct Session<C: BrokerConnection> {
    connection: C,
    channel: C::Channel,
}

impl<C: BrokerConnection> Session<C> {
    async fn open<T>(transport: &T, config: &PublisherConfig) -> Result<Self, Error>
    where
        T: Transport<Connection = C>,
    {
        let connection = transport
            .connect(&config.url)
            .await
            .map_err(|source| Error::Connection {
                stage: ConnectStage::Dial,
                source,
            })?;

        let channel = match connection.open_channel().await {
            Ok(channel) => channel,
            Err(source) => {
                if let Err(e) = connection.close().await {
                    error!("AMQP | Failed to close connection during cleanup: {e}");
                }
                return Err(Error::Connection {
                    stage: ConnectStage::OpenChannel,
                    source,
                });
            }
        };

        let session = Session {
            connection,
            channel,
        };

        if !config.queue.is_empty() {
            let declared = session
                .channel
                .declare_queue(&config.queue, config.queue_options)
                .await;
            if let Err(source) = declared {
                // Failures are logged by close and must not replace the declare error.
                let _ = session.close("cleanup").await;
                return Err(Error::Connection {
                    stage: ConnectStage::DeclareQueue,
                    source,
                });
            }
        }

        Ok(session)
    }

    /// Closes the channel, then the connection. Both are attempted; the last failure wins.
    async fn close(self, context: &str) -> Result<(), Error> {
        let mut result = Ok(());

        if let Err(source) = self.channel.close().await {
            error!("AMQP | Failed to close channel during {context}: {source}");
            result = Err(Error::Close {
                target: "channel",
                source,
            });
        }

        if let Err(source) = self.connection.close().await {
            error!("AMQP | Failed to close connection during {context}: {source}");
            result = Err(Error::Close {
                target: "connection",
                source,
            });
        }

        result
    }
}

/// Publishes CloudEvents envelopes to an AMQP exchange.
///
/// The publisher exclusively owns one connection/channel pair. It is not meant to be shared
/// between concurrent flushes; `publish` and `close` take `&mut self`.
///
/// A publish that fails because the connection was closed triggers exactly one reconnect and
/// one retry. Anything else is returned to the caller, which decides whether the whole batch
/// should be redelivered.
pub struct Publisher<T: Transport> {
    config: PublisherConfig,
    transport: T,
    session: Option<Session<T::Connection>>,
}

impl<T: Transport> Publisher<T> {
    /// Connects to the broker and declares the configured queue, if any.
    pub async fn new(config: PublisherConfig, transport: T) -> Result<Self, Error> {
        let mut publisher = Self {
            config,
            transport,
            session: None,
        };
        publisher.connect().await?;
        Ok(publisher)
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn connect(&mut self) -> Result<(), Error> {
        let session = Session::open(&self.transport, &self.config).await?;
        self.session = Some(session);

        info!(
            "AMQP | Connection established - URL: {}, Queue: {}",
            redact_url(&self.config.url),
            self.config.queue
        );
        Ok(())
    }

    /// Tears the current session down, if any, and opens a fresh one.
    async fn reconnect(&mut self) -> Result<(), Error> {
        if let Some(session) = self.session.take() {
            let _ = session.close("reconnect").await;
        }

        self.connect()
            .await
            .map_err(|e| Error::Reconnect(Box::new(e)))?;

        info!("AMQP | Successfully reconnected");
        Ok(())
    }

    pub async fn publish(&mut self, envelope: &Envelope) -> Result<(), Error> {
        let message = Message::from_envelope(envelope)?;

        let mut attempt = 1;
        loop {
            let err = match self.send(&message).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if !err.is_connection_closed() || attempt >= MAX_PUBLISH_ATTEMPTS {
                return Err(Error::Publish(err));
            }

            warn!(
                "AMQP | Connection closed while publishing event {}, reconnecting",
                envelope.id
            );
            self.reconnect().await?;
            attempt += 1;
        }
    }

    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        match &self.session {
            Some(session) => {
                session
                    .channel
                    .publish(&self.config.exchange, &self.config.routing_key, message)
                    .await
            }
            // Left behind by a failed reconnect.
            None => Err(TransportError::ConnectionClosed),
        }
    }

    /// Closes the channel and then the connection.
    ///
    /// Closing a publisher that holds no session is a no-op.
    pub async fn close(&mut self) -> Result<(), Error> {
        let Some(session) = self.session.take() else {
            debug!("AMQP | Publisher already disconnected");
            return Ok(());
        };

        session.close("shutdown").await?;
        info!("AMQP | Connection closed");
        Ok(())
    }
}

impl<T: Transport> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("url", &redact_url(&self.config.url))
            .field("exchange", &self.config.exchange)
            .field("routing_key", &self.config.routing_key)
            .field("queue", &self.config.queue)
            .field("connected", &self.is_connected())
            .finish()
    }
}
