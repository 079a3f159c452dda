// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Output plugin lifecycle: `init`, `flush`, `exit`.
//!
//! The host drives one [`OutputPlugin`] per configured output instance. All state lives in the
//! plugin value itself, so several instances can run side by side.

use tracing::{debug, error, info};

use crate::amqp::{Publisher, PublisherConfig, Transport};
use crate::cloudevents::Wrapper;
use crate::config::{Config, Settings};
use crate::error::Error;
use crate::flusher::{BatchResult, FlushStatus, Flusher};
use crate::record::LogRecord;

#[derive(Debug)]
pub struct OutputPlugin<T: Transport + Clone> {
    transport: T,
    flusher: Option<Flusher<T>>,
}

impl<T: Transport + Clone> OutputPlugin<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            flusher: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.flusher.is_some()
    }

    /// Loads the configuration and connects to the broker.
    ///
    /// Returns [`FlushStatus::Error`] when the configuration is invalid or the broker cannot be
    /// reached; the plugin then stays uninitialized. Calling `init` on an initialized plugin
    /// closes the previous connection first.
    pub async fn init<S: Settings + ?Sized>(&mut self, settings: &S) -> FlushStatus {
        if self.flusher.is_some() {
            debug!("AMQP | Plugin re-initialized, closing previous connection");
            self.exit().await;
        }

        match self.try_init(settings).await {
            Ok(flusher) => {
                self.flusher = Some(flusher);
                FlushStatus::Ok
            }
            Err(e) => {
                error!("AMQP | Failed to initialize plugin: {e}");
                FlushStatus::Error
            }
        }
    }

    async fn try_init<S: Settings + ?Sized>(&self, settings: &S) -> Result<Flusher<T>, Error> {
        let config = Config::load(settings);
        config.validate()?;

        let publisher =
            Publisher::new(PublisherConfig::from(&config), self.transport.clone()).await?;
        info!(
            "AMQP | Plugin initialized - URL: {}, Queue: {}, Exchange: '{}', Routing key: {}",
            config.redacted_url(),
            config.queue,
            config.exchange,
            config.routing_key
        );
        Ok(Flusher::new(Wrapper::new(config.wrapper_config()), publisher))
    }

    pub async fn flush<I>(&mut self, tag: &str, records: I) -> BatchResult
    where
        I: IntoIterator<Item = LogRecord>,
    {
        match self.flusher.as_mut() {
            Some(flusher) => flusher.flush(tag, records).await,
            None => {
                error!("AMQP | Flush called before the plugin was initialized");
                BatchResult::error()
            }
        }
    }

    /// Closes the broker connection. Close failures are logged; `exit` always reports
    /// [`FlushStatus::Ok`].
    pub async fn exit(&mut self) -> FlushStatus {
        if let Some(mut flusher) = self.flusher.take() {
            if let Err(e) = flusher.publisher_mut().close().await {
                error!("AMQP | Error closing AMQP publisher: {e}");
            }
        }
        FlushStatus::Ok
    }
}
