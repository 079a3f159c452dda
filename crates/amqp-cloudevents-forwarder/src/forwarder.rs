// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use amqp_cloudevents::amqp::Transport;
use amqp_cloudevents::{FlushStatus, LogRecord, OutputPlugin};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Buffers records and hands them to the plugin as batches, redelivering on `Retry`.
pub struct Forwarder<T: Transport + Clone> {
    plugin: OutputPlugin<T>,
    tag: String,
    batch_size: usize,
    retry_limit: u32,
    backoff: Duration,
    batch: Vec<LogRecord>,
}

impl<T: Transport + Clone> Forwarder<T> {
    /// `backoff` is multiplied by the attempt number between redeliveries.
    pub fn new(
        plugin: OutputPlugin<T>,
        tag: String,
        batch_size: usize,
        retry_limit: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            plugin,
            tag,
            batch_size,
            retry_limit,
            backoff,
            batch: Vec::with_capacity(batch_size),
        }
    }

    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Buffers a record, flushing when the batch is full.
    pub async fn push(&mut self, record: LogRecord) -> Option<FlushStatus> {
        self.batch.push(record);
        if self.batch.len() >= self.batch_size {
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// Delivers the buffered records. An empty buffer is a no-op.
    pub async fn flush(&mut self) -> FlushStatus {
        if self.batch.is_empty() {
            return FlushStatus::Ok;
        }

        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        let mut retries = 0;
        loop {
            let result = self.plugin.flush(&self.tag, batch.iter().cloned()).await;
            match result.status {
                FlushStatus::Ok => {
                    debug!("Delivered batch of {} records", batch.len());
                    return FlushStatus::Ok;
                }
                FlushStatus::Error => {
                    error!("Dropping batch of {} records: plugin error", batch.len());
                    return FlushStatus::Error;
                }
                FlushStatus::Retry if retries >= self.retry_limit => {
                    error!(
                        "Dropping batch of {} records after {retries} retries, {} still failing",
                        batch.len(),
                        result.failed
                    );
                    return FlushStatus::Retry;
                }
                FlushStatus::Retry => {
                    retries += 1;
                    let delay = self.backoff * retries;
                    warn!(
                        "{} of {} records failed, retry {retries}/{} in {delay:?}",
                        result.failed,
                        batch.len(),
                        self.retry_limit
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Flushes what is left and closes the plugin.
    pub async fn shutdown(mut self) -> FlushStatus {
        let status = self.flush().await;
        self.plugin.exit().await;
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amqp_cloudevents::amqp::mock::{Call, MockTransport};
    use amqp_cloudevents::amqp::TransportError;
    use amqp_cloudevents::{EventTime, Value};
    use std::collections::HashMap;
    use tracing_test::traced_test;

    async fn forwarder(
        transport: &MockTransport,
        batch_size: usize,
        retry_limit: u32,
    ) -> Forwarder<MockTransport> {
        let mut plugin = OutputPlugin::new(transport.clone());
        assert_eq!(
            plugin.init(&HashMap::<String, String>::new()).await,
            FlushStatus::Ok
        );
        Forwarder::new(
            plugin,
            "stdin".to_string(),
            batch_size,
            retry_limit,
            Duration::ZERO,
        )
    }

    fn record(msg: &str) -> LogRecord {
        LogRecord::new(
            EventTime::new(1_714_564_800, 0),
            Value::map([("msg", Value::from(msg))]),
        )
    }

    #[tokio::test]
    async fn test_flushes_when_batch_is_full() {
        let transport = MockTransport::new();
        let mut forwarder = forwarder(&transport, 2, 0).await;

        assert_eq!(forwarder.push(record("a")).await, None);
        assert_eq!(forwarder.pending(), 1);
        assert_eq!(forwarder.push(record("b")).await, Some(FlushStatus::Ok));
        assert_eq!(forwarder.pending(), 0);

        let published = transport.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].body_json()["fluentbittag"], "stdin");
    }

    #[tokio::test]
    async fn test_retry_redelivers_whole_batch() {
        let transport = MockTransport::new();
        let mut forwarder = forwarder(&transport, 10, 3).await;
        forwarder.push(record("a")).await;
        forwarder.push(record("b")).await;

        transport.succeed_next_publish();
        transport.fail_next_publish(TransportError::Other("resource locked".into()));

        assert_eq!(forwarder.flush().await, FlushStatus::Ok);
        assert_eq!(transport.publish_attempts(), 4);
        assert_eq!(transport.published().len(), 3);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_gives_up_after_retry_limit() {
        let transport = MockTransport::new();
        let mut forwarder = forwarder(&transport, 10, 2).await;
        forwarder.push(record("a")).await;
        for _ in 0..3 {
            transport.fail_next_publish(TransportError::Other("resource locked".into()));
        }

        assert_eq!(forwarder.flush().await, FlushStatus::Retry);
        assert_eq!(transport.publish_attempts(), 3);
        assert_eq!(forwarder.pending(), 0);
        assert!(logs_contain("Dropping batch of 1 records after 2 retries"));
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let transport = MockTransport::new();
        let mut forwarder = forwarder(&transport, 10, 0).await;
        assert_eq!(forwarder.flush().await, FlushStatus::Ok);
        assert_eq!(transport.publish_attempts(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_and_closes() {
        let transport = MockTransport::new();
        let mut forwarder = forwarder(&transport, 10, 0).await;
        forwarder.push(record("a")).await;

        assert_eq!(forwarder.shutdown().await, FlushStatus::Ok);
        assert_eq!(transport.published().len(), 1);
        let calls = transport.calls();
        assert_eq!(
            calls[calls.len() - 2..],
            [Call::CloseChannel, Call::CloseConnection]
        );
    }
}
