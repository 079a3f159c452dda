// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::{debug, error, info};

use crate::amqp::{Publisher, Transport};
use crate::cloudevents::Wrapper;
use crate::record::LogRecord;

/// Outcome reported back to the host pipeline for a flushed batch.
///
/// The numeric codes follow the Fluent Bit output plugin convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Unrecoverable: the plugin is not initialized or could not connect.
    Error,
    /// Every record was delivered.
    Ok,
    /// At least one record failed; the host should redeliver the whole batch.
    Retry,
}

impl FlushStatus {
    pub fn code(self) -> i32 {
        match self {
            FlushStatus::Error => 0,
            FlushStatus::Ok => 1,
            FlushStatus::Retry => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchResult {
    pub published: usize,
    pub failed: usize,
    pub status: FlushStatus,
}

impl BatchResult {
    pub fn from_counts(published: usize, failed: usize) -> Self {
        let status = if failed > 0 {
            FlushStatus::Retry
        } else {
            FlushStatus::Ok
        };
        Self {
            published,
            failed,
            status,
        }
    }

    /// Result for a flush that could not process anything.
    pub fn error() -> Self {
        Self {
            published: 0,
            failed: 0,
            status: FlushStatus::Error,
        }
    }
}

/// Wraps each record of a batch and publishes it, one at a time, in order.
///
/// A record that cannot be wrapped or published is counted and skipped; it never aborts the
/// rest of the batch. Redelivery on [`FlushStatus::Retry`] republishes the records that already
/// went through, so delivery is at-least-once per batch.
#[derive(Debug)]
pub struct Flusher<T: Transport> {
    wrapper: Wrapper,
    publisher: Publisher<T>,
}

impl<T: Transport> Flusher<T> {
    pub fn new(wrapper: Wrapper, publisher: Publisher<T>) -> Self {
        Self { wrapper, publisher }
    }

    pub fn publisher_mut(&mut self) -> &mut Publisher<T> {
        &mut self.publisher
    }

    pub async fn flush<I>(&mut self, tag: &str, records: I) -> BatchResult
    where
        I: IntoIterator<Item = LogRecord>,
    {
        let mut published = 0;
        let mut failed = 0;

        for LogRecord { timestamp, record } in records {
            let envelope = match self.wrapper.wrap(timestamp, &record, tag) {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!("AMQP | Failed to wrap record as CloudEvent: {e}");
                    failed += 1;
                    continue;
                }
            };

            if let Err(e) = self.publisher.publish(&envelope).await {
                error!("AMQP | Failed to publish CloudEvent {}: {e}", envelope.id);
                failed += 1;
                continue;
            }

            published += 1;
        }

        let result = BatchResult::from_counts(published, failed);
        if result.failed > 0 {
            error!(
                "AMQP | Failed to publish {failed} of {} events with tag '{tag}', requesting retry",
                published + failed
            );
        } else if published > 0 {
            info!("AMQP | Successfully published {published} events to AMQP");
        } else {
            debug!("AMQP | Flushed an empty batch with tag '{tag}'");
        }
        result
    }
}
