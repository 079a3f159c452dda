// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Scripted in-memory broker for tests.
//!
//! Every call made through the transport is recorded in order, and failures can be queued per
//! operation. Clones share state, so a test keeps one handle while the publisher owns another.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::transport::{
    BrokerChannel, BrokerConnection, Message, QueueOptions, Transport, TransportError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(String),
    OpenChannel,
    DeclareQueue { queue: String, options: QueueOptions },
    Publish { exchange: String, routing_key: String },
    CloseChannel,
    CloseConnection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub message: Message,
}

impl PublishedMessage {
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.message.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<Call>,
    published: Vec<PublishedMessage>,
    connect_failures: VecDeque<TransportError>,
    open_channel_failures: VecDeque<TransportError>,
    declare_failures: VecDeque<TransportError>,
    publish_failures: VecDeque<Option<TransportError>>,
    channel_close_failures: VecDeque<TransportError>,
    connection_close_failures: VecDeque<TransportError>,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_next_connect(&self, err: TransportError) {
        self.state().connect_failures.push_back(err);
    }

    pub fn fail_open_channel(&self, err: TransportError) {
        self.state().open_channel_failures.push_back(err);
    }

    pub fn fail_declare_queue(&self, err: TransportError) {
        self.state().declare_failures.push_back(err);
    }

    /// Queues a failure for the next publish that has no outcome scripted yet.
    pub fn fail_next_publish(&self, err: TransportError) {
        self.state().publish_failures.push_back(Some(err));
    }

    /// Lets the next publish through; used to interleave successes with scripted failures.
    pub fn succeed_next_publish(&self) {
        self.state().publish_failures.push_back(None);
    }

    pub fn fail_channel_close(&self, err: TransportError) {
        self.state().channel_close_failures.push_back(err);
    }

    pub fn fail_connection_close(&self, err: TransportError) {
        self.state().connection_close_failures.push_back(err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state().published.clone()
    }

    pub fn connects(&self) -> usize {
        self.count(|call| matches!(call, Call::Connect(_)))
    }

    pub fn declared_queues(&self) -> usize {
        self.count(|call| matches!(call, Call::DeclareQueue { .. }))
    }

    pub fn publish_attempts(&self) -> usize {
        self.count(|call| matches!(call, Call::Publish { .. }))
    }

    fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Connection = MockConnection;

    async fn connect(&self, url: &str) -> Result<MockConnection, TransportError> {
        let mut state = self.state();
        state.calls.push(Call::Connect(url.to_string()));
        match state.connect_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(MockConnection {
                transport: self.clone(),
            }),
        }
    }
}

pub struct MockConnection {
    transport: MockTransport,
}

#[async_trait]
impl BrokerConnection for MockConnection {
    type Channel = MockChannel;

    async fn open_channel(&self) -> Result<MockChannel, TransportError> {
        let mut state = self.transport.state();
        state.calls.push(Call::OpenChannel);
        match state.open_channel_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(MockChannel {
                transport: self.transport.clone(),
            }),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.transport.state();
        state.calls.push(Call::CloseConnection);
        state.connection_close_failures.pop_front().map_or(Ok(()), Err)
    }
}

pub struct MockChannel {
    transport: MockTransport,
}

#[async_trait]
impl BrokerChannel for MockChannel {
    async fn declare_queue(
        &self,
        queue: &str,
        options: QueueOptions,
    ) -> Result<(), TransportError> {
        let mut state = self.transport.state();
        state.calls.push(Call::DeclareQueue {
            queue: queue.to_string(),
            options,
        });
        state.declare_failures.pop_front().map_or(Ok(()), Err)
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
    ) -> Result<(), TransportError> {
        let mut state = self.transport.state();
        state.calls.push(Call::Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        });
        if let Some(err) = state.publish_failures.pop_front().flatten() {
            return Err(err);
        }
        state.published.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.transport.state();
        state.calls.push(Call::CloseChannel);
        state.channel_close_failures.pop_front().map_or(Ok(()), Err)
    }
}
