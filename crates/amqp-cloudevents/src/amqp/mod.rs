// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of envelopes to an AMQP broker.
//!
//! ```text
//!   Publisher ──publish──> BrokerChannel ──> exchange/routing key
//!       │                       ▲
//!       │ connect / reconnect   │ open_channel
//!       v                       │
//!   Transport ──connect──> BrokerConnection
//! ```
//!
//! - **[`transport`]**: the broker client seam (`Transport`, `BrokerConnection`,
//!   `BrokerChannel`) and the wire [`Message`](transport::Message)
//! - **[`lapin_transport`]**: production transport over `lapin`
//! - **[`publisher`]**: connection lifecycle and the one-shot reconnect policy
//! - **`mock`**: scripted transport for tests (feature `test-utils`)

pub mod lapin_transport;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod publisher;
pub mod transport;

pub use lapin_transport::LapinTransport;
pub use publisher::{Publisher, PublisherConfig, MAX_PUBLISH_ATTEMPTS};
pub use transport::{
    BrokerChannel, BrokerConnection, Message, QueueOptions, Transport, TransportError,
};
