// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log records in, CloudEvents out over AMQP.
//!
//! Each record of a batch is wrapped in a CloudEvents 1.0 JSON envelope and published to an
//! AMQP exchange with `ce-*` headers. A publish that hits a closed connection reconnects once
//! and retries; anything else is counted as a failure and the batch is reported for retry.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod amqp;
pub mod cloudevents;
pub mod config;
pub mod error;
pub mod flusher;
pub mod plugin;
pub mod record;

pub use cloudevents::{Envelope, Wrapper, WrapperConfig};
pub use config::{Config, EnvSettings, Settings};
pub use error::{Error, ErrorKind, Result};
pub use flusher::{BatchResult, FlushStatus, Flusher};
pub use plugin::OutputPlugin;
pub use record::{EventTime, LogRecord, Value};

/// Name the plugin registers under with the host.
pub const PLUGIN_NAME: &str = "amqp_cloudevents";
pub const PLUGIN_DESCRIPTION: &str = "Send events to AMQP queue as CloudEvents";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
