// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::amqp::transport::TransportError;
use std::fmt;

/// Step of the broker setup sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    Dial,
    OpenChannel,
    DeclareQueue,
}

impl fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectStage::Dial => write!(f, "connect to AMQP server"),
            ConnectStage::OpenChannel => write!(f, "open AMQP channel"),
            ConnectStage::DeclareQueue => write!(f, "declare queue"),
        }
    }
}

/// Coarse classification used by callers deciding how to react to an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Connection,
    Serialization,
    Publish,
    Close,
}

/// Errors that can occur while wrapping and publishing events
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to {stage}: {source}")]
    Connection {
        stage: ConnectStage,
        #[source]
        source: TransportError,
    },

    #[error("Failed to serialize event: {0}")]
    Serialization(String),

    #[error("Timestamp out of range: {seconds}s {nanoseconds}ns")]
    InvalidTimestamp { seconds: i64, nanoseconds: u32 },

    #[error("Failed to publish to AMQP: {0}")]
    Publish(#[source] TransportError),

    #[error("Failed to reconnect: {0}")]
    Reconnect(#[source] Box<Error>),

    #[error("Failed to close AMQP {target}: {source}")]
    Close {
        target: &'static str,
        #[source]
        source: TransportError,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidConfig(_) => ErrorKind::Config,
            Error::Connection { .. } => ErrorKind::Connection,
            Error::Serialization(_) | Error::InvalidTimestamp { .. } => ErrorKind::Serialization,
            // A failed reconnect means the record was not delivered.
            Error::Publish(_) | Error::Reconnect(_) => ErrorKind::Publish,
            Error::Close { .. } => ErrorKind::Close,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
