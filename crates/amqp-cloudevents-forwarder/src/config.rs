// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use amqp_cloudevents::Settings;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_TAG: &str = "forwarder";
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRY_LIMIT: u32 = 3;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Settings of the stdin host loop. Broker settings are read separately by the plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderConfig {
    /// Tag attached to every forwarded batch
    pub tag: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Redeliveries of a batch answered with `Retry`
    pub retry_limit: u32,
    pub log_level: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            tag: DEFAULT_TAG.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            retry_limit: DEFAULT_RETRY_LIMIT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ForwarderConfig {
    pub fn load<S: Settings + ?Sized>(settings: &S) -> Self {
        let mut config = Self::default();
        let lookup = |key: &str| settings.get(key).filter(|value| !value.trim().is_empty());

        if let Some(tag) = lookup("tag") {
            config.tag = tag;
        }
        if let Some(batch_size) = parse_or_warn::<usize>("batch_size", lookup("batch_size")) {
            if batch_size == 0 {
                warn!("Ignoring batch_size 0, keeping {}", config.batch_size);
            } else {
                config.batch_size = batch_size;
            }
        }
        if let Some(secs) = parse_or_warn::<u64>("flush_interval", lookup("flush_interval")) {
            if secs == 0 {
                warn!("Ignoring flush_interval 0, keeping {:?}", config.flush_interval);
            } else {
                config.flush_interval = Duration::from_secs(secs);
            }
        }
        if let Some(retry_limit) = parse_or_warn::<u32>("retry_limit", lookup("retry_limit")) {
            config.retry_limit = retry_limit;
        }
        if let Some(log_level) = lookup("log_level") {
            config.log_level = log_level.to_lowercase();
        }

        config
    }
}

fn parse_or_warn<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for '{key}': {raw:?}");
            None
        }
    }
}
