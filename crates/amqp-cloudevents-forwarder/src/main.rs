// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod config;
mod forwarder;
mod input;

use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use amqp_cloudevents::amqp::LapinTransport;
use amqp_cloudevents::{EnvSettings, FlushStatus, OutputPlugin, PLUGIN_NAME, VERSION};

use crate::config::ForwarderConfig;
use crate::forwarder::Forwarder;

const RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[tokio::main]
pub async fn main() -> ExitCode {
    let settings = EnvSettings::default();
    let config = ForwarderConfig::load(&settings);

    let env_filter = format!(
        "lapin=warn,amq_protocol=warn,pinky_swear=warn,{}",
        config.log_level
    );

    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level '{}': {e}", config.log_level);
            return ExitCode::FAILURE;
        }
    };

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");
    info!("Starting {PLUGIN_NAME} forwarder v{VERSION} with tag '{}'", config.tag);

    let mut plugin = OutputPlugin::new(LapinTransport::default());
    if plugin.init(&settings).await == FlushStatus::Error {
        error!("Unable to initialize {PLUGIN_NAME}. Shutting down forwarder.");
        return ExitCode::FAILURE;
    }

    let mut forwarder = Forwarder::new(
        plugin,
        config.tag.clone(),
        config.batch_size,
        config.retry_limit,
        RETRY_BACKOFF,
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut flush_interval = interval(config.flush_interval);
    flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    flush_interval.tick().await; // discard first tick, which is instantaneous

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match input::parse_line(&line) {
                    Ok(Some(record)) => {
                        forwarder.push(record).await;
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Skipping input line: {e}"),
                },
                Ok(None) => {
                    debug!("Reached end of input");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {e}");
                    break;
                }
            },
            _ = flush_interval.tick() => {
                if forwarder.pending() > 0 {
                    forwarder.flush().await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt, flushing pending records");
                break;
            }
        }
    }

    let status = forwarder.shutdown().await;
    info!("Forwarder stopped");
    match status {
        FlushStatus::Ok => ExitCode::SUCCESS,
        FlushStatus::Error | FlushStatus::Retry => ExitCode::FAILURE,
    }
}
