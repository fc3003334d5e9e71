// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Standalone collector daemon: listens for event packets over UDP,
//! decodes and clock-corrects them on a worker pool, and logs each event.
//! Storage sinks replace the logging handler in real deployments.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use eventline_collector::{process_packets, PacketHandler, ProcessorConfig, ReceivedPacket, UdpListener};

const DEFAULT_ADDR: &str = "0.0.0.0:9002";

/// Logs every decoded event with its corrected timestamp. Stands in for
/// a storage sink behind the same handler seam.
struct LogHandler;

#[async_trait]
impl PacketHandler for LogHandler {
    async fn handle(&self, packet: ReceivedPacket) -> anyhow::Result<()> {
        for event in &packet.packet.events {
            let event_time: DateTime<Utc> = packet.event_time(event).into();
            info!(
                "{} {}.{} correction={}ns source={} {}",
                event_time.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
                event.scope.join("."),
                event.name,
                packet.clock_correction_ns,
                packet.source,
                event.tags_string(),
            );
        }
        Ok(())
    }
}

#[tokio::main]
pub async fn main() {
    let log_level = env::var("EVENTLINE_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(log_level).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let addr = env::var("EVENTLINE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let workers = env::var("EVENTLINE_WORKERS")
        .ok()
        .and_then(|val| val.parse::<usize>().ok())
        .unwrap_or_else(|| thread::available_parallelism().map_or(1, usize::from));

    let listener = match UdpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("could not bind udp listener on {addr}: {e}");
            return;
        }
    };
    info!("listening for event packets on {addr} with {workers} workers");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to install shutdown signal handler: {e}");
                return;
            }
            info!("shutting down");
            cancel.cancel();
        }
    });

    let config = ProcessorConfig {
        workers,
        queue_depth: workers * 2,
    };
    process_packets(listener, Arc::new(LogHandler), config, cancel).await;

    info!("collector drained and stopped");
}
