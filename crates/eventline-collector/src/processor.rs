// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decode worker pool.
//!
//! One reader task pulls datagrams off the socket and feeds a bounded
//! channel; N workers drain it, decode, clock-correct, and invoke the
//! handler. A slow handler therefore cannot stall datagram reception
//! beyond the channel's depth, and a malformed datagram is logged and
//! dropped without ever terminating the listener.

use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::clock::ReceivedPacket;
use crate::listener::{RawDatagram, UdpListener};
use eventline_proto::wire;

/// The seam where storage sinks receive decoded, clock-corrected packets.
/// Errors are logged by the worker pool and do not stop processing; retry
/// policy belongs to the sink.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    async fn handle(&self, packet: ReceivedPacket) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Number of decode workers.
    pub workers: usize,
    /// Depth of the raw-datagram channel between reader and workers.
    pub queue_depth: usize,
}

impl Default for ProcessorConfig {
    fn default() -> ProcessorConfig {
        let workers = thread::available_parallelism().map_or(1, usize::from);
        ProcessorConfig {
            workers,
            queue_depth: workers * 2,
        }
    }
}

/// Runs the receive pipeline until `cancel` fires, then drains the
/// datagram channel and returns.
pub async fn process_packets(
    listener: UdpListener,
    handler: Arc<dyn PacketHandler>,
    config: ProcessorConfig,
    cancel: CancellationToken,
) {
    let (tx, rx) = mpsc::channel::<RawDatagram>(config.queue_depth.max(1));
    let rx = Arc::new(TokioMutex::new(rx));

    let reader = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            loop {
                tokio::select! {
                    received = listener.next() => match received {
                        Ok(datagram) => {
                            if tx.send(datagram).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("udp receive failed: {e}");
                            break;
                        }
                    },
                    _ = cancel.cancelled() => break,
                }
            }
            // Dropping the sender closes the channel; workers drain what
            // is buffered and then exit.
        }
    });

    let mut workers = Vec::with_capacity(config.workers.max(1));
    for _ in 0..config.workers.max(1) {
        let rx = Arc::clone(&rx);
        let handler = Arc::clone(&handler);
        workers.push(tokio::spawn(async move {
            loop {
                let datagram = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(datagram) = datagram else { break };

                let packet = match wire::decode_packet(&datagram.payload) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("dropping malformed packet from {}: {e}", datagram.source);
                        continue;
                    }
                };

                let received =
                    ReceivedPacket::new(packet, datagram.source, datagram.received_at);
                if let Err(e) = handler.handle(received).await {
                    error!("packet handler failed: {e:#}");
                }
            }
        }));
    }

    let _ = reader.await;
    for worker in workers {
        let _ = worker.await;
    }
}
