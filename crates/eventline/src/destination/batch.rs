// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Re-aggregating decorator: converts a per-event submit stream into
//! batched submits against the wrapped destination, cutting per-call
//! overhead for sinks where each submit is an RPC.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::Event;
use crate::registry::Destination;
use crate::ticker::JitteredTicker;

/// Collects individually submitted events and forwards them to `target`
/// in batches of up to `batch_size`, flushed on size or on a jittered
/// interval. Same state machine as the transport client's flush loop,
/// operating on whole events instead of wire bytes.
pub struct BatchQueue {
    target: Arc<dyn Destination>,
    batch_size: usize,
    flush_interval: Duration,

    tx: mpsc::Sender<Arc<Event>>,
    rx: TokioMutex<mpsc::Receiver<Arc<Event>>>,
    dropped_events: AtomicU64,
}

impl BatchQueue {
    pub fn new(
        target: Arc<dyn Destination>,
        queue_size: usize,
        batch_size: usize,
        flush_interval: Duration,
    ) -> BatchQueue {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        BatchQueue {
            target,
            batch_size: batch_size.max(1),
            flush_interval,
            tx,
            rx: TokioMutex::new(rx),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Events dropped because the intake queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    fn forward(&self, batch: &mut Vec<Arc<Event>>) {
        self.target.submit(batch);
        batch.clear();
    }
}

#[async_trait]
impl Destination for BatchQueue {
    fn submit(&self, events: &[Arc<Event>]) {
        for event in events {
            if self.tx.try_send(Arc::clone(event)).is_err() {
                let dropped = self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("batch queue full, dropped {dropped} events so far");
            }
        }
    }

    async fn run(&self, cancel: CancellationToken) {
        // The wrapped destination runs on its own token so this layer can
        // finish draining into it before it starts draining itself.
        let target_cancel = CancellationToken::new();
        let target_task = tokio::spawn({
            let target = Arc::clone(&self.target);
            let target_cancel = target_cancel.clone();
            async move { target.run(target_cancel).await }
        });

        let mut rx = self.rx.lock().await;
        let mut ticker = JitteredTicker::new(self.flush_interval);
        let mut batch: Vec<Arc<Event>> = Vec::with_capacity(self.batch_size);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(event) => {
                        batch.push(event);
                        if batch.len() >= self.batch_size {
                            self.forward(&mut batch);
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.forward(&mut batch);
                    }
                }
                _ = cancel.cancelled() => {
                    rx.close();
                    while let Ok(event) = rx.try_recv() {
                        batch.push(event);
                        if batch.len() >= self.batch_size {
                            self.forward(&mut batch);
                        }
                    }
                    break;
                }
            }
        }

        if !batch.is_empty() {
            self.forward(&mut batch);
        }

        target_cancel.cancel();
        let _ = target_task.await;
    }
}
