// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fan-out decorator: a shared bounded queue drained by N workers, each
//! owning its own instance of the wrapped destination. Used for sinks
//! that are not safe to share across concurrent callers, or that benefit
//! from concurrent submits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::event::Event;
use crate::registry::Destination;

type DestinationFactory = dyn Fn() -> anyhow::Result<Arc<dyn Destination>> + Send + Sync;

/// Distributes submitted events across `workers` worker-owned copies of
/// the wrapped destination. The factory runs once per worker.
pub struct Parallel {
    factory: Box<DestinationFactory>,
    workers: usize,

    tx: mpsc::Sender<Arc<Event>>,
    rx: Arc<TokioMutex<mpsc::Receiver<Arc<Event>>>>,
    dropped_events: AtomicU64,
}

impl Parallel {
    pub fn new<F>(factory: F, workers: usize, queue_depth: usize) -> Parallel
    where
        F: Fn() -> anyhow::Result<Arc<dyn Destination>> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        Parallel {
            factory: Box::new(factory),
            workers: workers.max(1),
            tx,
            rx: Arc::new(TokioMutex::new(rx)),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Events dropped because the shared queue was full or already torn
    /// down.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Destination for Parallel {
    /// Non-blocking. After teardown the queue is closed and submits
    /// become counted no-ops instead of blocking forever.
    fn submit(&self, events: &[Arc<Event>]) {
        for event in events {
            if self.tx.try_send(Arc::clone(event)).is_err() {
                let dropped = self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("parallel queue unavailable, dropped {dropped} events so far");
            }
        }
    }

    async fn run(&self, cancel: CancellationToken) {
        // Worker targets run on their own token: workers first finish
        // draining the shared queue, then the targets are cancelled so
        // they can flush everything the workers handed them.
        let target_cancel = CancellationToken::new();
        let mut worker_tasks = Vec::with_capacity(self.workers);
        let mut target_tasks = Vec::with_capacity(self.workers);

        for worker_id in 0..self.workers {
            let target = match (self.factory)() {
                Ok(target) => target,
                Err(e) => {
                    error!("failed to construct destination for worker {worker_id}: {e:#}");
                    continue;
                }
            };

            target_tasks.push(tokio::spawn({
                let target = Arc::clone(&target);
                let target_cancel = target_cancel.clone();
                async move { target.run(target_cancel).await }
            }));

            let rx = Arc::clone(&self.rx);
            let cancel = cancel.clone();
            worker_tasks.push(tokio::spawn(async move {
                loop {
                    let received = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            received = rx.recv() => received,
                            _ = cancel.cancelled() => {
                                // Close the queue, then keep pulling:
                                // recv drains buffered events and only
                                // then reports the channel closed.
                                rx.close();
                                rx.try_recv().ok()
                            }
                        }
                    };
                    match received {
                        Some(event) => target.submit(std::slice::from_ref(&event)),
                        None => break,
                    }
                }
            }));
        }

        if worker_tasks.is_empty() {
            error!("no parallel workers could be constructed; waiting for shutdown");
            cancel.cancelled().await;
        }
        for worker in worker_tasks {
            let _ = worker.await;
        }

        target_cancel.cancel();
        for target in target_tasks {
            let _ = target.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime};
    use tokio::time::timeout;

    /// Per-worker capture that also records which worker saw each event.
    struct WorkerDestination {
        worker_id: usize,
        seen: Arc<Mutex<Vec<(usize, String)>>>,
    }

    #[async_trait]
    impl Destination for WorkerDestination {
        fn submit(&self, events: &[Arc<Event>]) {
            let mut seen = self.seen.lock().unwrap();
            for event in events {
                seen.push((self.worker_id, event.name.clone()));
            }
        }

        async fn run(&self, cancel: CancellationToken) {
            cancel.cancelled().await;
        }
    }

    fn test_event(i: usize) -> Arc<Event> {
        Arc::new(Event {
            name: format!("event-{i}"),
            scope: vec!["test".into()],
            timestamp: SystemTime::now(),
            tags: vec![],
        })
    }

    #[tokio::test]
    async fn workers_receive_the_full_submitted_set() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let next_worker = Arc::new(Mutex::new(0usize));

        let parallel = Arc::new(Parallel::new(
            {
                let seen = Arc::clone(&seen);
                let next_worker = Arc::clone(&next_worker);
                move || {
                    let mut next_worker = next_worker.lock().unwrap();
                    let worker_id = *next_worker;
                    *next_worker += 1;
                    Ok(Arc::new(WorkerDestination {
                        worker_id,
                        seen: Arc::clone(&seen),
                    }) as Arc<dyn Destination>)
                }
            },
            4,
            1024,
        ));

        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let parallel = Arc::clone(&parallel);
            let cancel = cancel.clone();
            async move { parallel.run(cancel).await }
        });

        let total = 400;
        for i in 0..total {
            parallel.submit(&[test_event(i)]);
        }

        timeout(Duration::from_secs(5), async {
            while seen.lock().unwrap().len() < total {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("events not distributed in time");

        cancel.cancel();
        run.await.unwrap();

        let seen = seen.lock().unwrap();
        let names: HashSet<_> = seen.iter().map(|(_, name)| name.clone()).collect();
        let expected: HashSet<_> = (0..total).map(|i| format!("event-{i}")).collect();
        assert_eq!(names, expected);
        assert_eq!(parallel.dropped_events(), 0);
    }

    #[tokio::test]
    async fn submit_after_teardown_is_a_counted_noop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let parallel = Arc::new(Parallel::new(
            {
                let seen = Arc::clone(&seen);
                move || {
                    Ok(Arc::new(WorkerDestination {
                        worker_id: 0,
                        seen: Arc::clone(&seen),
                    }) as Arc<dyn Destination>)
                }
            },
            2,
            16,
        ));

        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let parallel = Arc::clone(&parallel);
            let cancel = cancel.clone();
            async move { parallel.run(cancel).await }
        });
        cancel.cancel();
        run.await.unwrap();

        parallel.submit(&[test_event(0)]);
        assert_eq!(parallel.dropped_events(), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn queued_events_survive_cancellation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let parallel = Arc::new(Parallel::new(
            {
                let seen = Arc::clone(&seen);
                move || {
                    Ok(Arc::new(WorkerDestination {
                        worker_id: 0,
                        seen: Arc::clone(&seen),
                    }) as Arc<dyn Destination>)
                }
            },
            3,
            64,
        ));

        // Queue events before any worker exists, then cancel immediately:
        // workers must still drain the queue before exiting.
        for i in 0..10 {
            parallel.submit(&[test_event(i)]);
        }

        let cancel = CancellationToken::new();
        cancel.cancel();
        parallel.run(cancel).await;

        assert_eq!(seen.lock().unwrap().len(), 10);
    }
}
