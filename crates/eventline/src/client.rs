// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! UDP transport client.
//!
//! The client owns a bounded intake queue, the outgoing packet
//! accumulator, and a jittered flush timer. [`Destination::submit`] never
//! blocks: when the queue is full the event is dropped and counted, and
//! the loss itself is reported downstream as a synthetic `drops` event.
//! Only the run loop touches the accumulator, so packet state needs no
//! locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use flate2::Compression;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::Event;
use crate::packet::OutgoingPacket;
use crate::registry::Destination;
use crate::ticker::JitteredTicker;
use crate::LIBRARY_SCOPE;

const DEFAULT_QUEUE_DEPTH: usize = 100;
const DEFAULT_MAX_UNCOMPRESSED_BYTES: usize = 1000;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(15);

/// Tuning knobs for the transport client. All parameters are explicit
/// numbers; chain-description parsing belongs to the composition root.
#[derive(Debug, Clone)]
pub struct UdpClientConfig {
    /// Capacity of the intake queue; submits beyond it are counted drops.
    pub queue_depth: usize,
    /// Uncompressed-byte budget per packet, trailer headroom included.
    pub max_uncompressed_bytes: usize,
    /// zlib compression level for the packet stream.
    pub compression: Compression,
    /// Base period of the jittered flush timer.
    pub flush_interval: Duration,
}

impl Default for UdpClientConfig {
    fn default() -> UdpClientConfig {
        UdpClientConfig {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_uncompressed_bytes: DEFAULT_MAX_UNCOMPRESSED_BYTES,
            compression: Compression::best(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Ships batched event packets to a collector address over UDP.
///
/// Delivery is best effort: send failures are logged and dropped, never
/// retried (a failed send is indistinguishable from a lost datagram).
pub struct UdpClient {
    application: String,
    version: String,
    instance: String,
    addr: String,
    config: UdpClientConfig,

    tx: mpsc::Sender<Arc<Event>>,
    rx: TokioMutex<mpsc::Receiver<Arc<Event>>>,
    dropped_events: AtomicU64,
}

impl UdpClient {
    pub fn new(
        application: impl Into<String>,
        version: impl Into<String>,
        instance: impl Into<String>,
        addr: impl Into<String>,
    ) -> UdpClient {
        UdpClient::with_config(
            application,
            version,
            instance,
            addr,
            UdpClientConfig::default(),
        )
    }

    pub fn with_config(
        application: impl Into<String>,
        version: impl Into<String>,
        instance: impl Into<String>,
        addr: impl Into<String>,
        config: UdpClientConfig,
    ) -> UdpClient {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        UdpClient {
            application: application.into(),
            version: version.into(),
            instance: instance.into(),
            addr: addr.into(),
            config,
            tx,
            rx: TokioMutex::new(rx),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Events dropped for backpressure and not yet folded into a
    /// synthetic `drops` event by the run loop.
    pub fn pending_drops(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    fn new_packet(&self) -> OutgoingPacket {
        OutgoingPacket::open(
            &self.application,
            &self.version,
            &self.instance,
            self.config.max_uncompressed_bytes,
            self.config.compression,
        )
    }

    async fn send_packet(&self, packet: OutgoingPacket) {
        if let Err(e) = self.send(packet).await {
            debug!("failed to send event packet to {}: {e}", self.addr);
        }
    }

    /// One transient connected socket per packet, one datagram per packet.
    async fn send(&self, packet: OutgoingPacket) -> std::io::Result<()> {
        let payload = packet.finalize();
        let target = lookup_host(&self.addr).await?.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "address resolved to nothing",
            )
        })?;
        let bind_addr = if target.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(target).await?;
        socket.send(&payload).await?;
        Ok(())
    }

    fn drops_event(count: u64) -> Event {
        Event {
            name: "drops".to_owned(),
            scope: vec![LIBRARY_SCOPE.to_owned()],
            timestamp: SystemTime::now(),
            tags: vec![eventline_proto::Tag::int64(
                "events",
                i64::try_from(count).unwrap_or(i64::MAX),
            )],
        }
    }
}

#[async_trait]
impl Destination for UdpClient {
    /// Non-blocking enqueue. A full queue (or one closed by a shutdown in
    /// progress) means a counted drop, never an error and never a wait.
    fn submit(&self, events: &[Arc<Event>]) {
        for event in events {
            if self.tx.try_send(Arc::clone(event)).is_err() {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut rx = self.rx.lock().await;
        let mut ticker = JitteredTicker::new(self.config.flush_interval);
        let mut packet = self.new_packet();

        loop {
            // Loss is itself telemetry: fold any counted drops into a
            // synthetic event on the normal path.
            let drops = self.dropped_events.swap(0, Ordering::Relaxed);
            if drops > 0 && packet.add_event(&UdpClient::drops_event(drops)) {
                self.send_packet(packet).await;
                packet = self.new_packet();
            }

            tokio::select! {
                received = rx.recv() => match received {
                    Some(event) => {
                        if packet.add_event(&event) {
                            self.send_packet(packet).await;
                            packet = self.new_packet();
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    // Bound worst-case event latency even at low volume.
                    if packet.event_count() > 0 {
                        self.send_packet(packet).await;
                        packet = self.new_packet();
                    }
                }
                _ = cancel.cancelled() => {
                    // Close the queue first, then drain what is buffered:
                    // submits racing shutdown take the counted-drop path
                    // and the drain is bounded by the queue depth.
                    rx.close();
                    while let Ok(event) = rx.try_recv() {
                        if packet.add_event(&event) {
                            self.send_packet(packet).await;
                            packet = self.new_packet();
                        }
                    }
                    break;
                }
            }
        }

        if packet.event_count() > 0 {
            self.send_packet(packet).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventline_proto::wire;
    use std::collections::HashSet;
    use std::net::SocketAddr;
    use tokio::time::timeout;

    fn test_event(i: usize) -> Arc<Event> {
        Arc::new(Event {
            name: format!("event-{i}"),
            scope: vec!["test".into()],
            timestamp: SystemTime::now(),
            tags: vec![],
        })
    }

    async fn bind_receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    /// Receives datagrams until `expected` events have arrived.
    async fn receive_events(socket: &UdpSocket, expected: usize) -> Vec<eventline_proto::Event> {
        let mut events = Vec::new();
        let mut buf = vec![0u8; 64 * 1024];
        while events.len() < expected {
            let n = timeout(Duration::from_secs(5), socket.recv(&mut buf))
                .await
                .expect("timed out waiting for packets")
                .unwrap();
            let packet = wire::decode_packet(&buf[..n]).unwrap();
            events.extend(packet.events);
        }
        events
    }

    #[tokio::test]
    async fn delivers_queued_events_on_shutdown_drain() {
        let (socket, addr) = bind_receiver().await;
        let client = Arc::new(UdpClient::new("app", "0.1.0", "inst", addr.to_string()));

        for i in 0..5 {
            client.submit(&[test_event(i)]);
        }

        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let client = Arc::clone(&client);
            let cancel = cancel.clone();
            async move { client.run(cancel).await }
        });
        cancel.cancel();
        run.await.unwrap();

        let events = receive_events(&socket, 5).await;
        let names: Vec<_> = events.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, ["event-0", "event-1", "event-2", "event-3", "event-4"]);
    }

    #[tokio::test]
    async fn overflow_is_counted_and_reported_as_drops_event() {
        let (socket, addr) = bind_receiver().await;
        let config = UdpClientConfig {
            queue_depth: 4,
            flush_interval: Duration::from_millis(40),
            ..UdpClientConfig::default()
        };
        let client = Arc::new(UdpClient::with_config(
            "app",
            "0.1.0",
            "inst",
            addr.to_string(),
            config,
        ));

        // queue_depth + 3 submits before the loop runs: exactly 3 drops.
        for i in 0..7 {
            client.submit(&[test_event(i)]);
        }
        assert_eq!(client.pending_drops(), 3);

        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let client = Arc::clone(&client);
            let cancel = cancel.clone();
            async move { client.run(cancel).await }
        });

        // 4 queued events + 1 synthetic drops event.
        let events = receive_events(&socket, 5).await;
        cancel.cancel();
        run.await.unwrap();

        let drops: Vec<_> = events.iter().filter(|e| e.name == "drops").collect();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].scope, vec![LIBRARY_SCOPE]);
        assert_eq!(drops[0].tags[0], eventline_proto::Tag::int64("events", 3));
        assert_eq!(
            events.iter().filter(|e| e.name.starts_with("event-")).count(),
            4
        );
    }

    #[tokio::test]
    async fn jittered_ticker_flushes_partial_packets() {
        let (socket, addr) = bind_receiver().await;
        let config = UdpClientConfig {
            flush_interval: Duration::from_millis(40),
            ..UdpClientConfig::default()
        };
        let client = Arc::new(UdpClient::with_config(
            "app",
            "0.1.0",
            "inst",
            addr.to_string(),
            config,
        ));

        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let client = Arc::clone(&client);
            let cancel = cancel.clone();
            async move { client.run(cancel).await }
        });

        client.submit(&[test_event(0)]);

        // One event, far below the size budget: only the ticker sends it.
        let events = receive_events(&socket, 1).await;
        assert_eq!(events[0].name, "event-0");

        cancel.cancel();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn size_budget_splits_into_multiple_packets() {
        let (socket, addr) = bind_receiver().await;
        let config = UdpClientConfig {
            queue_depth: 200,
            max_uncompressed_bytes: 300,
            ..UdpClientConfig::default()
        };
        let client = Arc::new(UdpClient::with_config(
            "app",
            "0.1.0",
            "inst",
            addr.to_string(),
            config,
        ));

        for i in 0..40 {
            client.submit(&[test_event(i)]);
        }

        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let client = Arc::clone(&client);
            let cancel = cancel.clone();
            async move { client.run(cancel).await }
        });
        cancel.cancel();
        run.await.unwrap();

        let mut buf = vec![0u8; 64 * 1024];
        let mut packets = 0;
        let mut names = HashSet::new();
        while names.len() < 40 {
            let n = timeout(Duration::from_secs(5), socket.recv(&mut buf))
                .await
                .expect("timed out waiting for packets")
                .unwrap();
            let packet = wire::decode_packet(&buf[..n]).unwrap();
            packets += 1;
            for event in packet.events {
                names.insert(event.name);
            }
        }
        assert!(packets > 1, "expected the budget to split the batch");
    }
}
