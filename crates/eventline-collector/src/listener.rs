// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! UDP datagram intake.

use std::net::SocketAddr;
use std::time::SystemTime;

use tokio::net::UdpSocket;

/// Receive buffer size per datagram. Packets are built against a ~1KB
/// uncompressed budget, so this leaves generous headroom for clients
/// configured with larger budgets.
const RECEIVE_BUFFER_SIZE: usize = 10 * 1024;

/// One raw datagram plus its receipt metadata. `received_at` is stamped
/// as soon as the datagram leaves the socket; clock correction depends on
/// it, so it must not wait for decoding.
#[derive(Debug, Clone)]
pub struct RawDatagram {
    pub payload: Vec<u8>,
    pub source: SocketAddr,
    pub received_at: SystemTime,
}

/// Listening socket yielding event packet datagrams.
pub struct UdpListener {
    socket: UdpSocket,
}

impl UdpListener {
    pub async fn bind(addr: &str) -> std::io::Result<UdpListener> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(UdpListener { socket })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The next datagram. One datagram is one complete packet; datagrams
    /// truncated by an undersized buffer surface later as decode errors,
    /// not here.
    pub async fn next(&self) -> std::io::Result<RawDatagram> {
        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
        let (n, source) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok(RawDatagram {
            payload: buf,
            source,
            received_at: SystemTime::now(),
        })
    }
}
