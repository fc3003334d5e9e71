// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sender/receiver clock correction.
//!
//! A packet carries the sender's clock reading at packet open
//! (`start_timestamp`) and how long the packet stayed open before
//! transmission (`send_offset_ns`). Subtracting the send offset from the
//! receiver's receipt time estimates, on the receiver's clock, when the
//! packet was opened, assuming negligible network transit time (an
//! accepted approximation). Event times anchored to that estimate are
//! comparable across producers with arbitrarily skewed system clocks.

use std::net::SocketAddr;
use std::time::SystemTime;

use eventline_proto::{add_signed_nanos, signed_nanos_between, tag, Event, Packet, Tag};

/// A decoded packet with clock correction applied.
#[derive(Debug, Clone)]
pub struct ReceivedPacket {
    pub packet: Packet,
    pub source: SocketAddr,
    /// Receiver clock at datagram arrival.
    pub received_at: SystemTime,
    /// Receiver-clock estimate of when the packet was opened.
    pub corrected_start: SystemTime,
    /// How far the sender's clock differs from the receiver's at packet
    /// open. Zero under zero drift; diagnostic for sinks.
    pub clock_correction_ns: i64,
}

impl ReceivedPacket {
    pub fn new(packet: Packet, source: SocketAddr, received_at: SystemTime) -> ReceivedPacket {
        let corrected_start = add_signed_nanos(received_at, -packet.send_offset_ns);
        let sender_start = packet
            .start_timestamp
            .as_ref()
            .map(|ts| ts.as_system_time())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let clock_correction_ns = signed_nanos_between(sender_start, corrected_start);

        ReceivedPacket {
            packet,
            source,
            received_at,
            corrected_start,
            clock_correction_ns,
        }
    }

    /// Absolute, receiver-clock time of one of this packet's events.
    pub fn event_time(&self, event: &Event) -> SystemTime {
        add_signed_nanos(self.corrected_start, event.timestamp_offset_ns)
    }

    /// Resolves a tag's timestamp-offset value against the corrected
    /// packet start. `None` for every other value type.
    pub fn tag_time(&self, tag: &Tag) -> Option<SystemTime> {
        match tag.value {
            Some(tag::Value::TimestampOffsetNs(offset_ns)) => {
                Some(add_signed_nanos(self.corrected_start, offset_ns))
            }
            _ => None,
        }
    }
}
