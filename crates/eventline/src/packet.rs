// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Incremental assembly of one outgoing packet.
//!
//! The accumulator streams partial `Packet` encodings straight into an
//! open zlib stream: a header sub-message at open time, one single-event
//! sub-message per added event, and a trailer sub-message carrying the
//! send offset at finalize time. Protobuf merge-on-concatenation turns
//! the decompressed stream back into one merged packet, so the full
//! message is never materialized in memory and the event count need not
//! be known up front.

use std::io::Write;
use std::time::SystemTime;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use prost::Message;
use tracing::error;

use crate::event::Event;
use eventline_proto::{signed_nanos_between, wire, Packet, Timestamp};

/// Uncompressed-budget headroom reserved for the trailer sub-message, so
/// closing a full packet never overflows the budget. Sized to the
/// worst-case framed and flushed encoding of a `send_offset_ns`-only
/// sub-message.
pub(crate) const TRAILER_RESERVE: usize = 24;

/// One packet being assembled. Owned and mutated by exactly one transport
/// loop; consumed by [`finalize`](OutgoingPacket::finalize).
pub(crate) struct OutgoingPacket {
    encoder: ZlibEncoder<Vec<u8>>,
    written: usize,
    max_uncompressed: usize,
    events: usize,
    start_time: SystemTime,
}

impl OutgoingPacket {
    /// Starts a packet: magic prefix, open compressor, header sub-message
    /// with the sender identity and the packet start timestamp.
    pub(crate) fn open(
        application: &str,
        version: &str,
        instance: &str,
        max_uncompressed: usize,
        compression: Compression,
    ) -> OutgoingPacket {
        let start_time = SystemTime::now();

        let mut buf = Vec::with_capacity(max_uncompressed);
        buf.extend_from_slice(&wire::MAGIC);
        let mut encoder = ZlibEncoder::new(buf, compression);

        let header = Packet {
            application: application.to_owned(),
            application_version: version.to_owned(),
            instance: instance.to_owned(),
            start_timestamp: Some(Timestamp::from_system_time(start_time)),
            ..Default::default()
        };
        let data = header.encode_to_vec();
        write_infallible(&mut encoder, &data);

        OutgoingPacket {
            encoder,
            written: wire::MAGIC.len() + data.len(),
            max_uncompressed,
            events: 0,
            start_time,
        }
    }

    /// Appends one event as its own sub-message and sync-flushes the
    /// compressor so the bytes are observable while the stream stays
    /// open. Returns whether the packet is full and should be sent.
    ///
    /// The budget check runs only after the whole event is written: a
    /// single event larger than the budget is accepted, not rejected.
    pub(crate) fn add_event(&mut self, event: &Event) -> bool {
        let entry = Packet {
            events: vec![eventline_proto::Event {
                name: event.name.clone(),
                scope: event.scope.clone(),
                timestamp_offset_ns: signed_nanos_between(self.start_time, event.timestamp),
                tags: event.tags.clone(),
            }],
            ..Default::default()
        };
        let data = entry.encode_to_vec();
        self.written += data.len();
        write_infallible(&mut self.encoder, &data);
        if let Err(e) = self.encoder.flush() {
            error!("zlib sync flush failed: {e}");
        }
        self.events += 1;

        (self.written + TRAILER_RESERVE) > self.max_uncompressed
    }

    /// Seals the packet: trailer sub-message with the send offset, then
    /// the zlib stream trailer. Returns the complete datagram.
    #[allow(clippy::expect_used)]
    pub(crate) fn finalize(mut self) -> Vec<u8> {
        let trailer = Packet {
            send_offset_ns: signed_nanos_between(self.start_time, SystemTime::now()),
            ..Default::default()
        };
        write_infallible(&mut self.encoder, &trailer.encode_to_vec());

        self.encoder
            .finish()
            .expect("finish in-memory zlib stream")
    }

    pub(crate) fn event_count(&self) -> usize {
        self.events
    }

    pub(crate) fn start_time(&self) -> SystemTime {
        self.start_time
    }
}

/// Writes into the Vec-backed encoder, which cannot fail.
fn write_infallible(encoder: &mut ZlibEncoder<Vec<u8>>, data: &[u8]) {
    #[allow(clippy::expect_used)]
    encoder.write_all(data).expect("write to in-memory buffer");
}
