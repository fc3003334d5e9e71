// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Datagram framing for event packets.
//!
//! One datagram is one complete packet: a two-byte magic prefix followed
//! by a single zlib stream whose decompressed contents decode as one
//! merged [`Packet`](crate::Packet). There is no cross-datagram framing.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use prost::Message;

use crate::Packet;

/// Magic prefix identifying an event packet datagram.
pub const MAGIC: [u8; 2] = *b"EK";

/// Smallest datagram that can possibly decode: magic plus a zlib header.
const MIN_DATAGRAM_LEN: usize = 4;

/// Why an inbound datagram was rejected. A malformed datagram is dropped
/// by the receiver; it never terminates the receive loop.
#[derive(Debug, thiserror::Error)]
pub enum MalformedPacket {
    #[error("missing magic prefix")]
    BadMagic,

    #[error("corrupt compression stream: {0}")]
    Compression(#[from] std::io::Error),

    #[error("corrupt packet encoding: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Parses a raw datagram back into a packet.
pub fn decode_packet(datagram: &[u8]) -> Result<Packet, MalformedPacket> {
    if datagram.len() < MIN_DATAGRAM_LEN || datagram[..2] != MAGIC {
        return Err(MalformedPacket::BadMagic);
    }

    let mut decompressed = Vec::new();
    ZlibDecoder::new(&datagram[2..]).read_to_end(&mut decompressed)?;

    Ok(Packet::decode(decompressed.as_slice())?)
}

/// Encodes a fully assembled packet as a single datagram. The transport
/// client streams sub-messages into the compressor instead; this one-shot
/// form serves tools and tests that already hold a complete packet.
// Writes into a Vec-backed encoder cannot fail.
#[allow(clippy::expect_used)]
pub fn encode_packet(packet: &Packet, compression: Compression) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&MAGIC);
    let mut encoder = ZlibEncoder::new(buf, compression);
    encoder
        .write_all(&packet.encode_to_vec())
        .expect("write to in-memory buffer");
    encoder.finish().expect("finish in-memory zlib stream")
}
