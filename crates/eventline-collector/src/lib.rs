// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector side of the eventline telemetry pipeline.
//!
//! A [`UdpListener`](listener::UdpListener) reads raw datagrams and a
//! worker pool ([`processor`]) decodes them, applies sender/receiver
//! clock correction ([`clock`]), and hands the result to a
//! [`PacketHandler`](processor::PacketHandler), the seam where storage
//! sinks plug in. [`naming`] holds the deterministic table/path naming
//! helpers those sinks share.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod clock;
pub mod listener;
pub mod naming;
pub mod processor;

pub use clock::ReceivedPacket;
pub use listener::{RawDatagram, UdpListener};
pub use processor::{process_packets, PacketHandler, ProcessorConfig};
