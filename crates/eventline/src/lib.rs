// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client library for the eventline telemetry pipeline.
//!
//! Application code obtains a [`Scope`] from a [`Registry`] and emits
//! structured events through it. The registry fans each event out to its
//! configured [`Destination`]s; the stock destination is the
//! [`UdpClient`], which batches events into compressed packets and ships
//! them over UDP with bounded memory and bounded latency. The
//! [`destination`] module provides decorators that re-buffer
//! ([`destination::BatchQueue`]) or fan out ([`destination::Parallel`])
//! any destination, so pipelines compose from explicit constructors.
//!
//! Intake never blocks the producing application: every queue in the
//! pipeline is bounded and drops (counted) under overload.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod client;
pub mod destination;
pub mod event;
mod packet;
pub mod registry;
pub mod ticker;

pub use client::{UdpClient, UdpClientConfig};
pub use event::Event;
pub use eventline_proto as proto;
pub use eventline_proto::Tag;
pub use flate2::Compression;
pub use registry::{Destination, Registry, Scope};

/// Scope used for events the library emits about itself, such as the
/// synthetic `drops` event.
pub const LIBRARY_SCOPE: &str = "eventline";
