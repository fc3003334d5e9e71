// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Composable destination decorators.
//!
//! Both decorators wrap another [`Destination`](crate::Destination) and
//! compose freely: a typical chain is `BatchQueue(Parallel(sink))` or
//! `BatchQueue(UdpClient)`. Each layer is constructed outer-to-inner from
//! explicit numeric parameters.

mod batch;
mod parallel;

pub use batch::BatchQueue;
pub use parallel::Parallel;
