// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The client-side event model.

use std::time::SystemTime;

use eventline_proto::Tag;

/// One telemetry occurrence as produced by application code.
///
/// `scope` is an ordered hierarchical namespace (`["a", "b"]` reads as
/// `a.b`). `timestamp` is absolute here; it is converted to an offset
/// relative to the enclosing packet when the event is serialized. Tag
/// order is preserved; keys are not required to be unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub scope: Vec<String>,
    pub timestamp: SystemTime,
    pub tags: Vec<Tag>,
}

impl Event {
    /// An event stamped with the current wall-clock time.
    pub fn now(name: impl Into<String>, scope: Vec<String>, tags: Vec<Tag>) -> Event {
        Event {
            name: name.into(),
            scope,
            timestamp: SystemTime::now(),
            tags,
        }
    }
}
