// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event intake and fan-out.
//!
//! A [`Registry`] is constructed explicitly and cloned cheaply (it is a
//! handle around shared state); there is no process-wide default
//! instance. Producers hold a [`Scope`] and call [`Scope::event`]; the
//! registry fans the event out to every configured [`Destination`].

use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use async_trait::async_trait;
use eventline_proto::Tag;
use tokio_util::sync::CancellationToken;

use crate::event::Event;

/// The sink capability targeted by the transport client and the
/// destination decorators.
///
/// `submit` must never block indefinitely; implementations drop (and
/// count) under overload. `run` performs the destination's background
/// work until the token is cancelled, draining any internal queue and
/// performing one final flush before returning.
#[async_trait]
pub trait Destination: Send + Sync {
    fn submit(&self, events: &[Arc<Event>]);

    async fn run(&self, cancel: CancellationToken);
}

/// Cloneable handle to the set of destinations events fan out to.
///
/// Destinations are expected to be added at composition time, before
/// producers start submitting.
#[derive(Clone, Default)]
pub struct Registry {
    destinations: Arc<RwLock<Vec<Arc<dyn Destination>>>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn add_destination(&self, destination: Arc<dyn Destination>) {
        #[allow(clippy::expect_used)]
        self.destinations
            .write()
            .expect("lock poisoned")
            .push(destination);
    }

    /// A root scope bound to this registry.
    pub fn scope(&self, name: impl Into<String>) -> Scope {
        Scope {
            registry: self.clone(),
            path: vec![name.into()],
        }
    }

    /// Fans one event out to every destination.
    pub fn submit(&self, event: Event) {
        let event = Arc::new(event);
        #[allow(clippy::expect_used)]
        let destinations = self.destinations.read().expect("lock poisoned");
        for destination in destinations.iter() {
            destination.submit(std::slice::from_ref(&event));
        }
    }
}

/// Hierarchical namespace handle used to emit events.
#[derive(Clone)]
pub struct Scope {
    registry: Registry,
    path: Vec<String>,
}

impl Scope {
    /// A child scope with `name` appended to the path.
    pub fn subscope(&self, name: impl Into<String>) -> Scope {
        let mut path = self.path.clone();
        path.push(name.into());
        Scope {
            registry: self.registry.clone(),
            path,
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Emits an event under this scope, stamped with the current time.
    pub fn event(&self, name: impl Into<String>, tags: Vec<Tag>) {
        self.registry.submit(Event {
            name: name.into(),
            scope: self.path.clone(),
            timestamp: SystemTime::now(),
            tags,
        });
    }
}
