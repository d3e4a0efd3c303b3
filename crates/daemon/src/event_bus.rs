// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-instance event bus.
//!
//! Publishers (watchdog, repository engine, deployment pipeline) and
//! subscribers (chat bridge, tests) are wired through broadcast channels
//! keyed by instance id, so no component holds a direct reference to
//! another. Ownership stays a DAG rooted at the instance.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use gk_core::{Event, InstanceId};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Default)]
pub struct EventBus {
    channels: Arc<Mutex<HashMap<InstanceId, broadcast::Sender<Event>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender for one instance's channel, creating it on first use.
    pub fn sender(&self, instance: &InstanceId) -> broadcast::Sender<Event> {
        self.channels
            .lock()
            .entry(instance.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    pub fn subscribe(&self, instance: &InstanceId) -> broadcast::Receiver<Event> {
        self.sender(instance).subscribe()
    }

    /// Route an event to its instance's subscribers. Lagging or absent
    /// subscribers are not an error.
    pub fn publish(&self, event: Event) {
        let sender = self.sender(event.instance());
        let _ = sender.send(event);
    }

    /// Drop an instance's channel after detach.
    pub fn remove(&self, instance: &InstanceId) {
        self.channels.lock().remove(instance);
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
