use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, ResourceRef};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for booking changes, one channel per tank or container.
pub struct NotifyHub {
    channels: DashMap<ResourceRef, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes touching a resource. Creates the channel if needed.
    pub fn subscribe(&self, resource: ResourceRef) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(resource)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, resource: ResourceRef, event: &Event) {
        if let Some(sender) = self.channels.get(&resource) {
            let _ = sender.send(event.clone());
        }
    }

    /// Send once per resource; duplicates in `resources` are skipped.
    /// Channels whose receivers are all gone are dropped afterwards.
    pub fn publish(&self, resources: impl IntoIterator<Item = ResourceRef>, event: &Event) {
        let mut seen = Vec::new();
        for resource in resources {
            if !seen.contains(&resource) {
                seen.push(resource);
                self.send(resource, event);
            }
        }
        self.prune();
    }

    /// Drop channels whose receivers are all gone.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
