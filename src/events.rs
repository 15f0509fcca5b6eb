//! Structural notifications for the GUI collaborator.
//!
//! The kernel never waits for a subscriber: events go out with `try_send`,
//! and a full subscriber queue drops the event with a warning.

use crate::graph::{Endpoint, ModuleId};
use crate::sync::lock;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::{Arc, Mutex};

/// Default capacity of each subscriber queue.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Messages sent from the kernel to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelEvent {
    /// A module was inserted into the container.
    ModuleAdded {
        id: ModuleId,
        name: String,
        description: String,
        icon: Option<String>,
    },
    /// A module finished activation and accepts connections.
    ModuleReady { id: ModuleId },
    /// A module was removed from the container.
    ModuleRemoved { id: ModuleId },
    /// A module's processing failed; it is shutting down.
    ModuleFailed { id: ModuleId, message: String },
    /// A property value changed.
    PropertyChanged { id: ModuleId, name: String },
    Connected { from: Endpoint, to: Endpoint },
    Disconnected { from: Endpoint, to: Endpoint },
    /// The kernel is shutting down.
    Shutdown,
}

/// Fan-out of [`KernelEvent`]s to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<KernelEvent>>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self) -> Receiver<KernelEvent> {
        let (tx, rx) = bounded(self.capacity);
        lock(&self.subscribers).push(tx);
        rx
    }

    pub fn emit(&self, event: KernelEvent) {
        lock(&self.subscribers).retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!("Event queue full, dropping {:?}", dropped);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::default();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.emit(KernelEvent::ModuleRemoved { id: ModuleId(1) });

        assert_eq!(a.try_recv().unwrap(), KernelEvent::ModuleRemoved { id: ModuleId(1) });
        assert_eq!(b.try_recv().unwrap(), KernelEvent::ModuleRemoved { id: ModuleId(1) });
    }

    #[test]
    fn test_full_queue_never_blocks() {
        let bus = EventBus::new(1);
        let rx = bus.subscribe();
        bus.emit(KernelEvent::Shutdown);
        bus.emit(KernelEvent::ModuleReady { id: ModuleId(0) });

        assert_eq!(rx.try_recv().unwrap(), KernelEvent::Shutdown);
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_dropped_subscriber_pruned() {
        let bus = EventBus::default();
        drop(bus.subscribe());
        let _keep = bus.subscribe();
        bus.emit(KernelEvent::Shutdown);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
