//! Local notifications the global registry emits as its view changes.

use otp_types::{NodeId, Pid};

#[derive(Debug, Clone)]
pub enum GlobalRegistryEvent {
    Registered(String, Pid),
    Unregistered(String, Pid),
    /// A conflict between two entries for the same name was resolved.
    /// `winner` is the node whose entry survived.
    ConflictResolved { name: String, winner: NodeId },
}

#[derive(Clone)]
pub struct GlobalRegistryEventBus {
    tx: tokio::sync::broadcast::Sender<GlobalRegistryEvent>,
}

impl GlobalRegistryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<GlobalRegistryEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: GlobalRegistryEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for GlobalRegistryEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
