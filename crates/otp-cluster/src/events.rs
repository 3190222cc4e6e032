//! Cluster membership events: `onNodeUp`, `onNodeDown`, and a steady
//! `cluster_state_changed` broadcast.
//!
//! Same `tokio::sync::broadcast` fan-out shape as
//! `otp_process::LifecycleBus`: best-effort, lagging subscribers miss
//! events rather than blocking the membership actor that emits them.

use otp_types::NodeId;

#[derive(Debug, Clone)]
pub enum ClusterEvent {
    NodeUp(NodeId),
    NodeDown(NodeId, String),
    ClusterStateChanged { up: Vec<NodeId> },
}

#[derive(Clone)]
pub struct ClusterEventBus {
    tx: tokio::sync::broadcast::Sender<ClusterEvent>,
}

impl ClusterEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ClusterEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: ClusterEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for ClusterEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
