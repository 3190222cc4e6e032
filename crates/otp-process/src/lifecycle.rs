//! The runtime's internal lifecycle bus. Independent of the
//! user-visible event bus in `otp-eventbus`.

use otp_types::{Pid, Reason};

/// A lifecycle notification. Consumers include the registry (cleanup on
/// terminate), the supervisor (restart on crash), and the observer
/// (`server_started`/`server_stopped` feed).
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Started(Pid),
    Terminated(Pid, Reason),
    Crashed(Pid, String),
    Restarted(Pid, u32),
}

/// A `tokio::sync::broadcast`-backed fan-out bus. Subscribers that lag
/// behind the broadcast capacity miss events (surfaced as a
/// `RecvError::Lagged` on their receiver) rather than blocking emitters —
/// appropriate for a best-effort internal signal, not for the user-visible
/// event bus in `otp-eventbus`, which has stricter subscription-order
/// delivery guarantees.
#[derive(Clone)]
pub struct LifecycleBus {
    tx: tokio::sync::broadcast::Sender<LifecycleEvent>,
}

impl LifecycleBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: LifecycleEvent) {
        // No receivers is a normal state (e.g. in unit tests); ignore.
        let _ = self.tx.send(event);
    }
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
