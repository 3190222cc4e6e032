//! Type-erased process bookkeeping shared by the registry, supervisor, and
//! observer. None of those consumers need to know a process's concrete
//! `Behavior::Message`/`Reply` types — they only stop, inspect, or
//! enumerate processes by [`Pid`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use otp_types::{Pid, Reason};

/// Reads a mailbox's current depth without knowing its message type. Built
/// from the generic `mpsc::Sender` at spawn time, where the concrete
/// message type is still in scope.
pub type QueueProbe = Arc<dyn Fn() -> usize + Send + Sync>;

/// Lifecycle status of a process: `initializing -> running -> stopping ->
/// stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Initializing,
    Running,
    Stopping,
    Stopped,
}

/// Out-of-band instruction delivered on a process's control channel,
/// distinct from its typed mailbox. Control messages jump ahead of queued
/// mailbox entries in the process loop's `select!`.
///
/// Public so other behavior engines in this workspace (e.g. `otp-statem`)
/// can drive their own process loop while still registering a
/// [`ProcessHandle`] in the shared [`ProcessTable`], the same way
/// `otp_process::spawn` does.
pub enum Control {
    Stop(Reason),
}

/// A type-erased, cloneable reference to a running process. Holds enough to
/// stop it and observe its status without knowing its behavior type.
#[derive(Clone)]
pub struct ProcessHandle {
    pid: Pid,
    status: Arc<Mutex<Status>>,
    control_tx: mpsc::UnboundedSender<Control>,
    started_at: Instant,
    message_count: Arc<AtomicU64>,
    queue_probe: QueueProbe,
}

impl ProcessHandle {
    /// Wraps a status cell and control channel into a handle usable by any
    /// process loop, not only `otp_process::spawn`'s own — `otp-statem`'s
    /// runner builds its handles this way. `message_count` is incremented
    /// by the owning run loop as it dequeues mailbox entries; `queue_probe`
    /// reads the mailbox's current depth through the still-generic
    /// `mpsc::Sender` captured at spawn time.
    pub fn new(
        pid: Pid,
        status: Arc<Mutex<Status>>,
        control_tx: mpsc::UnboundedSender<Control>,
        message_count: Arc<AtomicU64>,
        queue_probe: QueueProbe,
    ) -> Self {
        Self {
            pid,
            status,
            control_tx,
            started_at: Instant::now(),
            message_count,
            queue_probe,
        }
    }

    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    pub fn status(&self) -> Status {
        *self.status.lock()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    pub fn queue_size(&self) -> usize {
        (self.queue_probe)()
    }

    /// Requests a stop with the given reason. A no-op if the process has
    /// already finished; the control channel is simply dropped silently.
    pub fn stop(&self, reason: Reason) {
        let _ = self.control_tx.send(Control::Stop(reason));
    }
}

/// The runtime-wide table of live processes, keyed by [`Pid`]. Shared by
/// the registry (name -> pid lookups resolve here for handle access) and
/// the observer (enumeration for snapshots).
#[derive(Clone, Default)]
pub struct ProcessTable {
    inner: Arc<Mutex<HashMap<Pid, ProcessHandle>>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handle built by any process loop, not only
    /// `otp_process::spawn`'s own — `otp-statem`'s runner calls this
    /// directly with a handle it constructed itself.
    pub fn insert(&self, handle: ProcessHandle) {
        self.inner.lock().insert(handle.pid().clone(), handle);
    }

    pub(crate) fn remove(&self, pid: &Pid) {
        self.inner.lock().remove(pid);
    }

    /// Drops a process's entry without going through its own shutdown
    /// path. For a supervisor forcibly reclaiming a child that ignored
    /// its shutdown timeout; not for ordinary use.
    pub fn force_remove(&self, pid: &Pid) {
        self.inner.lock().remove(pid);
    }

    pub fn get(&self, pid: &Pid) -> Option<ProcessHandle> {
        self.inner.lock().get(pid).cloned()
    }

    pub fn contains(&self, pid: &Pid) -> bool {
        self.inner.lock().contains_key(pid)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every live pid, for the observer and `which_children`.
    pub fn pids(&self) -> Vec<Pid> {
        self.inner.lock().keys().cloned().collect()
    }

    pub fn handles(&self) -> Vec<ProcessHandle> {
        self.inner.lock().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otp_types::NodeId;

    fn handle(pid: Pid) -> ProcessHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        ProcessHandle::new(
            pid,
            Arc::new(Mutex::new(Status::Running)),
            tx,
            Arc::new(AtomicU64::new(0)),
            Arc::new(|| 0),
        )
    }

    #[test]
    fn insert_get_remove_roundtrip() {
        let table = ProcessTable::new();
        let node = NodeId::new("n", "localhost", 4000);
        let pid = Pid::generate(node);
        table.insert(handle(pid.clone()));
        assert!(table.contains(&pid));
        assert_eq!(table.len(), 1);
        table.remove(&pid);
        assert!(!table.contains(&pid));
        assert!(table.is_empty());
    }

    #[test]
    fn stop_does_not_panic_after_receiver_dropped() {
        let node = NodeId::new("n", "localhost", 4000);
        let pid = Pid::generate(node);
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let h = ProcessHandle::new(
            pid,
            Arc::new(Mutex::new(Status::Running)),
            tx,
            Arc::new(AtomicU64::new(0)),
            Arc::new(|| 0),
        );
        h.stop(Reason::Normal);
    }
}
