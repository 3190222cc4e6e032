//! # otp-observer: read-only runtime introspection
//!
//! A point-in-time [`Snapshot`] of every live process and tracked
//! supervisor, a polling loop that emits one on an interval, a
//! subscription feed of [`ObserverEvent`]s (process/supervisor
//! lifecycle, stats updates, queue-depth alerts), and the wire contract
//! a remote dashboard would speak over its own connection. None of this
//! can stop or restart a process on its own initiative; the one
//! exception — an operator-issued stop — goes through the same
//! `ProcessHandle::stop` every other caller uses.

mod alert;
mod dashboard;
mod observer;
mod poll;
mod snapshot;

pub use alert::{AlertConfig, AlertConfigUpdate, AlertManager, AlertTransition};
pub use dashboard::{read_message, write_message, DashboardLifecycleEvent, DashboardMessage};
pub use observer::{Observer, ObserverEvent, SubscriptionId};
pub use poll::PollHandle;
pub use snapshot::{
    ChildKindWire, ChildStats, MemoryStats, ProcessStats, Snapshot, StatusWire, StrategyWire,
    SupervisorStats, TreeNode,
};
