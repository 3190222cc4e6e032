//! # otp-process: the process runtime and generic server behavior
//!
//! Process identity, mailbox, cooperative single-threaded scheduling of
//! handlers, lifecycle states, and the `call`/`cast`/`stop` ergonomic
//! surface.
//!
//! A process is one `tokio` task that owns the receiving half of its
//! mailbox. It dequeues one [`Envelope`], runs the matching [`Behavior`]
//! method to completion, then dequeues the next — so at most one handler
//! invocation for a given process is ever in flight, regardless of how
//! many processes run concurrently on the runtime.

mod behavior;
mod envelope;
mod lifecycle;
mod process;
mod reply;
mod table;

pub use behavior::{Behavior, CallOutcome, HandlerResult};
pub use envelope::Envelope;
pub use lifecycle::{LifecycleBus, LifecycleEvent};
pub use process::{spawn, ServerRef};
pub use reply::ReplyToken;
pub use table::{Control, ProcessHandle, ProcessTable, QueueProbe, Status};

pub use otp_types::{Error, NodeId, Pid, Reason, Result};
