//! # otp-supervisor: restart-strategy supervision
//!
//! The four restart strategies, per-child restart policy,
//! restart-intensity tracking, and ordered startup and shutdown. A
//! supervisor is itself represented by a guardian process in
//! the shared process table, so nesting a supervisor as another
//! supervisor's child works through the same lifecycle-event machinery
//! used for ordinary workers.

mod child;
mod strategy;
mod supervisor;

pub use child::{ChildKind, ChildSpec};
pub use strategy::{ChildSummary, Strategy};
pub use supervisor::Supervisor;

pub use otp_types::{Error, NodeId, Pid, Reason, Restart, Result};
