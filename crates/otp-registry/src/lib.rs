//! # otp-registry: local name tables
//!
//! Unique and duplicate keyed registries, glob-style pattern matching,
//! and automatic cleanup when a registered process terminates.
//!
//! There is no single global instance baked into this crate — each
//! [`Registry::new`] call produces an isolated table, matching the
//! isolated-instances contract. An application wanting a process-wide
//! default registry constructs one at startup and shares the handle,
//! which is cheap to clone.

mod entry;
mod pattern;
mod registry;

pub use entry::Entry;
pub use pattern::matches;
pub use registry::{Keys, Registry};

pub use otp_types::{Error, Pid, Result};
