//! # otp-types: shared identifiers and error taxonomy
//!
//! This crate contains the types shared across every `otp-*` crate:
//!
//! - Process identity ([`Pid`]) and node identity ([`NodeId`])
//! - The error taxonomy ([`Error`]) described by kind rather than by a
//!   single flat enum per subsystem
//! - The stop/termination reason shape ([`Reason`])
//! - The restart classification used by the supervisor ([`Restart`])
//!
//! No crate in this workspace depends on `anyhow`: every public API returns
//! a classified, `thiserror`-derived error.

mod error;
mod id;
mod reason;

pub use error::Error;
pub use id::{NodeId, Pid};
pub use reason::{Reason, Restart};

/// Workspace-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
