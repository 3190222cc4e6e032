//! The shared error taxonomy.
//!
//! Each subsystem crate may define additional, more specific errors, but
//! every public API that can fail across a crate boundary ultimately
//! surfaces one of these variants (directly, or via `#[from]` into a
//! crate-local error enum that wraps it).

use thiserror::Error;

use crate::{NodeId, Pid};

/// Classified runtime error. Variants are grouped by kind: not found /
/// already present / remote transport / serialization / supervision /
/// call / protocol / handler.
#[derive(Debug, Error)]
pub enum Error {
    // --- not found ---
    #[error("no process registered under name {0:?}")]
    NotRegistered(String),

    #[error("no behavior registered under name {0:?}")]
    UnknownBehavior(String),

    #[error("no global registry entry for name {0:?}")]
    NotGloballyRegistered(String),

    // --- already present ---
    #[error("name {0:?} is already registered")]
    AlreadyRegistered(String),

    // --- remote transport ---
    #[error("node {0} is not reachable")]
    NodeUnreachable(NodeId),

    #[error("remote call to {0} timed out")]
    RemoteCallTimeout(Pid),

    #[error("remote process {0} is no longer running on its node")]
    RemoteProcessGone(Pid),

    // --- serialization ---
    #[error("value is not serializable: {0}")]
    NotSerializable(String),

    // --- supervision ---
    #[error("restart intensity exceeded: {restarts} restarts within {window_ms}ms")]
    MaxRestartsExceeded { restarts: usize, window_ms: u64 },

    // --- call ---
    #[error("call to {0} timed out")]
    CallTimeout(Pid),

    #[error("call to {0} received no reply before timeout")]
    NoReply(Pid),

    // --- protocol ---
    #[error("malformed frame: {0}")]
    BadFrame(String),

    #[error("protocol version mismatch: local={local}, peer={peer}")]
    VersionMismatch { local: u16, peer: u16 },

    #[error("handshake authentication failed for peer {0}")]
    AuthFailed(NodeId),

    // --- handler ---
    #[error("handler for {pid} panicked or returned an error: {message}")]
    Handler { pid: Pid, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
