//! # otp-cluster: cluster membership
//!
//! Node identity, seed discovery, heartbeat keepalive,
//! capped-exponential-backoff reconnect, and `node_up`/
//! `node_down`/`cluster_state_changed` events.
//!
//! Unlike a supervisor that restarts an OS child process and polls
//! `is_alive()`, here the connection itself is the thing that is
//! monitored and restarted, not a child process.

mod error;
mod events;
mod membership;
mod options;
mod peer;

pub use error::{ClusterError, Result};
pub use events::ClusterEvent;
pub use membership::Cluster;
pub use options::StartOptions;

pub use otp_types::NodeId;
pub use otp_wire::Frame;
