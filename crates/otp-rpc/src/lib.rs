//! # otp-rpc: transparent call/cast routing and remote spawn
//!
//! `BehaviorRegistry`, remote `spawn_request`, and the transparent
//! `call`/`cast` routing that compares a [`Pid`]'s node id against the
//! local node to decide between direct local dispatch and a wire
//! round-trip.
//!
//! Registration (`local`/`global`/`none`) carried in `spawn_request` is
//! applied on the node that actually runs the spawned process — the
//! receiver, not the initiator, since only the receiver's local/global
//! registry can hold an entry for a `Pid` it owns. `Rpc::start` takes the
//! node's `otp_registry::Registry<Pid>` and `otp_global_registry::GlobalRegistry`
//! handles for this; `Rpc::expose` remains the way to reach an
//! independently-spawned process by `Pid` without going through
//! `spawn_request` at all.

mod error;
mod registry;
mod rpc;

pub use error::{Result, RpcError};
pub use registry::{BehaviorRegistry, RemoteProcess};
pub use rpc::Rpc;

pub use otp_types::{NodeId, Pid};
pub use otp_wire::Registration;
