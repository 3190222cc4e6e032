//! # otp
//!
//! An Erlang/OTP-inspired actor runtime: single-consumer mailbox
//! processes, a generic server behavior, restart-strategy supervisors, a
//! local name registry, a topic event bus, an explicit state machine
//! behavior, and — behind the `cluster` feature — cluster membership,
//! wire transport, remote invocation, and a cluster-wide registry.
//!
//! # Quick start
//!
//! ```ignore
//! use otp::prelude::*;
//!
//! struct Counter(u64);
//!
//! #[async_trait::async_trait]
//! impl Behavior for Counter {
//!     type Message = ();
//!     type Reply = u64;
//!
//!     async fn handle_call(
//!         &mut self,
//!         _msg: (),
//!         _from: &ReplyToken<u64>,
//!     ) -> HandlerResult<CallOutcome<u64>> {
//!         self.0 += 1;
//!         Ok(CallOutcome::Reply(self.0))
//!     }
//!
//!     async fn handle_cast(&mut self, _msg: ()) -> HandlerResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! let node = NodeId::new("app", "localhost", 4369);
//! let table = ProcessTable::new();
//! let bus = LifecycleBus::default();
//! let counter = spawn(Counter(0), node, table, bus);
//! ```
//!
//! # Modules
//!
//! - **Process runtime**: [`prelude::Behavior`], [`prelude::spawn`],
//!   [`prelude::ServerRef`] ([`otp_process`])
//! - **Supervision**: [`prelude::Supervisor`], [`prelude::ChildSpec`]
//!   ([`otp_supervisor`])
//! - **Registry & events**: [`prelude::Registry`], [`prelude::EventBus`]
//!   ([`otp_registry`], [`otp_eventbus`])
//! - **State machines**: [`prelude::StateMachine`] ([`otp_statem`])
//! - **Introspection**: [`prelude::Observer`] ([`otp_observer`])
//! - **Cluster** (feature `cluster`): [`otp_cluster`], [`otp_wire`],
//!   [`otp_rpc`], [`otp_global_registry`]
//! - **Configuration** (feature `config`): [`otp_config`]
//!
//! Wiring a `tracing` subscriber is left to the embedding application —
//! every crate here instruments with `tracing` spans/events but none
//! installs a global subscriber on your behalf.

#[cfg(feature = "cluster")]
pub use otp_cluster;
#[cfg(feature = "config")]
pub use otp_config;
pub use otp_eventbus;
pub use otp_observer;
pub use otp_process;
pub use otp_registry;
#[cfg(feature = "cluster")]
pub use otp_rpc;
pub use otp_statem;
pub use otp_supervisor;
#[cfg(feature = "test-support")]
pub use otp_test_harness;
pub use otp_types;
#[cfg(feature = "cluster")]
pub use otp_wire;

#[cfg(feature = "cluster")]
pub use otp_global_registry;

/// Everything most applications need in one `use otp::prelude::*;`.
pub mod prelude {
    pub use otp_types::{Error, NodeId, Pid, Reason, Restart, Result};

    pub use otp_process::{
        spawn, Behavior, CallOutcome, Control, Envelope, HandlerResult, LifecycleBus,
        LifecycleEvent, ProcessHandle, ProcessTable, ReplyToken, ServerRef, Status,
    };

    pub use otp_registry::{Entry, Registry};

    pub use otp_eventbus::{EventBus, SubscriptionId};

    pub use otp_supervisor::{ChildKind, ChildSpec, ChildSummary, Strategy, Supervisor};

    pub use otp_statem::{
        Action, Event, StateMachine, StateMachineRef, Timeout, TimeoutKind, Transition,
    };

    pub use otp_observer::{
        AlertConfig, AlertConfigUpdate, AlertManager, Observer, ObserverEvent, PollHandle,
        Snapshot,
    };

    #[cfg(feature = "cluster")]
    pub use otp_cluster::{Cluster, ClusterError, ClusterEvent, StartOptions};

    #[cfg(feature = "cluster")]
    pub use otp_rpc::{BehaviorRegistry, RemoteProcess, Rpc, RpcError};

    #[cfg(feature = "cluster")]
    pub use otp_global_registry::{GlobalEntry, GlobalRegistry, GlobalRegistryEvent};

    #[cfg(feature = "cluster")]
    pub use otp_wire::Frame;

    #[cfg(feature = "config")]
    pub use otp_config::{ConfigLoader, RuntimeConfig};

    #[cfg(feature = "test-support")]
    pub use otp_test_harness::TestRuntime;
}
