//! # otp-statem: explicit state machine behavior
//!
//! A behavior with named states, each owning its own event handler plus
//! optional `on_enter`/`on_exit` hooks, driven through the same
//! underlying mailbox-and-single-consumer-loop machinery as
//! [`otp_process::Behavior`] (the state machine is not a separate runtime
//! — it is a [`StateMachine`] wrapped into a process loop that
//! additionally tracks a postpone queue and three timer classes).
//!
//! Transition results: `transition` / `keep_state` / `keep_state_and_data`
//! / `postpone` / `stop`. Timer/action kinds: `state_timeout` /
//! `event_timeout` / `generic_timeout` / `next_event` / `reply`.

mod event;
mod machine;
mod mail;
mod runner;
mod timer;
mod transition;

pub use event::{Event, Timeout, TimeoutKind};
pub use machine::StateMachine;
pub use runner::{spawn, StateMachineRef};
pub use transition::{Action, Transition};

pub use otp_process::{LifecycleBus, ReplyToken};
pub use otp_types::{Error, NodeId, Pid, Reason, Result};
