//! # otp-test-harness: in-process test doubles for `otp`
//!
//! [`TestRuntime`] assembles a node identity, a shared process table, and
//! a lifecycle bus with sane defaults, so a test spawning a behavior or
//! starting a supervisor doesn't have to wire those up by hand. Behind
//! the `test-support` feature, [`strategy`] adds `proptest::Strategy`
//! implementations for [`otp_types::Pid`]/[`otp_types::NodeId`].

mod runtime;

#[cfg(feature = "test-support")]
pub mod strategy;

pub use runtime::TestRuntime;
