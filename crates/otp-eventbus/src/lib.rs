//! # otp-eventbus: topic pub/sub
//!
//! Synchronous, subscription-ordered fan-out over a topic tree, using
//! the same `*`/`**`/`?` glob syntax as the name registry (reused from
//! [`otp_registry::matches`]).
//!
//! Reentrant publishes — a handler publishing again while its own
//! fan-out is still running — are deferred until the in-flight fan-out
//! finishes rather than interleaved with it.

mod bus;

pub use bus::{EventBus, SubscriptionId};
