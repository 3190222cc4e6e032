//! # otp-wire: framed wire protocol and handshake authentication
//!
//! The big-endian length-prefixed frame, the tagged message shape, and
//! the `hello`/`hello_ack` HMAC-SHA256 handshake. This crate owns
//! bytes-on-the-wire only — cluster membership lives in `otp_cluster`,
//! call/cast/spawn routing in `otp_rpc`.

mod codec;
mod error;
mod handshake;
mod message;

pub use codec::{read_frame, read_framed, write_frame, write_framed, MAX_FRAME_LEN};
pub use error::{Result, WireError};
pub use handshake::{accept, initiate, PeerIdentity};
pub use message::{Frame, Message, Registration, RegistryEntryWire, WireRef, PROTOCOL_VERSION};
