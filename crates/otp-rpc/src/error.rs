//! RPC-level errors, all ultimately classified as [`otp_types::Error`].

pub use otp_types::{Error as RpcError, Result};
