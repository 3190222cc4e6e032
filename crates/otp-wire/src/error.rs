//! Wire-level error types.
//!
//! Every variant here has a corresponding [`otp_types::Error`] it converts
//! into at the crate boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame exceeds maximum length ({len} > {max})")]
    FrameTooLarge { len: u32, max: u32 },

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("protocol version mismatch: local={local}, peer={peer}")]
    VersionMismatch { local: u16, peer: u16 },

    #[error("handshake authentication failed")]
    AuthFailed,

    #[error("peer closed the connection")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, WireError>;

impl From<WireError> for otp_types::Error {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Io(e) => otp_types::Error::Io(e),
            WireError::FrameTooLarge { .. } | WireError::Malformed(_) => {
                otp_types::Error::BadFrame(err.to_string())
            }
            WireError::VersionMismatch { local, peer } => {
                otp_types::Error::VersionMismatch { local, peer }
            }
            WireError::AuthFailed | WireError::ConnectionClosed => {
                otp_types::Error::BadFrame(err.to_string())
            }
        }
    }
}
