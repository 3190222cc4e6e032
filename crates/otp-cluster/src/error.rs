//! Cluster-level errors.

use otp_types::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Wire(#[from] otp_wire::WireError),

    #[error("invalid seed address {0:?}: {1}")]
    InvalidSeed(String, String),

    #[error("node {0} is not a known peer")]
    UnknownPeer(NodeId),

    #[error("cluster is already stopped")]
    AlreadyStopped,
}

pub type Result<T> = std::result::Result<T, ClusterError>;

impl From<ClusterError> for otp_types::Error {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::Io(e) => otp_types::Error::Io(e),
            ClusterError::Wire(e) => e.into(),
            ClusterError::UnknownPeer(node) => otp_types::Error::NodeUnreachable(node),
            ClusterError::InvalidSeed(_, _) | ClusterError::AlreadyStopped => {
                otp_types::Error::BadFrame(err.to_string())
            }
        }
    }
}
