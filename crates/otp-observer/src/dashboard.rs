//! The dashboard server's wire contract: same big-endian-length ‖
//! `postcard` framing as the cluster transport (via [`otp_wire`]'s generic
//! `write_framed`/`read_framed`), on a separate listening port, with its
//! own tagged message set. No TUI client is built against this — the
//! shape is the contract a remote dashboard would speak.

use otp_types::{Pid, Reason};
use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

/// One frame of the dashboard protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DashboardMessage {
    /// Server push: a full snapshot, at the configured polling interval.
    Snapshot(Snapshot),
    /// Server push: a process started or stopped.
    LifecycleEvent(DashboardLifecycleEvent),
    /// Client request: start receiving `Snapshot`/`LifecycleEvent` pushes.
    Subscribe,
    /// Client request: stop receiving pushes (the connection itself stays
    /// open).
    Unsubscribe,
    /// Client admin request: stop a process by id.
    StopProcess { id: Pid, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DashboardLifecycleEvent {
    ServerStarted { id: Pid },
    ServerStopped { id: Pid, reason: String },
}

impl DashboardLifecycleEvent {
    pub(crate) fn stopped(id: Pid, reason: &Reason) -> Self {
        Self::ServerStopped {
            id,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn started(id: Pid) -> Self {
        Self::ServerStarted { id }
    }
}

/// Writes one [`DashboardMessage`], length-prefixed, to `writer`.
pub async fn write_message<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    message: &DashboardMessage,
) -> otp_wire::Result<()> {
    otp_wire::write_framed(writer, message).await
}

/// Reads one [`DashboardMessage`] from `reader`.
pub async fn read_message<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
) -> otp_wire::Result<DashboardMessage> {
    otp_wire::read_framed(reader).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn subscribe_and_stop_process_round_trip_the_framing() {
        let (mut a, mut b) = duplex(8192);

        write_message(&mut a, &DashboardMessage::Subscribe).await.unwrap();
        let decoded = read_message(&mut b).await.unwrap();
        assert!(matches!(decoded, DashboardMessage::Subscribe));

        let node = otp_types::NodeId::new("n", "localhost", 4000);
        let msg = DashboardMessage::StopProcess {
            id: Pid::new("proc-1", node),
            reason: "operator request".to_string(),
        };
        write_message(&mut a, &msg).await.unwrap();
        let decoded = read_message(&mut b).await.unwrap();
        assert!(matches!(decoded, DashboardMessage::StopProcess { reason, .. } if reason == "operator request"));
    }
}
