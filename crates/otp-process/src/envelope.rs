//! Mailbox envelope shapes.

use tokio::sync::oneshot;

use crate::behavior::Behavior;

/// One pending mailbox entry.
pub enum Envelope<B: Behavior> {
    /// A synchronous request awaiting a reply.
    Call {
        message: B::Message,
        reply_tx: oneshot::Sender<B::Reply>,
    },
    /// A one-way send.
    Cast { message: B::Message },
}
