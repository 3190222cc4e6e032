//! Mailbox shapes for the state machine process loop.

use tokio::sync::oneshot;

use crate::machine::StateMachine;

/// What actually travels over the process's real mpsc channel. Once
/// dequeued, `Call`/`Cast` are normalized into `(Event, Option<ReplyToken>)`
/// pairs immediately — see `crate::runner`.
pub(crate) enum Mail<M: StateMachine> {
    Call {
        event: M::Event,
        reply_tx: oneshot::Sender<M::Reply>,
    },
    Cast {
        event: M::Event,
    },
    /// `get_state`/`get_data` introspection — answered directly by the
    /// runtime, never passed to `handle_event`.
    GetState(oneshot::Sender<M::State>),
    GetData(oneshot::Sender<M::Data>),
}
