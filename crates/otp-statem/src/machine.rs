//! The `StateMachine` trait.

use async_trait::async_trait;

use otp_process::ReplyToken;
use otp_types::Reason;

use crate::event::Event;
use crate::transition::Transition;

/// A behavior with explicit, named states. Unlike [`otp_process::Behavior`],
/// which hands the user a single opaque message alphabet, a state machine
/// dispatches every event through one `handle_event` entry point alongside
/// its current state name, so one handler can react differently per state
/// without the caller needing a match arm per state.
#[async_trait]
pub trait StateMachine: Send + 'static {
    type State: Clone + Eq + Send + std::fmt::Debug + 'static;
    type Data: Clone + Send + 'static;
    type Event: Send + Clone + 'static;
    type Reply: Send + 'static;

    /// Produces the initial state and data.
    fn init(&mut self) -> (Self::State, Self::Data);

    /// Handles one event while in `state`. `from` is present only when this
    /// event originated from a `call`; capturing it out of the handler
    /// implements the deferred-reply pattern via a later `reply` action.
    async fn handle_event(
        &mut self,
        state: &Self::State,
        event: Event<Self::Event>,
        data: Self::Data,
        from: Option<&ReplyToken<Self::Reply>>,
    ) -> Transition<Self::State, Self::Data, Self::Event, Self::Reply>;

    /// Runs after switching into `state` (not on `keep_state`/
    /// `keep_state_and_data`).
    async fn on_enter(&mut self, _state: &Self::State, _data: &Self::Data, _previous: &Self::State) {
    }

    /// Runs before switching away from `state`.
    async fn on_exit(&mut self, _state: &Self::State, _data: &Self::Data, _next: &Self::State) {}

    async fn terminate(&mut self, _reason: &Reason, _data: &Self::Data) {}
}
