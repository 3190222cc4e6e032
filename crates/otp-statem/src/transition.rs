//! Transition results and actions.

use std::time::Duration;

use otp_process::ReplyToken;
use otp_types::Reason;

/// A side effect attached to a [`Transition`].
pub enum Action<E, R> {
    /// Fires after `time` unless the state changes first; replaces any
    /// currently pending state timeout.
    StateTimeout { time: Duration, event: Option<E> },
    /// Fires after `time` of no incoming events; reset on every processed
    /// event.
    EventTimeout { time: Duration, event: Option<E> },
    /// A named timer that survives state transitions. Re-installing the
    /// same `name` with `time` zero cancels it; a different `time`
    /// replaces it.
    GenericTimeout {
        name: String,
        time: Duration,
        event: Option<E>,
    },
    /// Injects `event` as the very next event processed, ahead of the
    /// mailbox and ahead of the postpone-queue replay.
    NextEvent { event: E },
    /// Replies to a deferred call captured earlier via `handle_event`'s
    /// `from` argument.
    Reply { to: ReplyToken<R>, value: R },
}

/// What a state handler decided to do in response to one event.
pub enum Transition<S, D, E, R> {
    /// Run `on_exit`, switch state, run `on_enter`, apply actions, then
    /// replay the postpone queue if the state actually changed.
    Transition {
        next_state: S,
        data: D,
        actions: Vec<Action<E, R>>,
    },
    /// Same state, new data. `on_enter`/`on_exit` do not run.
    KeepState { data: D, actions: Vec<Action<E, R>> },
    /// Same state, same data.
    KeepStateAndData { actions: Vec<Action<E, R>> },
    /// Buffer this event; it is replayed, in order, right after the next
    /// state change.
    Postpone,
    /// Run `terminate` and stop.
    Stop { reason: Reason, data: D },
}
