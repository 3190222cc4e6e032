//! Event and timeout shapes delivered to [`crate::StateMachine::handle_event`].

/// Which timer class fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutKind {
    State,
    Event,
    Generic(String),
}

/// The payload of a synthetic timeout event.
#[derive(Debug, Clone)]
pub struct Timeout<E> {
    pub kind: TimeoutKind,
    pub event: Option<E>,
}

/// Everything `handle_event` can receive: a user event, or a fired timer.
#[derive(Debug, Clone)]
pub enum Event<E> {
    External(E),
    Timeout(Timeout<E>),
}
