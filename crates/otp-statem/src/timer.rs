//! Timer classes: state, event, and named generic timeouts, each
//! realized as a cancellable sleep task.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::event::{Timeout, TimeoutKind};

pub(crate) struct TimerFired<E> {
    pub(crate) kind: TimeoutKind,
    pub(crate) event: Option<E>,
}

impl<E> From<TimerFired<E>> for Timeout<E> {
    fn from(fired: TimerFired<E>) -> Self {
        Timeout {
            kind: fired.kind,
            event: fired.event,
        }
    }
}

struct Armed {
    cancel_tx: oneshot::Sender<()>,
}

/// Tracks the single active state timer, the single active event timer, and
/// the set of named generic timers, all delivering through one channel.
pub(crate) struct Timers<E> {
    tx: mpsc::UnboundedSender<TimerFired<E>>,
    state_timer: Option<Armed>,
    event_timer: Option<Armed>,
    generic_timers: HashMap<String, Armed>,
}

impl<E: Send + 'static> Timers<E> {
    pub(crate) fn new(tx: mpsc::UnboundedSender<TimerFired<E>>) -> Self {
        Self {
            tx,
            state_timer: None,
            event_timer: None,
            generic_timers: HashMap::new(),
        }
    }

    fn arm(&self, kind: TimeoutKind, time: Duration, event: Option<E>) -> Armed {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(time) => {
                    let _ = tx.send(TimerFired { kind, event });
                }
                _ = cancel_rx => {}
            }
        });
        Armed { cancel_tx }
    }

    pub(crate) fn set_state_timeout(&mut self, time: Duration, event: Option<E>) {
        self.cancel_state_timeout();
        self.state_timer = Some(self.arm(TimeoutKind::State, time, event));
    }

    pub(crate) fn cancel_state_timeout(&mut self) {
        if let Some(armed) = self.state_timer.take() {
            let _ = armed.cancel_tx.send(());
        }
    }

    pub(crate) fn set_event_timeout(&mut self, time: Duration, event: Option<E>) {
        self.cancel_event_timeout();
        self.event_timer = Some(self.arm(TimeoutKind::Event, time, event));
    }

    pub(crate) fn cancel_event_timeout(&mut self) {
        if let Some(armed) = self.event_timer.take() {
            let _ = armed.cancel_tx.send(());
        }
    }

    /// `time == 0` cancels the named timer outright; otherwise a new timer
    /// replaces whatever was previously registered under `name`.
    pub(crate) fn set_generic_timeout(&mut self, name: String, time: Duration, event: Option<E>) {
        if let Some(armed) = self.generic_timers.remove(&name) {
            let _ = armed.cancel_tx.send(());
        }
        if !time.is_zero() {
            let armed = self.arm(TimeoutKind::Generic(name.clone()), time, event);
            self.generic_timers.insert(name, armed);
        }
    }

    pub(crate) fn cancel_all(&mut self) {
        self.cancel_state_timeout();
        self.cancel_event_timeout();
        for (_, armed) in self.generic_timers.drain() {
            let _ = armed.cancel_tx.send(());
        }
    }
}
