//! The polling loop: emits an initial snapshot immediately, then one
//! every `interval`, driving the alert manager's sample intake on each
//! tick.

use std::time::Duration;

use crate::snapshot::Snapshot;
use crate::Observer;

/// A running poll loop. Dropping this stops the loop; [`Self::stop`] does
/// the same, explicitly.
pub struct PollHandle {
    task: tokio::task::JoinHandle<()>,
}

impl PollHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub(crate) fn start<F>(observer: Observer, interval: Duration, mut handler: F) -> PollHandle
where
    F: FnMut(Snapshot) + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick of `tokio::time::interval` fires immediately,
        // matching "emits an initial event immediately, then at the
        // interval".
        loop {
            ticker.tick().await;
            let snapshot = observer.tick_and_snapshot();
            handler(snapshot);
        }
    });

    PollHandle { task }
}
