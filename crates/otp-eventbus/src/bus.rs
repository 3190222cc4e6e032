//! Topic-pattern publish/subscribe.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
type Handler<T> = Arc<dyn Fn(String, T) -> HandlerFuture + Send + Sync>;

/// Identifies a live subscription; returned by [`EventBus::subscribe`] and
/// consumed by [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription<T> {
    id: SubscriptionId,
    pattern: String,
    handler: Handler<T>,
}

struct PendingPublish<T> {
    topic: String,
    payload: T,
}

struct State<T> {
    subs: Vec<Subscription<T>>,
    publishing: bool,
    pending: VecDeque<PendingPublish<T>>,
}

/// A topic-keyed publish/subscribe bus. `T` is the payload type carried by
/// every publish on this bus instance.
pub struct EventBus<T> {
    state: Arc<Mutex<State<T>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventBus<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                subs: Vec::new(),
                publishing: false,
                pending: VecDeque::new(),
            })),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Registers `handler` against `pattern`. Returns an id usable with
    /// [`EventBus::unsubscribe`]. Subscribing while a publish is in flight
    /// never affects that publish's already-taken snapshot of subscribers.
    pub fn subscribe<F, Fut>(&self, pattern: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(String, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: Handler<T> = Arc::new(move |topic, payload| Box::pin(handler(topic, payload)));
        self.state.lock().subs.push(Subscription {
            id,
            pattern: pattern.into(),
            handler,
        });
        id
    }

    /// Removes a subscription. Idempotent: unsubscribing twice, or an id
    /// that never existed, is a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.state.lock().subs.retain(|s| s.id != id);
    }

    /// Publishes `payload` on `topic`. Every subscriber whose pattern
    /// matches `topic`, snapshotted at call time and invoked in
    /// subscription order.
    ///
    /// Calling `publish` from inside a handler currently running as part
    /// of another publish's fan-out does not interleave with it: the
    /// reentrant publish is queued and runs, in order, once the in-flight
    /// fan-out finishes.
    pub async fn publish(&self, topic: impl Into<String>, payload: T) {
        let topic = topic.into();
        {
            let mut state = self.state.lock();
            if state.publishing {
                state.pending.push_back(PendingPublish { topic, payload });
                return;
            }
            state.publishing = true;
        }

        self.run_fanout(topic, payload).await;

        loop {
            let next = {
                let mut state = self.state.lock();
                match state.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        state.publishing = false;
                        break;
                    }
                }
            };
            self.run_fanout(next.topic, next.payload).await;
        }
    }

    async fn run_fanout(&self, topic: String, payload: T) {
        let matching: Vec<Handler<T>> = {
            let state = self.state.lock();
            state
                .subs
                .iter()
                .filter(|s| otp_registry::matches(&s.pattern, &topic))
                .map(|s| s.handler.clone())
                .collect()
        };

        for handler in matching {
            if let Err(error) = (handler)(topic.clone(), payload.clone()).await {
                tracing::warn!(topic = %topic, error, "event bus subscriber returned an error");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn matching_subscribers_receive_publish() {
        let bus: EventBus<u32> = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        bus.subscribe("orders:*", move |_topic, payload: u32| {
            let seen = seen2.clone();
            async move {
                seen.fetch_add(payload as usize, Ordering::Relaxed);
                Ok(())
            }
        });
        bus.publish("orders:created", 5).await;
        bus.publish("shipping:created", 100).await;
        assert_eq!(seen.load(Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let bus: EventBus<u32> = EventBus::new();
        let id = bus.subscribe("*", |_, _: u32| async { Ok(()) });
        bus.unsubscribe(id);
        bus.unsubscribe(id);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_added_during_publish_is_not_called_for_that_publish() {
        let bus: EventBus<u32> = EventBus::new();
        let late_calls = Arc::new(AtomicUsize::new(0));
        let late_calls2 = late_calls.clone();
        let bus_clone = bus.clone();
        bus.subscribe("topic", move |_, _: u32| {
            let bus_clone = bus_clone.clone();
            let late_calls2 = late_calls2.clone();
            async move {
                bus_clone.subscribe("topic", move |_, _: u32| {
                    let late_calls2 = late_calls2.clone();
                    async move {
                        late_calls2.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                });
                Ok(())
            }
        });
        bus.publish("topic", 1).await;
        assert_eq!(late_calls.load(Ordering::Relaxed), 0);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn one_handler_erroring_does_not_block_the_rest() {
        let bus: EventBus<u32> = EventBus::new();
        let second_ran = Arc::new(AtomicUsize::new(0));
        let second_ran2 = second_ran.clone();
        bus.subscribe("topic", |_, _: u32| async { Err("boom".to_string()) });
        bus.subscribe("topic", move |_, _: u32| {
            let second_ran2 = second_ran2.clone();
            async move {
                second_ran2.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        });
        bus.publish("topic", 1).await;
        assert_eq!(second_ran.load(Ordering::Relaxed), 1);
    }
}
