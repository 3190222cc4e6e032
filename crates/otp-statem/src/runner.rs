//! Drives a [`StateMachine`] as a process: dequeues one event at a time,
//! applies its `Transition`, and maintains the postpone queue and the
//! three timer classes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use otp_process::{Control, LifecycleBus, LifecycleEvent, ProcessHandle, ProcessTable, ReplyToken, Status};
use otp_types::{Error, NodeId, Pid, Reason, Result};

use crate::event::{Event, Timeout};
use crate::machine::StateMachine;
use crate::mail::Mail;
use crate::timer::{TimerFired, Timers};
use crate::transition::{Action, Transition};

const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

/// One dequeued unit of work: an event plus the deferred-reply token, if
/// the event originated from a `call`.
struct Pending<M: StateMachine> {
    event: Event<M::Event>,
    from: Option<ReplyToken<M::Reply>>,
}

/// A typed handle to a running state machine. Mirrors
/// [`otp_process::ServerRef`]'s `call`/`cast`/`stop` surface, plus
/// `get_state`/`get_data` introspection.
pub struct StateMachineRef<M: StateMachine> {
    pid: Pid,
    mailbox_tx: mpsc::Sender<Mail<M>>,
    handle: ProcessHandle,
}

impl<M: StateMachine> Clone for StateMachineRef<M> {
    fn clone(&self) -> Self {
        Self {
            pid: self.pid.clone(),
            mailbox_tx: self.mailbox_tx.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<M: StateMachine> StateMachineRef<M> {
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    pub fn status(&self) -> Status {
        self.handle.status()
    }

    pub async fn cast(&self, event: M::Event) -> Result<()> {
        self.mailbox_tx
            .send(Mail::Cast { event })
            .await
            .map_err(|_| Error::RemoteProcessGone(self.pid.clone()))
    }

    pub async fn call(&self, event: M::Event, timeout: Duration) -> Result<M::Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.mailbox_tx
            .send(Mail::Call { event, reply_tx })
            .await
            .map_err(|_| Error::RemoteProcessGone(self.pid.clone()))?;

        let deadline = tokio::time::Instant::now() + timeout;
        match tokio::time::timeout_at(deadline, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_closed_early)) => {
                tokio::time::sleep_until(deadline).await;
                Err(Error::NoReply(self.pid.clone()))
            }
            Err(_elapsed) => Err(Error::CallTimeout(self.pid.clone())),
        }
    }

    pub async fn get_state(&self) -> Result<M::State> {
        let (tx, rx) = oneshot::channel();
        self.mailbox_tx
            .send(Mail::GetState(tx))
            .await
            .map_err(|_| Error::RemoteProcessGone(self.pid.clone()))?;
        rx.await.map_err(|_| Error::RemoteProcessGone(self.pid.clone()))
    }

    pub async fn get_data(&self) -> Result<M::Data> {
        let (tx, rx) = oneshot::channel();
        self.mailbox_tx
            .send(Mail::GetData(tx))
            .await
            .map_err(|_| Error::RemoteProcessGone(self.pid.clone()))?;
        rx.await.map_err(|_| Error::RemoteProcessGone(self.pid.clone()))
    }

    pub fn stop(&self, reason: Reason) {
        self.handle.stop(reason);
    }
}

/// Spawns `machine` as a new process under `node`, registering it in
/// `table` and announcing lifecycle events on `bus` exactly like
/// `otp_process::spawn` does for an ordinary [`otp_process::Behavior`].
pub fn spawn<M: StateMachine>(
    mut machine: M,
    node: NodeId,
    table: ProcessTable,
    bus: LifecycleBus,
) -> StateMachineRef<M> {
    let pid = Pid::generate(node);
    let (mailbox_tx, mailbox_rx) = mpsc::channel(DEFAULT_MAILBOX_CAPACITY);
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let status = Arc::new(Mutex::new(Status::Initializing));
    let message_count = Arc::new(AtomicU64::new(0));

    let probe_tx = mailbox_tx.clone();
    let queue_probe: otp_process::QueueProbe =
        Arc::new(move || probe_tx.max_capacity() - probe_tx.capacity());

    let handle = ProcessHandle::new(
        pid.clone(),
        status.clone(),
        control_tx,
        message_count.clone(),
        queue_probe,
    );
    table.insert(handle.clone());

    let run_pid = pid.clone();
    let run_table = table.clone();
    tokio::spawn(async move {
        run_loop(
            run_pid,
            &mut machine,
            mailbox_rx,
            control_rx,
            status,
            bus,
            run_table,
            message_count,
        )
        .await;
    });

    StateMachineRef {
        pid,
        mailbox_tx,
        handle,
    }
}

async fn run_loop<M: StateMachine>(
    pid: Pid,
    machine: &mut M,
    mut mailbox_rx: mpsc::Receiver<Mail<M>>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    status: Arc<Mutex<Status>>,
    bus: LifecycleBus,
    table: ProcessTable,
    message_count: Arc<AtomicU64>,
) {
    let (state, data) = machine.init();
    let mut state = state;
    let mut data = data;

    *status.lock() = Status::Running;
    bus.emit(LifecycleEvent::Started(pid.clone()));

    let (timer_tx, mut timer_rx) = mpsc::unbounded_channel::<TimerFired<M::Event>>();
    let mut timers = Timers::new(timer_tx);

    // Front-of-mailbox queue: `next_event` injections and postpone-queue
    // replays both cut ahead of whatever is still waiting in the real
    // mailbox.
    let mut front: VecDeque<Pending<M>> = VecDeque::new();
    let mut postponed: VecDeque<Pending<M>> = VecDeque::new();

    let stop_reason = 'outer: loop {
        let pending = if let Some(pending) = front.pop_front() {
            pending
        } else {
            tokio::select! {
                biased;

                control = control_rx.recv() => {
                    match control {
                        Some(Control::Stop(reason)) => break 'outer reason,
                        None => break 'outer Reason::Shutdown,
                    }
                }

                mail = mailbox_rx.recv() => {
                    if mail.is_some() {
                        message_count.fetch_add(1, Ordering::Relaxed);
                    }
                    match mail {
                        Some(Mail::Call { event, reply_tx }) => Pending {
                            event: Event::External(event),
                            from: Some(ReplyToken::new(reply_tx)),
                        },
                        Some(Mail::Cast { event }) => Pending {
                            event: Event::External(event),
                            from: None,
                        },
                        Some(Mail::GetState(tx)) => {
                            let _ = tx.send(state.clone());
                            continue 'outer;
                        }
                        Some(Mail::GetData(tx)) => {
                            let _ = tx.send(data.clone());
                            continue 'outer;
                        }
                        None => break 'outer Reason::Shutdown,
                    }
                }

                fired = timer_rx.recv() => {
                    match fired {
                        Some(fired) => Pending {
                            event: Event::Timeout(Timeout::from(fired)),
                            from: None,
                        },
                        None => continue 'outer,
                    }
                }
            }
        };

        // "event_timeout resets on any incoming events processed" —
        // cancel it before running the handler; a `StateTimeout`... no, an
        // `EventTimeout` action in this result's actions re-arms it.
        timers.cancel_event_timeout();

        // Cloned rather than moved: a `Postpone` result needs the original
        // event back to buffer it for later replay.
        let event_for_handler = pending.event.clone();
        let transition = machine
            .handle_event(&state, event_for_handler, data.clone(), pending.from.as_ref())
            .await;

        match transition {
            Transition::Transition {
                next_state,
                data: new_data,
                actions,
            } => {
                let state_changed = next_state != state;
                if state_changed {
                    let previous = state.clone();
                    machine.on_exit(&state, &data, &next_state).await;
                    state = next_state;
                    data = new_data;
                    machine.on_enter(&state, &data, &previous).await;
                    timers.cancel_state_timeout();
                } else {
                    data = new_data;
                }

                let mut next_events = apply_actions(actions, &mut timers);
                front.append(&mut next_events);
                // Replay postponed events, in FIFO order, right after any
                // `next_event` injection — but only if the state actually
                // changed; a same-state `Transition` result leaves them
                // buffered, same as `keep_state`.
                if state_changed {
                    front.extend(postponed.drain(..));
                }
            }
            Transition::KeepState { data: new_data, actions } => {
                data = new_data;
                let mut next_events = apply_actions(actions, &mut timers);
                front.append(&mut next_events);
            }
            Transition::KeepStateAndData { actions } => {
                let mut next_events = apply_actions(actions, &mut timers);
                front.append(&mut next_events);
            }
            Transition::Postpone => {
                postponed.push_back(pending);
            }
            Transition::Stop { reason, data: final_data } => {
                data = final_data;
                break 'outer reason;
            }
        }
    };

    timers.cancel_all();
    *status.lock() = Status::Stopping;
    machine.terminate(&stop_reason, &data).await;
    *status.lock() = Status::Stopped;
    table.remove(&pid);
    bus.emit(LifecycleEvent::Terminated(pid, stop_reason));
}

/// Applies a transition's actions in spec order: timer installs/cancels,
/// then deferred replies, then `next_event` injections. Returns the
/// `next_event` injections as a queue to be pushed to the front of the
/// mailbox ahead of any postpone-queue replay.
fn apply_actions<M: StateMachine>(
    actions: Vec<Action<M::Event, M::Reply>>,
    timers: &mut Timers<M::Event>,
) -> VecDeque<Pending<M>> {
    let mut replies = Vec::new();
    let mut next_events = VecDeque::new();

    for action in actions {
        match action {
            Action::StateTimeout { time, event } => timers.set_state_timeout(time, event),
            Action::EventTimeout { time, event } => timers.set_event_timeout(time, event),
            Action::GenericTimeout { name, time, event } => {
                timers.set_generic_timeout(name, time, event);
            }
            Action::NextEvent { event } => next_events.push_back(Pending {
                event: Event::External(event),
                from: None,
            }),
            Action::Reply { to, value } => replies.push((to, value)),
        }
    }

    for (to, value) in replies {
        let _ = to.reply(value);
    }

    next_events
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    use otp_process::LifecycleBus;

    /// `init` postpones `"work"`; `"init_done"` transitions to `ready`;
    /// `ready` must then see `"work"` before any later-enqueued message.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum DoorState {
        Init,
        Ready,
    }

    struct Door {
        seen_in_ready: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl StateMachine for Door {
        type State = DoorState;
        type Data = ();
        type Event = String;
        type Reply = ();

        fn init(&mut self) -> (Self::State, Self::Data) {
            (DoorState::Init, ())
        }

        async fn handle_event(
            &mut self,
            state: &Self::State,
            event: Event<Self::Event>,
            data: Self::Data,
            _from: Option<&ReplyToken<Self::Reply>>,
        ) -> Transition<Self::State, Self::Data, Self::Event, Self::Reply> {
            let Event::External(label) = event else {
                return Transition::KeepStateAndData { actions: vec![] };
            };
            match (state, label.as_str()) {
                (DoorState::Init, "work") => Transition::Postpone,
                (DoorState::Init, "init_done") => Transition::Transition {
                    next_state: DoorState::Ready,
                    data,
                    actions: vec![],
                },
                (DoorState::Ready, label) => {
                    self.seen_in_ready.lock().push(label.to_string());
                    Transition::KeepStateAndData { actions: vec![] }
                }
                _ => Transition::KeepStateAndData { actions: vec![] },
            }
        }
    }

    #[tokio::test]
    async fn postponed_event_replays_before_later_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let machine = Door {
            seen_in_ready: seen.clone(),
        };
        let table = ProcessTable::new();
        let bus = LifecycleBus::default();
        let node = NodeId::new("test", "localhost", 4000);

        let door = spawn(machine, node, table, bus);
        door.cast("work".to_string()).await.unwrap();
        door.cast("init_done".to_string()).await.unwrap();
        door.cast("after".to_string()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock(), vec!["work".to_string(), "after".to_string()]);
        assert_eq!(door.get_state().await.unwrap(), DoorState::Ready);
    }

    /// A `Transition` result whose `next_state` is the same as the current
    /// state must not replay postponed events — only a real state change
    /// does.
    struct Latch {
        seen_in_init: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl StateMachine for Latch {
        type State = DoorState;
        type Data = ();
        type Event = String;
        type Reply = ();

        fn init(&mut self) -> (Self::State, Self::Data) {
            (DoorState::Init, ())
        }

        async fn handle_event(
            &mut self,
            state: &Self::State,
            event: Event<Self::Event>,
            data: Self::Data,
            _from: Option<&ReplyToken<Self::Reply>>,
        ) -> Transition<Self::State, Self::Data, Self::Event, Self::Reply> {
            let Event::External(label) = event else {
                return Transition::KeepStateAndData { actions: vec![] };
            };
            match (state, label.as_str()) {
                (DoorState::Init, "work") => Transition::Postpone,
                (DoorState::Init, "noop") => Transition::Transition {
                    next_state: DoorState::Init,
                    data,
                    actions: vec![],
                },
                (DoorState::Init, label) => {
                    self.seen_in_init.lock().push(label.to_string());
                    Transition::KeepStateAndData { actions: vec![] }
                }
                _ => Transition::KeepStateAndData { actions: vec![] },
            }
        }
    }

    #[tokio::test]
    async fn a_same_state_transition_does_not_replay_postponed_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let machine = Latch {
            seen_in_init: seen.clone(),
        };
        let table = ProcessTable::new();
        let bus = LifecycleBus::default();
        let node = NodeId::new("test", "localhost", 4001);

        let latch = spawn(machine, node, table, bus);
        latch.cast("work".to_string()).await.unwrap();
        latch.cast("noop".to_string()).await.unwrap();
        latch.cast("after".to_string()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock(), vec!["after".to_string()]);
        assert_eq!(latch.get_state().await.unwrap(), DoorState::Init);
    }

    /// A simple counter exercising `call`/`cast`/`keep_state`.
    struct Counter;

    #[async_trait]
    impl StateMachine for Counter {
        type State = ();
        type Data = u32;
        type Event = CounterMsg;
        type Reply = u32;

        fn init(&mut self) -> (Self::State, Self::Data) {
            ((), 0)
        }

        async fn handle_event(
            &mut self,
            _state: &Self::State,
            event: Event<Self::Event>,
            data: Self::Data,
            from: Option<&ReplyToken<Self::Reply>>,
        ) -> Transition<Self::State, Self::Data, Self::Event, Self::Reply> {
            match event {
                Event::External(CounterMsg::Inc) => Transition::KeepState {
                    data: data + 1,
                    actions: vec![],
                },
                Event::External(CounterMsg::Get) => {
                    let to = from.expect("get is always a call").clone();
                    Transition::KeepState {
                        data,
                        actions: vec![Action::Reply { to, value: data }],
                    }
                }
                Event::Timeout(_) => Transition::KeepStateAndData { actions: vec![] },
            }
        }
    }

    #[derive(Debug, Clone)]
    enum CounterMsg {
        Inc,
        Get,
    }

    #[tokio::test]
    async fn call_and_cast_mutate_and_read_data() {
        let table = ProcessTable::new();
        let bus = LifecycleBus::default();
        let node = NodeId::new("test", "localhost", 4000);

        let counter = spawn(Counter, node, table, bus);
        counter.cast(CounterMsg::Inc).await.unwrap();
        counter.cast(CounterMsg::Inc).await.unwrap();
        let value = counter
            .call(CounterMsg::Get, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn generic_timeout_fires_and_survives_keep_state() {
        struct Pinger {
            fired: Arc<Mutex<bool>>,
        }

        #[async_trait]
        impl StateMachine for Pinger {
            type State = ();
            type Data = ();
            type Event = ();
            type Reply = ();

            fn init(&mut self) -> (Self::State, Self::Data) {
                ((), ())
            }

            async fn handle_event(
                &mut self,
                _state: &Self::State,
                event: Event<Self::Event>,
                data: Self::Data,
                _from: Option<&ReplyToken<Self::Reply>>,
            ) -> Transition<Self::State, Self::Data, Self::Event, Self::Reply> {
                match event {
                    Event::External(()) => Transition::KeepState {
                        data,
                        actions: vec![Action::GenericTimeout {
                            name: "ping".to_string(),
                            time: Duration::from_millis(20),
                            event: None,
                        }],
                    },
                    Event::Timeout(_) => {
                        *self.fired.lock() = true;
                        Transition::KeepStateAndData { actions: vec![] }
                    }
                }
            }
        }

        let fired = Arc::new(Mutex::new(false));
        let table = ProcessTable::new();
        let bus = LifecycleBus::default();
        let node = NodeId::new("test", "localhost", 4000);

        let pinger = spawn(
            Pinger {
                fired: fired.clone(),
            },
            node,
            table,
            bus,
        );
        pinger.cast(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(*fired.lock());
    }
}
