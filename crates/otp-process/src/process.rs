//! Spawns a [`Behavior`] onto the runtime and returns a typed [`ServerRef`]
//! for talking to it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use otp_types::{Error, NodeId, Pid, Reason, Result};

use crate::behavior::{Behavior, CallOutcome};
use crate::envelope::Envelope;
use crate::lifecycle::{LifecycleBus, LifecycleEvent};
use crate::reply::ReplyToken;
use crate::table::{Control, ProcessHandle, ProcessTable, Status};

/// Default mailbox depth before `cast`/`call` senders start waiting for
/// room. Unbounded mailboxes are not offered: an unbounded producer facing
/// a slow consumer would grow memory without bound instead of applying
/// back-pressure.
const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

/// A typed handle to a running process. Cheap to clone; every clone talks
/// to the same mailbox.
pub struct ServerRef<B: Behavior> {
    pid: Pid,
    mailbox_tx: mpsc::Sender<Envelope<B>>,
    handle: ProcessHandle,
}

impl<B: Behavior> Clone for ServerRef<B> {
    fn clone(&self) -> Self {
        Self {
            pid: self.pid.clone(),
            mailbox_tx: self.mailbox_tx.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<B: Behavior> ServerRef<B> {
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    pub fn status(&self) -> Status {
        self.handle.status()
    }

    /// Sends a one-way message. Waits for mailbox room but never for a
    /// reply.
    pub async fn cast(&self, message: B::Message) -> Result<()> {
        self.mailbox_tx
            .send(Envelope::Cast { message })
            .await
            .map_err(|_| Error::RemoteProcessGone(self.pid.clone()))
    }

    /// Sends a synchronous request and waits up to `timeout` for the
    /// reply. If the handler crashes or stops without replying, this still
    /// waits out the full budget before reporting [`Error::NoReply`] —
    /// matching the Erlang semantics that a slow/crashing handler and a
    /// merely-slow one are indistinguishable to the caller until the
    /// timeout expires.
    pub async fn call(&self, message: B::Message, timeout: Duration) -> Result<B::Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.mailbox_tx
            .send(Envelope::Call { message, reply_tx })
            .await
            .map_err(|_| Error::RemoteProcessGone(self.pid.clone()))?;

        let deadline = tokio::time::Instant::now() + timeout;
        match tokio::time::timeout_at(deadline, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_closed_early)) => {
                // The handler dropped the reply sender (crash, stop-without-
                // reply) before the caller's timeout elapsed. Wait out the
                // remainder so a fast crash and a slow timeout look the same.
                tokio::time::sleep_until(deadline).await;
                Err(Error::NoReply(self.pid.clone()))
            }
            Err(_elapsed) => Err(Error::CallTimeout(self.pid.clone())),
        }
    }

    /// Requests termination with `reason`. Does not wait for the process to
    /// actually stop.
    pub fn stop(&self, reason: Reason) {
        self.handle.stop(reason);
    }
}

/// Spawns `behavior` as a new process under `node`, registering it in
/// `table` and announcing lifecycle events on `bus`.
pub fn spawn<B: Behavior>(
    mut behavior: B,
    node: NodeId,
    table: ProcessTable,
    bus: LifecycleBus,
) -> ServerRef<B> {
    let pid = Pid::generate(node);
    let (mailbox_tx, mailbox_rx) = mpsc::channel(DEFAULT_MAILBOX_CAPACITY);
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let status = Arc::new(Mutex::new(Status::Initializing));
    let message_count = Arc::new(AtomicU64::new(0));

    let probe_tx = mailbox_tx.clone();
    let queue_probe: crate::table::QueueProbe =
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
            &mut behavior,
            mailbox_rx,
            control_rx,
            status,
            bus,
            run_table,
            message_count,
        )
        .await;
    });

    ServerRef {
        pid,
        mailbox_tx,
        handle,
    }
}

async fn run_loop<B: Behavior>(
    pid: Pid,
    behavior: &mut B,
    mut mailbox_rx: mpsc::Receiver<Envelope<B>>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    status: Arc<Mutex<Status>>,
    bus: LifecycleBus,
    table: ProcessTable,
    message_count: Arc<AtomicU64>,
) {
    let init_result = behavior.init().await;
    let mut stop_reason = match init_result {
        Ok(()) => None,
        Err(message) => Some(Reason::Error(message)),
    };

    if stop_reason.is_none() {
        *status.lock() = Status::Running;
        bus.emit(LifecycleEvent::Started(pid.clone()));
    }

    while stop_reason.is_none() {
        tokio::select! {
            biased;

            control = control_rx.recv() => {
                match control {
                    Some(Control::Stop(reason)) => stop_reason = Some(reason),
                    None => stop_reason = Some(Reason::Shutdown),
                }
            }

            envelope = mailbox_rx.recv() => {
                if envelope.is_some() {
                    message_count.fetch_add(1, Ordering::Relaxed);
                }
                match envelope {
                    Some(Envelope::Call { message, reply_tx }) => {
                        let token = ReplyToken::new(reply_tx);
                        match behavior.handle_call(message, &token).await {
                            Ok(CallOutcome::Reply(reply)) => {
                                let _ = token.reply(reply);
                            }
                            Ok(CallOutcome::Defer) => {}
                            Ok(CallOutcome::Stop { reason, reply }) => {
                                if let Some(reply) = reply {
                                    let _ = token.reply(reply);
                                }
                                stop_reason = Some(reason);
                            }
                            Err(message) => {
                                bus.emit(LifecycleEvent::Crashed(pid.clone(), message.clone()));
                                stop_reason = Some(Reason::Error(message));
                            }
                        }
                    }
                    Some(Envelope::Cast { message }) => {
                        if let Err(message) = behavior.handle_cast(message).await {
                            bus.emit(LifecycleEvent::Crashed(pid.clone(), message.clone()));
                            stop_reason = Some(Reason::Error(message));
                        }
                    }
                    None => stop_reason = Some(Reason::Shutdown),
                }
            }
        }
    }

    let reason = stop_reason.unwrap_or(Reason::Normal);
    *status.lock() = Status::Stopping;
    behavior.terminate(&reason).await;
    *status.lock() = Status::Stopped;
    table.remove(&pid);
    bus.emit(LifecycleEvent::Terminated(pid, reason));
}
