//! The observer: ties the process table, the lifecycle bus, tracked
//! supervisors, and the alert manager into one read-only introspection
//! surface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use otp_process::{LifecycleBus, LifecycleEvent, ProcessTable};
use otp_supervisor::Supervisor;
use otp_types::{Pid, Reason};
use parking_lot::Mutex;

use crate::alert::{AlertConfig, AlertConfigUpdate, AlertManager, AlertTransition};
use crate::poll::{self, PollHandle};
use crate::snapshot::{self, Snapshot, TrackedSupervisor};

#[derive(Debug, Clone)]
pub enum ObserverEvent {
    ServerStarted(Pid),
    ServerStopped(Pid, Reason),
    SupervisorStarted { id: String, pid: Pid },
    SupervisorStopped { id: String, pid: Pid },
    StatsUpdate(Snapshot),
    AlertTriggered { pid: Pid, threshold: f64, sample: u64 },
    AlertResolved { pid: Pid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(ObserverEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    callback: Callback,
}

struct Inner {
    table: ProcessTable,
    supervisors: Mutex<Vec<TrackedSupervisor>>,
    handlers: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
    total_restarts: AtomicU64,
    alert_manager: AlertManager,
}

/// Cheap to clone; every clone observes the same runtime.
#[derive(Clone)]
pub struct Observer {
    inner: Arc<Inner>,
}

impl Observer {
    /// Starts observing `table`, subscribing to `bus` for
    /// started/stopped/restarted lifecycle events.
    pub fn start(table: ProcessTable, bus: LifecycleBus) -> Self {
        Self::with_alert_config(table, bus, AlertConfig::default())
    }

    pub fn with_alert_config(table: ProcessTable, bus: LifecycleBus, alert_config: AlertConfig) -> Self {
        let inner = Arc::new(Inner {
            table,
            supervisors: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            total_restarts: AtomicU64::new(0),
            alert_manager: AlertManager::new(alert_config),
        });

        Inner::spawn_lifecycle_listener(inner.clone(), bus);

        Self { inner }
    }

    /// Registers `supervisor` under `id` so it appears in
    /// [`Snapshot::supervisors`] and the supervision tree. Emits
    /// `supervisor_started`.
    pub fn track_supervisor(&self, id: impl Into<String>, supervisor: Supervisor) {
        let id = id.into();
        let pid = supervisor.guardian_pid();
        self.inner
            .supervisors
            .lock()
            .push(TrackedSupervisor { id: id.clone(), supervisor });
        self.emit(ObserverEvent::SupervisorStarted { id, pid });
    }

    /// Stops tracking the supervisor registered under `id`, if any. Emits
    /// `supervisor_stopped`. Does not stop the supervisor itself.
    pub fn untrack_supervisor(&self, id: &str) {
        let removed = {
            let mut supervisors = self.inner.supervisors.lock();
            let idx = supervisors.iter().position(|t| t.id == id);
            idx.map(|idx| supervisors.remove(idx))
        };
        if let Some(tracked) = removed {
            self.emit(ObserverEvent::SupervisorStopped {
                id: tracked.id,
                pid: tracked.supervisor.guardian_pid(),
            });
        }
    }

    /// A point-in-time snapshot. Does not feed the alert manager — use
    /// [`Self::start_polling`] for that.
    pub fn get_snapshot(&self) -> Snapshot {
        self.assemble_snapshot()
    }

    /// Registers `handler`, called synchronously for every subsequent
    /// [`ObserverEvent`] until [`Self::unsubscribe`] is called with the
    /// returned id.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(ObserverEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.handlers.lock().push(Subscription {
            id,
            callback: Arc::new(handler),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.handlers.lock().retain(|s| s.id != id);
    }

    /// Starts the polling loop: an initial `stats_update` immediately,
    /// then one every `interval`. Each tick also feeds the alert manager
    /// one queue-size sample per live process.
    pub fn start_polling<F>(&self, interval: Duration, handler: F) -> PollHandle
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        poll::start(self.clone(), interval, handler)
    }

    pub fn alert_config(&self) -> AlertConfig {
        self.inner.alert_manager.config()
    }

    pub fn configure_alerts(&self, update: AlertConfigUpdate) {
        self.inner.alert_manager.configure(update);
    }

    pub fn reset_alerts(&self) {
        self.inner.alert_manager.reset();
    }

    pub(crate) fn tick_and_snapshot(&self) -> Snapshot {
        let now = std::time::Instant::now();
        for handle in self.inner.table.handles() {
            let sample = handle.queue_size() as u64;
            if let Some(transition) = self.inner.alert_manager.record(handle.pid(), sample, now) {
                match transition {
                    AlertTransition::Fired { threshold, sample } => {
                        self.emit(ObserverEvent::AlertTriggered {
                            pid: handle.pid().clone(),
                            threshold,
                            sample,
                        });
                    }
                    AlertTransition::Resolved => {
                        self.emit(ObserverEvent::AlertResolved {
                            pid: handle.pid().clone(),
                        });
                    }
                }
            }
        }

        let snapshot = self.assemble_snapshot();
        self.emit(ObserverEvent::StatsUpdate(snapshot.clone()));
        snapshot
    }

    fn assemble_snapshot(&self) -> Snapshot {
        let supervisors = self.inner.supervisors.lock();
        snapshot::assemble(
            &self.inner.table,
            &supervisors,
            self.inner.total_restarts.load(Ordering::Relaxed),
            now_ms(),
        )
    }

    fn emit(&self, event: ObserverEvent) {
        let handlers: Vec<Callback> = self
            .inner
            .handlers
            .lock()
            .iter()
            .map(|s| s.callback.clone())
            .collect();
        for callback in handlers {
            callback(event.clone());
        }
    }
}

impl Inner {
    fn spawn_lifecycle_listener(inner: Arc<Inner>, bus: LifecycleBus) {
        let observer = Observer { inner };
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(LifecycleEvent::Started(pid)) => {
                        observer.emit(ObserverEvent::ServerStarted(pid));
                    }
                    Ok(LifecycleEvent::Terminated(pid, reason)) => {
                        observer.inner.alert_manager.forget(&pid);
                        observer.emit(ObserverEvent::ServerStopped(pid, reason));
                    }
                    Ok(LifecycleEvent::Crashed(pid, message)) => {
                        observer.emit(ObserverEvent::ServerStopped(pid, Reason::Error(message)));
                    }
                    Ok(LifecycleEvent::Restarted(_pid, _count)) => {
                        observer.inner.total_restarts.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use otp_process::Behavior;
    use otp_supervisor::{ChildKind, ChildSpec, Strategy};
    use otp_types::{NodeId, Restart};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    struct Idle;

    #[async_trait::async_trait]
    impl Behavior for Idle {
        type Message = ();
        type Reply = ();

        async fn handle_call(
            &mut self,
            _msg: (),
            _from: &otp_process::ReplyToken<()>,
        ) -> otp_process::HandlerResult<otp_process::CallOutcome<()>> {
            Ok(otp_process::CallOutcome::Reply(()))
        }

        async fn handle_cast(&mut self, _msg: ()) -> otp_process::HandlerResult<()> {
            Ok(())
        }
    }

    fn node() -> NodeId {
        NodeId::new("test", "localhost", 4000)
    }

    #[tokio::test]
    async fn snapshot_reports_live_processes_and_counts() {
        let table = ProcessTable::new();
        let bus = LifecycleBus::default();
        let observer = Observer::start(table.clone(), bus.clone());

        let server = otp_process::spawn(Idle, node(), table.clone(), bus.clone());
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        server.cast(()).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        let snapshot = observer.get_snapshot();
        assert_eq!(snapshot.process_count, 1);
        assert_eq!(snapshot.servers[0].id, *server.pid());
        assert_eq!(snapshot.servers[0].message_count, 1);
    }

    #[tokio::test]
    async fn tracked_supervisor_appears_in_tree_with_its_children() {
        let table = ProcessTable::new();
        let bus = LifecycleBus::default();
        let observer = Observer::start(table.clone(), bus.clone());

        let table_for_child = table.clone();
        let bus_for_child = bus.clone();
        let node_for_child = node();
        let spec = ChildSpec::new(
            "worker",
            Restart::Permanent,
            StdDuration::from_millis(50),
            ChildKind::Worker,
            move || {
                let table_for_child = table_for_child.clone();
                let bus_for_child = bus_for_child.clone();
                let node_for_child = node_for_child.clone();
                async move {
                    let server = otp_process::spawn(Idle, node_for_child, table_for_child, bus_for_child);
                    Ok(server.pid().clone())
                }
            },
        );

        let sup = Supervisor::start(
            Strategy::OneForOne,
            vec![spec],
            3,
            StdDuration::from_secs(5),
            node(),
            table.clone(),
            bus.clone(),
        )
        .await
        .unwrap();

        observer.track_supervisor("root", sup.clone());

        let snapshot = observer.get_snapshot();
        assert_eq!(snapshot.supervisors.len(), 1);
        assert_eq!(snapshot.supervisors[0].id, "root");
        assert_eq!(snapshot.supervisors[0].children.len(), 1);
        assert_eq!(snapshot.tree.len(), 1);
        assert!(matches!(
            &snapshot.tree[0],
            crate::snapshot::TreeNode::Supervisor { children, .. } if children.len() == 1
        ));
    }

    #[tokio::test]
    async fn subscribers_receive_server_started_and_stopped() {
        let table = ProcessTable::new();
        let bus = LifecycleBus::default();
        let observer = Observer::start(table.clone(), bus.clone());

        let started = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicUsize::new(0));
        let started2 = started.clone();
        let stopped2 = stopped.clone();
        observer.subscribe(move |event| match event {
            ObserverEvent::ServerStarted(_) => {
                started2.fetch_add(1, Ordering::SeqCst);
            }
            ObserverEvent::ServerStopped(..) => {
                stopped2.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        });

        let server = otp_process::spawn(Idle, node(), table.clone(), bus.clone());
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        server.stop(Reason::Normal);
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn polling_emits_an_initial_snapshot_immediately() {
        let table = ProcessTable::new();
        let bus = LifecycleBus::default();
        let observer = Observer::start(table.clone(), bus.clone());

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks2 = ticks.clone();
        let handle = observer.start_polling(StdDuration::from_secs(60), move |_snapshot| {
            ticks2.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        handle.stop();
    }
}
