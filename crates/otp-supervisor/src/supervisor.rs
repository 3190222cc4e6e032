//! Supervisor runtime.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use otp_process::{
    Behavior, CallOutcome, HandlerResult, LifecycleBus, LifecycleEvent, ProcessTable, ReplyToken,
};
use otp_types::{Error, NodeId, Pid, Reason, Result};

use crate::child::{ChildKind, ChildSpec};
use crate::strategy::{ChildSummary, Strategy};

struct ChildState {
    spec: ChildSpec,
    pid: Option<Pid>,
    restart_count: u32,
}

/// A no-op behavior representing the supervisor itself in the process
/// table and lifecycle bus, so a supervisor can be nested as a child of
/// another supervisor (`ChildKind::Supervisor`) and report its own
/// restart-intensity failure the same way a worker reports a crash.
struct Guardian;

#[async_trait]
impl Behavior for Guardian {
    type Message = ();
    type Reply = ();

    async fn handle_call(
        &mut self,
        _msg: (),
        _from: &ReplyToken<()>,
    ) -> HandlerResult<CallOutcome<()>> {
        Ok(CallOutcome::Reply(()))
    }

    async fn handle_cast(&mut self, _msg: ()) -> HandlerResult<()> {
        Ok(())
    }
}

struct Inner {
    strategy: Strategy,
    node: NodeId,
    children: Mutex<Vec<ChildState>>,
    table: ProcessTable,
    bus: LifecycleBus,
    max_restarts: usize,
    restart_within: Duration,
    restart_log: Mutex<VecDeque<Instant>>,
    expected_stops: Mutex<HashSet<Pid>>,
    guardian: otp_process::ServerRef<Guardian>,
}

/// A running supervision tree. Cheap to clone; clones share the same
/// children and restart state.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Starts a supervisor with `children` spawned in declared order. If
    /// any child's start thunk fails, children already started are
    /// terminated in reverse order and the error is returned.
    pub async fn start(
        strategy: Strategy,
        children: Vec<ChildSpec>,
        max_restarts: usize,
        restart_within: Duration,
        node: NodeId,
        table: ProcessTable,
        bus: LifecycleBus,
    ) -> Result<Self> {
        let guardian = otp_process::spawn(Guardian, node.clone(), table.clone(), bus.clone());

        let mut started = Vec::with_capacity(children.len());
        for spec in children {
            match (spec.start)().await {
                Ok(pid) => started.push(ChildState {
                    spec,
                    pid: Some(pid),
                    restart_count: 0,
                }),
                Err(err) => {
                    for child in started.iter().rev() {
                        if let Some(pid) = &child.pid {
                            if let Some(handle) = table.get(pid) {
                                handle.stop(Reason::Shutdown);
                            }
                        }
                    }
                    guardian.stop(Reason::Shutdown);
                    return Err(err);
                }
            }
        }

        let inner = Arc::new(Inner {
            strategy,
            node,
            children: Mutex::new(started),
            table,
            bus: bus.clone(),
            max_restarts,
            restart_within,
            restart_log: Mutex::new(VecDeque::new()),
            expected_stops: Mutex::new(HashSet::new()),
            guardian,
        });

        Inner::spawn_monitor(inner.clone());

        Ok(Self { inner })
    }

    /// The [`Pid`] this supervisor is reachable under when nested as a
    /// child of another supervisor.
    pub fn guardian_pid(&self) -> Pid {
        self.inner.guardian.pid().clone()
    }

    /// The restart strategy this supervisor was started with, for
    /// introspection (e.g. the observer's supervision-tree snapshot).
    pub fn strategy(&self) -> Strategy {
        self.inner.strategy
    }

    /// Adds and starts a new child at runtime. Appended after the
    /// currently declared children, in startup order for future
    /// group restarts.
    pub async fn start_child(&self, spec: ChildSpec) -> Result<Pid> {
        let pid = (spec.start)().await?;
        self.inner.children.lock().push(ChildState {
            spec,
            pid: Some(pid.clone()),
            restart_count: 0,
        });
        Ok(pid)
    }

    /// Stops and removes the child identified by `id`.
    pub fn terminate_child(&self, id: &str) -> Result<()> {
        let mut children = self.inner.children.lock();
        let idx = children
            .iter()
            .position(|c| c.spec.id == id)
            .ok_or_else(|| Error::NotRegistered(id.to_string()))?;
        if let Some(pid) = children[idx].pid.take() {
            self.inner.expected_stops.lock().insert(pid.clone());
            if let Some(handle) = self.inner.table.get(&pid) {
                handle.stop(Reason::Shutdown);
            }
        }
        children.remove(idx);
        Ok(())
    }

    pub fn which_children(&self) -> Vec<ChildSummary> {
        self.inner
            .children
            .lock()
            .iter()
            .map(|c| ChildSummary {
                id: c.spec.id.clone(),
                pid: c.pid.clone(),
                kind: c.spec.kind,
            })
            .collect()
    }

    /// Stops every child in reverse declared order, then the supervisor's
    /// own guardian process.
    pub fn stop(&self, reason: Reason) {
        let children = self.inner.children.lock();
        for child in children.iter().rev() {
            if let Some(pid) = &child.pid {
                self.inner.expected_stops.lock().insert(pid.clone());
                if let Some(handle) = self.inner.table.get(pid) {
                    handle.stop(reason.clone());
                }
            }
        }
        drop(children);
        self.inner.guardian.stop(reason);
    }
}

impl Inner {
    fn spawn_monitor(inner: Arc<Inner>) {
        let mut rx = inner.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(LifecycleEvent::Crashed(pid, message)) => {
                        inner.on_child_down(pid, Reason::Error(message)).await;
                    }
                    Ok(LifecycleEvent::Terminated(pid, reason)) => {
                        inner.on_child_down(pid, reason).await;
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn on_child_down(self: &Arc<Self>, pid: Pid, reason: Reason) {
        if self.expected_stops.lock().remove(&pid) {
            return;
        }

        let idx = {
            let children = self.children.lock();
            children.iter().position(|c| c.pid.as_ref() == Some(&pid))
        };
        let Some(idx) = idx else {
            return;
        };

        let should_restart = {
            let children = self.children.lock();
            children[idx].spec.restart.should_restart(&reason)
        };

        if !should_restart {
            let mut children = self.children.lock();
            let remove = children[idx].spec.restart == otp_types::Restart::Temporary;
            if remove {
                children.remove(idx);
            } else {
                children[idx].pid = None;
            }
            return;
        }

        if self.record_restart_and_check_intensity() {
            tracing::error!(
                restarts = self.max_restarts,
                window_ms = self.restart_within.as_millis() as u64,
                "supervisor exceeded restart intensity"
            );
            self.stop_all_children().await;
            self.guardian.stop(Reason::Error(format!(
                "max_restarts_exceeded: {} restarts within {}ms",
                self.max_restarts,
                self.restart_within.as_millis()
            )));
            return;
        }

        match self.strategy {
            Strategy::OneForOne | Strategy::SimpleOneForOne => {
                self.restart_one(idx).await;
            }
            Strategy::OneForAll => {
                self.restart_range(0, self.children.lock().len()).await;
            }
            Strategy::RestForOne => {
                let len = self.children.lock().len();
                self.restart_range(idx, len).await;
            }
        }
    }

    fn record_restart_and_check_intensity(&self) -> bool {
        let now = Instant::now();
        let mut log = self.restart_log.lock();
        log.push_back(now);
        while let Some(front) = log.front() {
            if now.duration_since(*front) > self.restart_within {
                log.pop_front();
            } else {
                break;
            }
        }
        log.len() > self.max_restarts
    }

    async fn restart_one(self: &Arc<Self>, idx: usize) {
        let start = {
            let children = self.children.lock();
            children[idx].spec.start.clone()
        };
        match start().await {
            Ok(pid) => {
                let count = {
                    let mut children = self.children.lock();
                    children[idx].pid = Some(pid.clone());
                    children[idx].restart_count += 1;
                    children[idx].restart_count
                };
                self.bus.emit(LifecycleEvent::Restarted(pid, count));
            }
            Err(err) => {
                tracing::error!(child = %self.children.lock()[idx].spec.id, error = %err, "child restart failed");
            }
        }
    }

    /// Terminates children in `[start, end)` in reverse order, waits for
    /// each to clear the process table (or forcibly removes it past its
    /// shutdown timeout), then restarts the range in declared order.
    async fn restart_range(self: &Arc<Self>, start: usize, end: usize) {
        let targets: Vec<(usize, Option<Pid>, Duration)> = {
            let children = self.children.lock();
            (start..end)
                .map(|i| (i, children[i].pid.clone(), children[i].spec.shutdown_timeout))
                .collect()
        };

        for (_, pid, timeout) in targets.iter().rev() {
            if let Some(pid) = pid {
                self.expected_stops.lock().insert(pid.clone());
                if let Some(handle) = self.table.get(pid) {
                    handle.stop(Reason::Shutdown);
                }
                self.wait_for_stop(pid, *timeout).await;
            }
        }

        for (i, _, _) in targets {
            let start_fn = self.children.lock()[i].spec.start.clone();
            match start_fn().await {
                Ok(pid) => {
                    let count = {
                        let mut children = self.children.lock();
                        children[i].pid = Some(pid.clone());
                        children[i].restart_count += 1;
                        children[i].restart_count
                    };
                    self.bus.emit(LifecycleEvent::Restarted(pid, count));
                }
                Err(err) => {
                    tracing::error!(index = i, error = %err, "child restart failed during group restart");
                    self.children.lock()[i].pid = None;
                }
            }
        }
    }

    async fn stop_all_children(&self) {
        let children = self.children.lock();
        let pids: Vec<Pid> = children.iter().rev().filter_map(|c| c.pid.clone()).collect();
        drop(children);
        for pid in pids {
            self.expected_stops.lock().insert(pid.clone());
            if let Some(handle) = self.table.get(&pid) {
                handle.stop(Reason::Shutdown);
            }
        }
    }

    /// Polls the shared process table until `pid` is gone or `timeout`
    /// elapses. On timeout the process is forcibly dropped from the table
    /// and a crash-style lifecycle event is emitted in its place.
    async fn wait_for_stop(&self, pid: &Pid, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.table.contains(pid) {
            if Instant::now() >= deadline {
                self.table.force_remove(pid);
                self.expected_stops.lock().remove(pid);
                self.bus
                    .emit(LifecycleEvent::Crashed(pid.clone(), "kill".to_string()));
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use otp_types::Restart;

    struct Flaky;

    #[async_trait]
    impl Behavior for Flaky {
        type Message = ();
        type Reply = ();

        async fn handle_call(
            &mut self,
            _msg: (),
            _from: &ReplyToken<()>,
        ) -> HandlerResult<CallOutcome<()>> {
            Ok(CallOutcome::Reply(()))
        }

        async fn handle_cast(&mut self, _msg: ()) -> HandlerResult<()> {
            Ok(())
        }
    }

    fn node() -> NodeId {
        NodeId::new("test", "localhost", 4000)
    }

    #[tokio::test]
    async fn one_for_one_restarts_only_the_failed_child() {
        let table = ProcessTable::new();
        let bus = LifecycleBus::default();
        let starts = Arc::new(AtomicUsize::new(0));

        let starts1 = starts.clone();
        let table1 = table.clone();
        let bus1 = bus.clone();
        let node1 = node();
        let spec = ChildSpec::new(
            "flaky",
            Restart::Permanent,
            Duration::from_millis(50),
            ChildKind::Worker,
            move || {
                let starts1 = starts1.clone();
                let table1 = table1.clone();
                let bus1 = bus1.clone();
                let node1 = node1.clone();
                async move {
                    starts1.fetch_add(1, Ordering::SeqCst);
                    let server = otp_process::spawn(Flaky, node1, table1, bus1);
                    Ok(server.pid().clone())
                }
            },
        );

        let sup = Supervisor::start(
            Strategy::OneForOne,
            vec![spec],
            3,
            Duration::from_secs(5),
            node(),
            table.clone(),
            bus.clone(),
        )
        .await
        .unwrap();

        let pid_before = sup.which_children()[0].pid.clone().unwrap();
        let handle = table.get(&pid_before).unwrap();
        // Drive the crash: cast through the table isn't typed here, so
        // stop it directly to simulate an external failure trigger and
        // rely on the monitor's restart path.
        handle.stop(Reason::Error("external kill".to_string()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }
}
