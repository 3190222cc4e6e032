//! A minimal in-process runtime for tests: one node identity, one shared
//! process table, one lifecycle bus, built with sane defaults so a test
//! doesn't have to assemble `NodeId`/`ProcessTable`/`LifecycleBus` by hand
//! every time it spawns a behavior or starts a supervisor.

use std::time::Duration;

use otp_process::{Behavior, LifecycleBus, ProcessTable, ServerRef};
use otp_supervisor::{ChildSpec, Strategy, Supervisor};
use otp_types::{NodeId, Result};

/// Builder for an in-process test runtime. Cheap to clone; every clone
/// shares the same table and bus.
#[derive(Clone)]
pub struct TestRuntime {
    node: NodeId,
    table: ProcessTable,
    bus: LifecycleBus,
}

impl Default for TestRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRuntime {
    /// A runtime on node `test@localhost:0` with a fresh table and bus.
    pub fn new() -> Self {
        Self {
            node: NodeId::new("test", "localhost", 0),
            table: ProcessTable::new(),
            bus: LifecycleBus::default(),
        }
    }

    /// Overrides the node identity this runtime spawns processes under.
    #[must_use]
    pub fn with_node(mut self, name: &str, host: &str, port: u16) -> Self {
        self.node = NodeId::new(name, host, port);
        self
    }

    pub fn node(&self) -> NodeId {
        self.node.clone()
    }

    pub fn table(&self) -> ProcessTable {
        self.table.clone()
    }

    pub fn bus(&self) -> LifecycleBus {
        self.bus.clone()
    }

    /// Spawns `behavior` on this runtime's node, table, and bus.
    pub fn spawn<B: Behavior>(&self, behavior: B) -> ServerRef<B> {
        otp_process::spawn(behavior, self.node.clone(), self.table.clone(), self.bus.clone())
    }

    /// Starts a supervisor on this runtime's node, table, and bus, with a
    /// restart intensity of `max_restarts` within `restart_within` —
    /// generous defaults are available via
    /// [`Self::start_supervisor_default`] for tests that don't care.
    pub async fn start_supervisor(
        &self,
        strategy: Strategy,
        children: Vec<ChildSpec>,
        max_restarts: usize,
        restart_within: Duration,
    ) -> Result<Supervisor> {
        Supervisor::start(
            strategy,
            children,
            max_restarts,
            restart_within,
            self.node.clone(),
            self.table.clone(),
            self.bus.clone(),
        )
        .await
    }

    /// `start_supervisor` with a restart budget generous enough that it
    /// never trips during a short-lived test (5 restarts within a minute).
    pub async fn start_supervisor_default(
        &self,
        strategy: Strategy,
        children: Vec<ChildSpec>,
    ) -> Result<Supervisor> {
        self.start_supervisor(strategy, children, 5, Duration::from_secs(60)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use otp_process::{CallOutcome, HandlerResult, ReplyToken};

    struct Echo;

    #[async_trait]
    impl Behavior for Echo {
        type Message = u32;
        type Reply = u32;

        async fn handle_call(
            &mut self,
            msg: u32,
            _from: &ReplyToken<u32>,
        ) -> HandlerResult<CallOutcome<u32>> {
            Ok(CallOutcome::Reply(msg))
        }

        async fn handle_cast(&mut self, _msg: u32) -> HandlerResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn spawn_registers_in_the_shared_table() {
        let runtime = TestRuntime::new();
        let server = runtime.spawn(Echo);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(runtime.table().contains(server.pid()));

        let reply = server.call(7, Duration::from_millis(100)).await.unwrap();
        assert_eq!(reply, 7);
    }
}
