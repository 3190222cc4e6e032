//! Transparent `call`/`cast` routing and remote spawn.
//!
//! One background task owns an in-flight correlation table and
//! dispatches inbound frames, generalized from HTTP-ish request/response
//! dispatch to the `call_request`/`call_reply`/`cast`/`spawn_request`/
//! `spawn_reply` kinds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;

use otp_cluster::{Cluster, ClusterError};
use otp_global_registry::GlobalRegistry;
use otp_process::{LifecycleBus, ProcessTable};
use otp_registry::Registry;
use otp_types::{Error, NodeId, Pid, Result};
use otp_wire::{Frame, Message, Registration, WireRef};

use crate::registry::{BehaviorRegistry, RemoteProcess};

type CallReplyTx = oneshot::Sender<std::result::Result<Vec<u8>, String>>;
type SpawnReplyTx = oneshot::Sender<std::result::Result<WireRef, String>>;

/// The remote-invocation layer for one local node: owns the behavior
/// registry, the in-flight correlation tables, and the dispatcher that
/// turns inbound [`Frame`]s from [`Cluster`] into local action.
pub struct Rpc {
    local_node: NodeId,
    cluster: Arc<Cluster>,
    registry: BehaviorRegistry,
    table: ProcessTable,
    lifecycle: LifecycleBus,
    local_registry: Registry<Pid>,
    global_registry: GlobalRegistry,
    in_flight_calls: Arc<Mutex<HashMap<String, CallReplyTx>>>,
    in_flight_spawns: Arc<Mutex<HashMap<String, SpawnReplyTx>>>,
    local_targets: Arc<Mutex<HashMap<Pid, RemoteProcess>>>,
}

impl Rpc {
    /// Starts the dispatcher task and returns a handle. `table`/`lifecycle`
    /// are the same process table and lifecycle bus the embedding host
    /// uses for its own local `otp_process::spawn` calls, so remotely
    /// spawned processes show up in the same bookkeeping as local ones.
    /// `local_registry`/`global_registry` are the handles a `spawn_request`
    /// with `registration: Local`/`Global` registers the spawned process
    /// into, on whichever node actually runs it.
    pub fn start(
        cluster: Arc<Cluster>,
        registry: BehaviorRegistry,
        table: ProcessTable,
        lifecycle: LifecycleBus,
        local_registry: Registry<Pid>,
        global_registry: GlobalRegistry,
    ) -> Self {
        let local_node = cluster.local_node().clone();
        let rpc = Self {
            local_node,
            cluster: cluster.clone(),
            registry,
            table,
            lifecycle,
            local_registry,
            global_registry,
            in_flight_calls: Arc::new(Mutex::new(HashMap::new())),
            in_flight_spawns: Arc::new(Mutex::new(HashMap::new())),
            local_targets: Arc::new(Mutex::new(HashMap::new())),
        };

        rpc.spawn_dispatcher();
        rpc
    }

    fn spawn_dispatcher(&self) {
        let mut frames = self.cluster.subscribe_frames();
        let cluster = self.cluster.clone();
        let registry = self.registry.clone();
        let table = self.table.clone();
        let lifecycle = self.lifecycle.clone();
        let local_node = self.local_node.clone();
        let local_registry = self.local_registry.clone();
        let global_registry = self.global_registry.clone();
        let in_flight_calls = self.in_flight_calls.clone();
        let in_flight_spawns = self.in_flight_spawns.clone();
        let local_targets = self.local_targets.clone();

        tokio::spawn(async move {
            loop {
                let (from, frame) = match frames.recv().await {
                    Ok(pair) => pair,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };

                dispatch(
                    &cluster,
                    &registry,
                    &table,
                    &lifecycle,
                    &local_node,
                    &local_registry,
                    &global_registry,
                    &in_flight_calls,
                    &in_flight_spawns,
                    &local_targets,
                    from,
                    frame,
                )
                .await;
            }
        });
    }

    /// Exposes an already-running local process to remote callers under
    /// its own pid, bypassing `BehaviorRegistry` (for processes the host
    /// spawned directly rather than via a remote `spawn_request`).
    pub fn expose(&self, process: RemoteProcess) {
        self.local_targets.lock().insert(process.pid.clone(), process);
    }

    /// Registers a behavior by name so remote `spawn_request`s can start
    /// it on this node. Delegates to [`BehaviorRegistry::register`].
    pub fn registry(&self) -> &BehaviorRegistry {
        &self.registry
    }

    /// Transparent call: dispatches locally if `target` is on this node,
    /// otherwise serializes and round-trips over the cluster transport.
    pub async fn call<M, R>(&self, target: &Pid, msg: &M, timeout: Duration) -> Result<R>
    where
        M: Serialize,
        R: DeserializeOwned,
    {
        let payload = postcard::to_allocvec(msg).map_err(|e| Error::NotSerializable(e.to_string()))?;
        let reply_bytes = self.call_bytes(target, payload, timeout).await?;
        postcard::from_bytes(&reply_bytes).map_err(|e| Error::BadFrame(e.to_string()))
    }

    /// Transparent cast: see [`Rpc::call`].
    pub async fn cast<M: Serialize>(&self, target: &Pid, msg: &M) -> Result<()> {
        let payload = postcard::to_allocvec(msg).map_err(|e| Error::NotSerializable(e.to_string()))?;
        self.cast_bytes(target, payload).await
    }

    pub async fn call_bytes(&self, target: &Pid, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>> {
        if target.is_local(&self.local_node) {
            let process = self
                .local_targets
                .lock()
                .get(target)
                .cloned()
                .ok_or_else(|| Error::RemoteProcessGone(target.clone()))?;
            return process
                .call_bytes(payload, timeout)
                .await
                .map_err(|_| Error::RemoteProcessGone(target.clone()));
        }

        let corr_id = nanoid::nanoid!(16);
        let (tx, rx) = oneshot::channel();
        self.in_flight_calls.lock().insert(corr_id.clone(), tx);

        let frame = Frame::with_corr_id(
            Message::CallRequest {
                target: to_wire_ref(target),
                payload,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            corr_id.clone(),
        );
        self.send_to(target.node_id(), frame)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(bytes))) => Ok(bytes),
            Ok(Ok(Err(_))) => Err(Error::RemoteProcessGone(target.clone())),
            Ok(Err(_)) => Err(Error::RemoteCallTimeout(target.clone())),
            Err(_elapsed) => {
                self.in_flight_calls.lock().remove(&corr_id);
                Err(Error::RemoteCallTimeout(target.clone()))
            }
        }
    }

    pub async fn cast_bytes(&self, target: &Pid, payload: Vec<u8>) -> Result<()> {
        if target.is_local(&self.local_node) {
            let process = self
                .local_targets
                .lock()
                .get(target)
                .cloned()
                .ok_or_else(|| Error::RemoteProcessGone(target.clone()))?;
            return process
                .cast_bytes(payload)
                .await
                .map_err(|_| Error::RemoteProcessGone(target.clone()));
        }

        self.send_to(
            target.node_id(),
            Frame::new(Message::Cast {
                target: to_wire_ref(target),
                payload,
            }),
        )
    }

    /// Asks `node` to spawn `behavior_name` (which must be registered
    /// there) and returns the resulting [`Pid`].
    pub async fn spawn_remote(
        &self,
        node: &NodeId,
        behavior_name: &str,
        init_args: Option<Vec<u8>>,
        registration: Registration,
        register_as: Option<String>,
        init_timeout: Duration,
    ) -> Result<Pid> {
        if *node == self.local_node {
            let result = self
                .registry
                .spawn(
                    behavior_name,
                    init_args,
                    self.local_node.clone(),
                    self.table.clone(),
                    self.lifecycle.clone(),
                )
                .await
                .ok_or_else(|| Error::UnknownBehavior(behavior_name.to_string()))?
                .map_err(|message| Error::Handler {
                    pid: Pid::generate(self.local_node.clone()),
                    message,
                })?;
            let pid = result.pid.clone();
            self.local_targets.lock().insert(pid.clone(), result);
            apply_registration(
                &self.local_registry,
                &self.global_registry,
                registration,
                register_as.as_deref(),
                &pid,
            );
            return Ok(pid);
        }

        let corr_id = nanoid::nanoid!(16);
        let (tx, rx) = oneshot::channel();
        self.in_flight_spawns.lock().insert(corr_id.clone(), tx);

        let frame = Frame::with_corr_id(
            Message::SpawnRequest {
                behavior_name: behavior_name.to_string(),
                init_args,
                registration,
                register_as,
                init_timeout_ms: u64::try_from(init_timeout.as_millis()).unwrap_or(u64::MAX),
            },
            corr_id.clone(),
        );
        self.send_to(node, frame)?;

        match tokio::time::timeout(init_timeout, rx).await {
            Ok(Ok(Ok(wire_ref))) => Ok(from_wire_ref(&wire_ref)),
            Ok(Ok(Err(message))) => Err(Error::Handler {
                pid: Pid::generate(node.clone()),
                message,
            }),
            Ok(Err(_)) => Err(Error::NodeUnreachable(node.clone())),
            Err(_elapsed) => {
                self.in_flight_spawns.lock().remove(&corr_id);
                Err(Error::NodeUnreachable(node.clone()))
            }
        }
    }

    fn send_to(&self, node: &NodeId, frame: Frame) -> Result<()> {
        self.cluster.send_frame(node, frame).map_err(|e| match e {
            ClusterError::UnknownPeer(n) => Error::NodeUnreachable(n),
            other => Error::BadFrame(other.to_string()),
        })
    }
}

fn to_wire_ref(pid: &Pid) -> WireRef {
    WireRef {
        id: pid.id().to_string(),
        node_id: pid.node_id().as_str().to_string(),
    }
}

fn from_wire_ref(wire_ref: &WireRef) -> Pid {
    Pid::new(
        wire_ref.id.clone(),
        NodeId::from_canonical(wire_ref.node_id.clone()),
    )
}

/// Applies a `spawn_request`'s `registration`/`register_as` to whichever
/// node actually ran `pid` — called on the receiver, since only the
/// receiver's registries can hold an entry naming a `Pid` it owns.
/// `None` is a no-op; a missing `register_as` name is treated the same
/// way (nothing to register under). Registration failures (e.g. the name
/// is already taken in `Local`'s unique-keyed table) are logged rather
/// than failing the spawn — the process is alive either way.
fn apply_registration(
    local_registry: &Registry<Pid>,
    global_registry: &GlobalRegistry,
    registration: Registration,
    register_as: Option<&str>,
    pid: &Pid,
) {
    let Some(name) = register_as else { return };
    match registration {
        Registration::None => {}
        Registration::Local => {
            if let Err(err) = local_registry.register(name, pid.clone(), pid.clone(), None) {
                tracing::warn!(name, %err, "local registration for remotely spawned process failed");
            }
        }
        Registration::Global => {
            if let Err(err) = global_registry.register(name, pid.clone(), 0) {
                tracing::warn!(name, %err, "global registration for remotely spawned process failed");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch(
    cluster: &Arc<Cluster>,
    registry: &BehaviorRegistry,
    table: &ProcessTable,
    lifecycle: &LifecycleBus,
    local_node: &NodeId,
    local_registry: &Registry<Pid>,
    global_registry: &GlobalRegistry,
    in_flight_calls: &Arc<Mutex<HashMap<String, CallReplyTx>>>,
    in_flight_spawns: &Arc<Mutex<HashMap<String, SpawnReplyTx>>>,
    local_targets: &Arc<Mutex<HashMap<Pid, RemoteProcess>>>,
    from: NodeId,
    frame: Frame,
) {
    let corr_id = frame.corr_id.clone();
    match frame.message {
        Message::CallRequest { target, payload, timeout_ms } => {
            let pid = from_wire_ref(&target);
            let process = local_targets.lock().get(&pid).cloned();
            let corr_id = corr_id.unwrap_or_default();
            let cluster = cluster.clone();
            tokio::spawn(async move {
                let result = match process {
                    Some(process) => process
                        .call_bytes(payload, Duration::from_millis(timeout_ms))
                        .await,
                    None => Err("no such local process".to_string()),
                };
                let _ = cluster.send_frame(
                    &from,
                    Frame::with_corr_id(Message::CallReply { result }, corr_id),
                );
            });
        }
        Message::CallReply { result } => {
            if let Some(corr_id) = corr_id {
                if let Some(tx) = in_flight_calls.lock().remove(&corr_id) {
                    let _ = tx.send(result);
                }
            }
        }
        Message::Cast { target, payload } => {
            let pid = from_wire_ref(&target);
            if let Some(process) = local_targets.lock().get(&pid).cloned() {
                tokio::spawn(async move {
                    let _ = process.cast_bytes(payload).await;
                });
            }
        }
        Message::SpawnRequest {
            behavior_name,
            init_args,
            registration,
            register_as,
            init_timeout_ms: _,
        } => {
            let corr_id = corr_id.unwrap_or_default();
            let result = registry
                .spawn(
                    &behavior_name,
                    init_args,
                    local_node.clone(),
                    table.clone(),
                    lifecycle.clone(),
                )
                .await;
            let reply = match result {
                Some(Ok(process)) => {
                    let wire_ref = to_wire_ref(&process.pid);
                    apply_registration(
                        local_registry,
                        global_registry,
                        registration,
                        register_as.as_deref(),
                        &process.pid,
                    );
                    local_targets.lock().insert(process.pid.clone(), process);
                    Ok(wire_ref)
                }
                Some(Err(message)) => Err(message),
                None => Err(format!("unknown behavior {behavior_name:?}")),
            };
            let _ = cluster.send_frame(&from, Frame::with_corr_id(Message::SpawnReply { result: reply }, corr_id));
        }
        Message::SpawnReply { result } => {
            if let Some(corr_id) = corr_id {
                if let Some(tx) = in_flight_spawns.lock().remove(&corr_id) {
                    let _ = tx.send(result);
                }
            }
        }
        Message::Hello { .. }
        | Message::HelloAck { .. }
        | Message::Heartbeat
        | Message::NodeGossip { .. }
        | Message::RegistrySync { .. }
        | Message::RegistryEvent { .. }
        | Message::Bye => {
            // Handled elsewhere (handshake/heartbeat in `otp-cluster`,
            // registry frames in `otp-global-registry`).
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use otp_cluster::{ClusterEvent, StartOptions};
    use otp_global_registry::GlobalRegistry;
    use otp_process::{CallOutcome, HandlerResult, ReplyToken};
    use otp_registry::{Keys, Registry};
    use otp_wire::Registration;
    use serde::Deserialize;
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Debug, Serialize, Deserialize)]
    enum EchoMsg {
        Echo(String),
    }

    struct Echo;

    #[async_trait]
    impl otp_process::Behavior for Echo {
        type Message = EchoMsg;
        type Reply = String;

        async fn handle_call(
            &mut self,
            msg: Self::Message,
            _from: &ReplyToken<Self::Reply>,
        ) -> HandlerResult<CallOutcome<Self::Reply>> {
            let EchoMsg::Echo(s) = msg;
            Ok(CallOutcome::Reply(s))
        }

        async fn handle_cast(&mut self, _msg: Self::Message) -> HandlerResult<()> {
            Ok(())
        }
    }

    async fn start_cluster(node_name: &str, seeds: Vec<String>) -> Arc<Cluster> {
        Arc::new(
            Cluster::start(StartOptions {
                node_name: node_name.to_string(),
                host: "127.0.0.1".to_string(),
                port: 0,
                seeds,
                heartbeat_interval_ms: 50,
                heartbeat_miss_threshold: 5,
                reconnect_backoff_ceiling_ms: 200,
                shared_secret: b"rpc-test-secret".to_vec(),
            })
            .await
            .unwrap(),
        )
    }

    async fn wait_for_up(cluster: &Cluster) {
        let mut events = cluster.subscribe_events();
        timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(ClusterEvent::NodeUp(_)) = events.recv().await {
                    return;
                }
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn remote_spawn_and_call_round_trip() {
        let cluster_a = start_cluster("a", Vec::new()).await;
        let a_port = cluster_a
            .local_node()
            .as_str()
            .rsplit(':')
            .next()
            .unwrap()
            .to_string();
        let cluster_b =
            start_cluster("b", vec![format!("127.0.0.1:{a_port}")]).await;

        wait_for_up(&cluster_a).await;
        wait_for_up(&cluster_b).await;

        let registry_a = BehaviorRegistry::new();
        let registry_b = BehaviorRegistry::new();
        registry_b.register("echo", |_init_args| Ok(Echo));

        let rpc_a = Rpc::start(
            cluster_a.clone(),
            registry_a,
            ProcessTable::default(),
            LifecycleBus::default(),
            Registry::new(Keys::Unique),
            GlobalRegistry::start(cluster_a.clone()),
        );
        let local_registry_b = Registry::new(Keys::Unique);
        let global_registry_b = GlobalRegistry::start(cluster_b.clone());
        let _rpc_b = Rpc::start(
            cluster_b.clone(),
            registry_b,
            ProcessTable::default(),
            LifecycleBus::default(),
            local_registry_b.clone(),
            global_registry_b.clone(),
        );

        let b_node = cluster_b.local_node().clone();
        let pid = rpc_a
            .spawn_remote(
                &b_node,
                "echo",
                None,
                Registration::None,
                None,
                Duration::from_secs(2),
            )
            .await
            .unwrap();

        let reply: String = rpc_a
            .call(&pid, &EchoMsg::Echo("hello".to_string()), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply, "hello");

        cluster_a.stop().await.unwrap();
        cluster_b.stop().await.unwrap();
    }

    #[tokio::test]
    async fn remote_spawn_with_local_registration_is_registered_on_the_receiver() {
        let cluster_a = start_cluster("a2", Vec::new()).await;
        let a_port = cluster_a
            .local_node()
            .as_str()
            .rsplit(':')
            .next()
            .unwrap()
            .to_string();
        let cluster_b = start_cluster("b2", vec![format!("127.0.0.1:{a_port}")]).await;

        wait_for_up(&cluster_a).await;
        wait_for_up(&cluster_b).await;

        let registry_a = BehaviorRegistry::new();
        let registry_b = BehaviorRegistry::new();
        registry_b.register("echo", |_init_args| Ok(Echo));

        let local_registry_a = Registry::new(Keys::Unique);
        let local_registry_b = Registry::new(Keys::Unique);
        let rpc_a = Rpc::start(
            cluster_a.clone(),
            registry_a,
            ProcessTable::default(),
            LifecycleBus::default(),
            local_registry_a.clone(),
            GlobalRegistry::start(cluster_a.clone()),
        );
        let _rpc_b = Rpc::start(
            cluster_b.clone(),
            registry_b,
            ProcessTable::default(),
            LifecycleBus::default(),
            local_registry_b.clone(),
            GlobalRegistry::start(cluster_b.clone()),
        );

        let b_node = cluster_b.local_node().clone();
        let pid = rpc_a
            .spawn_remote(
                &b_node,
                "echo",
                None,
                Registration::Local,
                Some("echo-server".to_string()),
                Duration::from_secs(2),
            )
            .await
            .unwrap();

        // Registered on the node that ran it (b), not the initiator (a).
        assert_eq!(local_registry_b.lookup("echo-server").unwrap(), pid);
        assert!(local_registry_a.whereis("echo-server").is_none());

        cluster_a.stop().await.unwrap();
        cluster_b.stop().await.unwrap();
    }
}
