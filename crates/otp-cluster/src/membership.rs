//! The cluster membership actor: `start`, seed discovery, reconnect, and
//! the public `Cluster` handle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use otp_types::NodeId;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;

use otp_wire::{Frame, Message, PeerIdentity};

use crate::error::{ClusterError, Result};
use crate::events::{ClusterEvent, ClusterEventBus};
use crate::options::StartOptions;
use crate::peer::{self, PeerTable};

/// A running cluster membership instance for one local node.
///
/// Dropping a `Cluster` does not stop it — call [`Cluster::stop`]
/// explicitly; repeated calls are idempotent.
pub struct Cluster {
    local_node: NodeId,
    table: PeerTable,
    bus: ClusterEventBus,
    inbound_tx: broadcast::Sender<(NodeId, Frame)>,
    shutdown: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Cluster {
    /// Starts a local node: binds the listening port, connects to every
    /// seed, and begins heartbeat keepalive.
    pub async fn start(options: StartOptions) -> Result<Self> {
        let listener = TcpListener::bind((options.host.as_str(), options.port))
            .await
            .map_err(ClusterError::Io)?;
        let bound_addr = listener.local_addr().map_err(ClusterError::Io)?;
        let local_node = NodeId::new(&options.node_name, &options.host, bound_addr.port());
        let local_addr = bound_addr.to_string();

        let table: PeerTable = Arc::new(Mutex::new(std::collections::HashMap::new()));
        let bus = ClusterEventBus::default();
        let (inbound_tx, _rx) = broadcast::channel(1024);
        let (gossip_tx, gossip_rx) = mpsc::unbounded_channel::<String>();
        let shutdown = Arc::new(Notify::new());
        let shared_secret = Arc::new(options.shared_secret.clone());
        let known_addrs: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        known_addrs.lock().insert(local_addr);

        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(accept_loop(
            listener,
            local_node.clone(),
            options.heartbeat_interval(),
            options.heartbeat_miss_threshold,
            shared_secret.clone(),
            table.clone(),
            bus.clone(),
            inbound_tx.clone(),
            gossip_tx.clone(),
        )));

        tasks.push(tokio::spawn(gossip_dispatch_loop(
            gossip_rx,
            known_addrs.clone(),
            local_node.clone(),
            options.heartbeat_interval(),
            options.heartbeat_miss_threshold,
            options.reconnect_backoff_ceiling(),
            shared_secret.clone(),
            table.clone(),
            bus.clone(),
            inbound_tx.clone(),
            gossip_tx.clone(),
            shutdown.clone(),
        )));

        for seed in &options.seeds {
            known_addrs.lock().insert(seed.clone());
            tasks.push(tokio::spawn(seed_connector(
                seed.clone(),
                local_node.clone(),
                options.heartbeat_interval(),
                options.heartbeat_miss_threshold,
                options.reconnect_backoff_ceiling(),
                shared_secret.clone(),
                known_addrs.clone(),
                table.clone(),
                bus.clone(),
                inbound_tx.clone(),
                gossip_tx.clone(),
                shutdown.clone(),
            )));
        }

        Ok(Self {
            local_node,
            table,
            bus,
            inbound_tx,
            shutdown,
            stopped: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(tasks),
        })
    }

    pub fn local_node(&self) -> &NodeId {
        &self.local_node
    }

    /// Currently `up` peers.
    pub fn known_peers(&self) -> Vec<NodeId> {
        self.table.lock().keys().cloned().collect()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClusterEvent> {
        self.bus.subscribe()
    }

    /// Every non-membership frame received from any peer, tagged with the
    /// sending peer's node id. `otp-rpc` (or a test) consumes this to
    /// implement `call`/`cast`/spawn routing.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<(NodeId, Frame)> {
        self.inbound_tx.subscribe()
    }

    /// Routes `frame` to `target`'s connection. Fails with
    /// [`ClusterError::UnknownPeer`] if `target` is not currently `up`.
    pub fn send_frame(&self, target: &NodeId, frame: Frame) -> Result<()> {
        let tx = self
            .table
            .lock()
            .get(target)
            .cloned()
            .ok_or_else(|| ClusterError::UnknownPeer(target.clone()))?;
        tx.send(frame)
            .map_err(|_| ClusterError::UnknownPeer(target.clone()))
    }

    /// Idempotent: a second call is a no-op.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.notify_waiters();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    listener: TcpListener,
    local_node: NodeId,
    heartbeat_interval: Duration,
    miss_threshold: u32,
    shared_secret: Arc<Vec<u8>>,
    table: PeerTable,
    bus: ClusterEventBus,
    inbound_tx: broadcast::Sender<(NodeId, Frame)>,
    gossip_tx: mpsc::UnboundedSender<String>,
) {
    loop {
        let (mut stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };

        let local_node = local_node.clone();
        let shared_secret = shared_secret.clone();
        let table = table.clone();
        let bus = bus.clone();
        let inbound_tx = inbound_tx.clone();
        let gossip_tx = gossip_tx.clone();

        tokio::spawn(async move {
            let identity =
                match otp_wire::accept(&mut stream, local_node.as_str(), &shared_secret).await {
                    Ok(identity) => identity,
                    Err(e) => {
                        tracing::warn!(peer = %addr, error = %e, "inbound handshake failed");
                        return;
                    }
                };

            let peer_node = NodeId::from_canonical(identity.node_id);
            peer::run_session(
                stream,
                peer_node,
                heartbeat_interval,
                miss_threshold,
                table,
                bus,
                inbound_tx,
                gossip_tx,
            )
            .await;
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn gossip_dispatch_loop(
    mut gossip_rx: mpsc::UnboundedReceiver<String>,
    known_addrs: Arc<Mutex<HashSet<String>>>,
    local_node: NodeId,
    heartbeat_interval: Duration,
    miss_threshold: u32,
    backoff_ceiling: Duration,
    shared_secret: Arc<Vec<u8>>,
    table: PeerTable,
    bus: ClusterEventBus,
    inbound_tx: broadcast::Sender<(NodeId, Frame)>,
    gossip_tx: mpsc::UnboundedSender<String>,
    shutdown: Arc<Notify>,
) {
    while let Some(addr) = gossip_rx.recv().await {
        let is_new = known_addrs.lock().insert(addr.clone());
        if !is_new {
            continue;
        }
        tokio::spawn(seed_connector(
            addr,
            local_node.clone(),
            heartbeat_interval,
            miss_threshold,
            backoff_ceiling,
            shared_secret.clone(),
            known_addrs.clone(),
            table.clone(),
            bus.clone(),
            inbound_tx.clone(),
            gossip_tx.clone(),
            shutdown.clone(),
        ));
    }
}

#[allow(clippy::too_many_arguments)]
async fn seed_connector(
    addr: String,
    local_node: NodeId,
    heartbeat_interval: Duration,
    miss_threshold: u32,
    backoff_ceiling: Duration,
    shared_secret: Arc<Vec<u8>>,
    known_addrs: Arc<Mutex<HashSet<String>>>,
    table: PeerTable,
    bus: ClusterEventBus,
    inbound_tx: broadcast::Sender<(NodeId, Frame)>,
    gossip_tx: mpsc::UnboundedSender<String>,
    shutdown: Arc<Notify>,
) {
    let mut backoff = Duration::from_millis(200);
    loop {
        let connected = tokio::select! {
            () = shutdown.notified() => return,
            result = connect_and_handshake(&addr, &local_node, &shared_secret) => result,
        };

        match connected {
            Ok((mut stream, identity)) => {
                backoff = Duration::from_millis(200);
                let peers: Vec<String> = known_addrs.lock().iter().cloned().collect();
                let _ = otp_wire::write_frame(
                    &mut stream,
                    &Frame::new(Message::NodeGossip { peers }),
                )
                .await;

                let peer_node = NodeId::from_canonical(identity.node_id);
                peer::run_session(
                    stream,
                    peer_node,
                    heartbeat_interval,
                    miss_threshold,
                    table.clone(),
                    bus.clone(),
                    inbound_tx.clone(),
                    gossip_tx.clone(),
                )
                .await;
            }
            Err(e) => {
                tracing::debug!(seed = %addr, error = %e, "seed connect failed, backing off");
            }
        }

        tokio::select! {
            () = shutdown.notified() => return,
            () = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(backoff_ceiling);
    }
}

async fn connect_and_handshake(
    addr: &str,
    local_node: &NodeId,
    shared_secret: &[u8],
) -> Result<(TcpStream, PeerIdentity)> {
    let mut stream = TcpStream::connect(addr).await.map_err(ClusterError::Io)?;
    let identity = otp_wire::initiate(&mut stream, local_node.as_str(), shared_secret)
        .await
        .map_err(ClusterError::Wire)?;
    Ok((stream, identity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    async fn bind_options(node_name: &str, seeds: Vec<String>) -> StartOptions {
        StartOptions {
            node_name: node_name.to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            seeds,
            heartbeat_interval_ms: 50,
            heartbeat_miss_threshold: 3,
            reconnect_backoff_ceiling_ms: 200,
            shared_secret: b"test-secret".to_vec(),
        }
    }

    #[tokio::test]
    async fn seeding_one_node_brings_both_up() {
        let a = Cluster::start(bind_options("a", Vec::new()).await).await.unwrap();
        let a_addr = format!(
            "127.0.0.1:{}",
            a.local_node().as_str().rsplit(':').next().unwrap()
        );

        let mut b_events = {
            let b_opts = bind_options("b", vec![a_addr]).await;
            let b = Cluster::start(b_opts).await.unwrap();
            let events = b.subscribe_events();
            (b, events)
        };

        let saw_up = timeout(Duration::from_secs(2), async {
            loop {
                match b_events.1.recv().await {
                    Ok(ClusterEvent::NodeUp(_)) => return true,
                    Ok(_) => continue,
                    Err(_) => return false,
                }
            }
        })
        .await
        .unwrap_or(false);

        assert!(saw_up);
        assert_eq!(b_events.0.known_peers().len(), 1);
        assert_eq!(a.known_peers().len(), 1);

        a.stop().await.unwrap();
        b_events.0.stop().await.unwrap();
    }
}
