//! Cluster-wide name table: local view, conflict resolution, sync on join,
//! and cleanup on node down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use otp_cluster::{Cluster, ClusterEvent};
use otp_types::{Error, NodeId, Pid, Result};
use otp_wire::{Frame, Message, RegistryEntryWire, WireRef};

use crate::entry::GlobalEntry;
use crate::events::{GlobalRegistryEvent, GlobalRegistryEventBus};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn to_wire(entry: &GlobalEntry) -> RegistryEntryWire {
    RegistryEntryWire {
        name: entry.name.clone(),
        ref_: WireRef {
            id: entry.pid.id().to_string(),
            node_id: entry.pid.node_id().as_str().to_string(),
        },
        node_id: entry.node_id.as_str().to_string(),
        timestamp_ms: entry.timestamp_ms,
        priority: entry.priority,
    }
}

fn from_wire(wire: &RegistryEntryWire) -> GlobalEntry {
    GlobalEntry {
        name: wire.name.clone(),
        pid: Pid::new(
            wire.ref_.id.clone(),
            NodeId::from_canonical(wire.ref_.node_id.clone()),
        ),
        node_id: NodeId::from_canonical(wire.node_id.clone()),
        timestamp_ms: wire.timestamp_ms,
        priority: wire.priority,
    }
}

/// The pure, cluster-independent local view: applying entries, resolving
/// conflicts, and cleaning up after a node goes down. Kept separate from
/// [`GlobalRegistry`] so the conflict-resolution logic is testable without
/// a live [`Cluster`].
#[derive(Default)]
struct View {
    entries: Mutex<HashMap<String, GlobalEntry>>,
    bus: GlobalRegistryEventBus,
}

impl View {
    fn get(&self, name: &str) -> Option<Pid> {
        self.entries.lock().get(name).map(|e| e.pid.clone())
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Applies an incoming or locally-originated entry against the current
    /// view, resolving any conflict deterministically per
    /// `(priority desc, timestamp asc, node_id lex asc)`.
    fn apply_entry(&self, candidate: GlobalEntry) {
        let mut entries = self.entries.lock();
        match entries.get(&candidate.name) {
            None => {
                let name = candidate.name.clone();
                let pid = candidate.pid.clone();
                entries.insert(name.clone(), candidate);
                drop(entries);
                self.bus.emit(GlobalRegistryEvent::Registered(name, pid));
            }
            Some(existing) if existing.pid == candidate.pid && existing.node_id == candidate.node_id => {
                // Re-delivery of the same registration; not a conflict.
            }
            Some(existing) => {
                let existing = existing.clone();
                let candidate_wins = candidate.wins_over(&existing);
                let winner = if candidate_wins { candidate.clone() } else { existing };
                let winner_node = winner.node_id.clone();
                let name = candidate.name.clone();
                entries.insert(name.clone(), winner.clone());
                drop(entries);
                self.bus.emit(GlobalRegistryEvent::ConflictResolved {
                    name: name.clone(),
                    winner: winner_node,
                });
                if candidate_wins {
                    self.bus.emit(GlobalRegistryEvent::Registered(name, winner.pid));
                }
            }
        }
    }

    /// Removes the local node's own entry for `name`, if any, returning it.
    fn remove_owned(&self, name: &str, owner: &NodeId) -> Option<GlobalEntry> {
        let mut entries = self.entries.lock();
        match entries.get(name) {
            Some(entry) if &entry.node_id == owner => entries.remove(name),
            _ => None,
        }
    }

    /// Applies a remote `unregister` event: removes the entry only if it
    /// still matches the pid being unregistered.
    fn apply_unregister(&self, wire: &RegistryEntryWire) -> Option<GlobalEntry> {
        let candidate = from_wire(wire);
        let mut entries = self.entries.lock();
        match entries.get(&candidate.name) {
            Some(existing) if existing.pid == candidate.pid => entries.remove(&candidate.name),
            _ => None,
        }
    }

    /// Removes every entry owned by `node`, returning them for event
    /// emission.
    fn cleanup_node(&self, node: &NodeId) -> Vec<GlobalEntry> {
        let mut entries = self.entries.lock();
        let removed: Vec<GlobalEntry> = entries
            .values()
            .filter(|e| &e.node_id == node)
            .cloned()
            .collect();
        entries.retain(|_, e| &e.node_id != node);
        removed
    }

    fn snapshot(&self) -> Vec<GlobalEntry> {
        self.entries.lock().values().cloned().collect()
    }
}

struct Inner {
    local_node: NodeId,
    cluster: Arc<Cluster>,
    view: View,
}

/// The cluster-wide name registry's local view for one node. Cheap to
/// clone; every clone shares the same underlying table and background
/// replication tasks.
#[derive(Clone)]
pub struct GlobalRegistry {
    inner: Arc<Inner>,
}

impl GlobalRegistry {
    /// Starts replication over `cluster`: sends a full `registry_sync` to
    /// every peer that comes `up`, removes entries for peers that go
    /// `down`, and applies inbound `registry_event`/`registry_sync` frames.
    pub fn start(cluster: Arc<Cluster>) -> Self {
        let inner = Arc::new(Inner {
            local_node: cluster.local_node().clone(),
            cluster,
            view: View::default(),
        });
        let registry = Self { inner };
        registry.spawn_frame_listener();
        registry.spawn_membership_listener();
        registry
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<GlobalRegistryEvent> {
        self.inner.view.bus.subscribe()
    }

    /// Registers `pid` under `name` cluster-wide. Applies locally first,
    /// then fans the `registry_event` out to every currently up peer.
    pub fn register(&self, name: impl Into<String>, pid: Pid, priority: i64) -> Result<()> {
        let entry = GlobalEntry {
            name: name.into(),
            pid,
            node_id: self.inner.local_node.clone(),
            timestamp_ms: now_ms(),
            priority,
        };
        self.inner.view.apply_entry(entry.clone());
        self.broadcast(Message::RegistryEvent {
            op: "register".to_string(),
            entry: to_wire(&entry),
        });
        Ok(())
    }

    /// Removes the local node's own entry for `name`, if any, and
    /// broadcasts the removal.
    pub fn unregister(&self, name: &str) {
        if let Some(entry) = self.inner.view.remove_owned(name, &self.inner.local_node) {
            self.inner
                .view
                .bus
                .emit(GlobalRegistryEvent::Unregistered(entry.name.clone(), entry.pid.clone()));
            self.broadcast(Message::RegistryEvent {
                op: "unregister".to_string(),
                entry: to_wire(&entry),
            });
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Pid> {
        self.whereis(name)
            .ok_or_else(|| Error::NotGloballyRegistered(name.to_string()))
    }

    pub fn whereis(&self, name: &str) -> Option<Pid> {
        self.inner.view.get(name)
    }

    pub fn len(&self) -> usize {
        self.inner.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn broadcast(&self, message: Message) {
        for peer in self.inner.cluster.known_peers() {
            let _ = self.inner.cluster.send_frame(&peer, Frame::new(message.clone()));
        }
    }

    fn spawn_frame_listener(&self) {
        let inner = self.inner.clone();
        let mut frames = inner.cluster.subscribe_frames();
        tokio::spawn(async move {
            loop {
                let (_from, frame) = match frames.recv().await {
                    Ok(pair) => pair,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                match frame.message {
                    Message::RegistryEvent { op, entry } => match op.as_str() {
                        "register" => inner.view.apply_entry(from_wire(&entry)),
                        "unregister" => {
                            if let Some(removed) = inner.view.apply_unregister(&entry) {
                                inner
                                    .view
                                    .bus
                                    .emit(GlobalRegistryEvent::Unregistered(removed.name, removed.pid));
                            }
                        }
                        other => tracing::warn!(op = other, "unknown registry_event op"),
                    },
                    Message::RegistrySync { entries } => {
                        for wire in entries {
                            inner.view.apply_entry(from_wire(&wire));
                        }
                    }
                    _ => {}
                }
            }
        });
    }

    fn spawn_membership_listener(&self) {
        let inner = self.inner.clone();
        let mut events = inner.cluster.subscribe_events();
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                match event {
                    ClusterEvent::NodeUp(peer) => {
                        let entries = inner.view.snapshot().iter().map(to_wire).collect();
                        let _ = inner
                            .cluster
                            .send_frame(&peer, Frame::new(Message::RegistrySync { entries }));
                    }
                    ClusterEvent::NodeDown(peer, _reason) => {
                        for entry in inner.view.cleanup_node(&peer) {
                            inner
                                .view
                                .bus
                                .emit(GlobalRegistryEvent::Unregistered(entry.name, entry.pid));
                        }
                    }
                    ClusterEvent::ClusterStateChanged { .. } => {}
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid_on(node: &NodeId) -> Pid {
        Pid::generate(node.clone())
    }

    #[test]
    fn fresh_registration_applies_with_no_conflict() {
        let node = NodeId::new("a", "localhost", 1);
        let view = View::default();
        let mut events = view.bus.subscribe();
        let pid = pid_on(&node);
        view.apply_entry(GlobalEntry {
            name: "svc".to_string(),
            pid: pid.clone(),
            node_id: node,
            timestamp_ms: 1000,
            priority: 0,
        });
        assert_eq!(view.get("svc"), Some(pid));
        assert!(matches!(
            events.try_recv().unwrap(),
            GlobalRegistryEvent::Registered(name, _) if name == "svc"
        ));
    }

    #[test]
    fn conflict_resolution_picks_smaller_tuple() {
        let n1 = NodeId::new("n1", "localhost", 1);
        let n2 = NodeId::new("n2", "localhost", 2);
        let view = View::default();

        let e1 = GlobalEntry {
            name: "svc".to_string(),
            pid: pid_on(&n1),
            node_id: n1.clone(),
            timestamp_ms: 1000,
            priority: 0,
        };
        let e2 = GlobalEntry {
            name: "svc".to_string(),
            pid: pid_on(&n2),
            node_id: n2.clone(),
            timestamp_ms: 1005,
            priority: 0,
        };
        view.apply_entry(e1.clone());
        view.apply_entry(e2);

        // n1 registered earlier (smaller timestamp) so it wins.
        assert_eq!(view.get("svc"), Some(e1.pid));
    }

    #[test]
    fn conflict_resolution_is_symmetric_regardless_of_arrival_order() {
        let n1 = NodeId::new("n1", "localhost", 1);
        let n2 = NodeId::new("n2", "localhost", 2);

        let e1 = GlobalEntry {
            name: "svc".to_string(),
            pid: pid_on(&n1),
            node_id: n1,
            timestamp_ms: 1000,
            priority: 0,
        };
        let e2 = GlobalEntry {
            name: "svc".to_string(),
            pid: pid_on(&n2),
            node_id: n2,
            timestamp_ms: 1005,
            priority: 0,
        };

        let view_a = View::default();
        view_a.apply_entry(e1.clone());
        view_a.apply_entry(e2.clone());

        let view_b = View::default();
        view_b.apply_entry(e2);
        view_b.apply_entry(e1.clone());

        assert_eq!(view_a.get("svc"), view_b.get("svc"));
        assert_eq!(view_a.get("svc"), Some(e1.pid));
    }

    #[test]
    fn higher_priority_wins_over_earlier_timestamp() {
        let n1 = NodeId::new("n1", "localhost", 1);
        let n2 = NodeId::new("n2", "localhost", 2);
        let view = View::default();

        let low_priority_but_earlier = GlobalEntry {
            name: "svc".to_string(),
            pid: pid_on(&n1),
            node_id: n1,
            timestamp_ms: 1,
            priority: 0,
        };
        let high_priority = GlobalEntry {
            name: "svc".to_string(),
            pid: pid_on(&n2),
            node_id: n2,
            timestamp_ms: 9999,
            priority: 10,
        };
        view.apply_entry(low_priority_but_earlier);
        view.apply_entry(high_priority.clone());

        assert_eq!(view.get("svc"), Some(high_priority.pid));
    }

    #[test]
    fn node_down_cleans_up_its_entries() {
        let n1 = NodeId::new("n1", "localhost", 1);
        let n2 = NodeId::new("n2", "localhost", 2);
        let view = View::default();
        view.apply_entry(GlobalEntry {
            name: "a".to_string(),
            pid: pid_on(&n1),
            node_id: n1,
            timestamp_ms: 1,
            priority: 0,
        });
        view.apply_entry(GlobalEntry {
            name: "b".to_string(),
            pid: pid_on(&n2),
            node_id: n2.clone(),
            timestamp_ms: 1,
            priority: 0,
        });
        let removed = view.cleanup_node(&n2);
        assert_eq!(removed.len(), 1);
        assert!(view.get("a").is_some());
        assert!(view.get("b").is_none());
    }
}

#[cfg(test)]
mod integration {
    use super::*;
    use otp_cluster::StartOptions;
    use std::time::Duration;
    use tokio::time::timeout;

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
                shared_secret: b"global-registry-test".to_vec(),
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

    /// Scenario: two nodes each register the same name before syncing.
    /// After sync both agree on the same winner and both observe
    /// `conflict_resolved`.
    #[tokio::test]
    async fn sync_on_join_resolves_conflicting_registrations() {
        let cluster_a = start_cluster("n1", Vec::new()).await;
        let a_port = cluster_a
            .local_node()
            .as_str()
            .rsplit(':')
            .next()
            .unwrap()
            .to_string();

        let registry_a = GlobalRegistry::start(cluster_a.clone());
        let mut events_a = registry_a.subscribe();

        // n1 registers first, at an earlier logical timestamp.
        registry_a
            .register("svc", Pid::generate(cluster_a.local_node().clone()), 0)
            .unwrap();

        let cluster_b = start_cluster("n2", vec![format!("127.0.0.1:{a_port}")]).await;
        let registry_b = GlobalRegistry::start(cluster_b.clone());
        let mut events_b = registry_b.subscribe();

        // n2 registers its own entry for the same name before the two
        // nodes have synced, simulating a race.
        registry_b
            .register("svc", Pid::generate(cluster_b.local_node().clone()), 0)
            .unwrap();

        wait_for_up(&cluster_a).await;
        wait_for_up(&cluster_b).await;

        // Allow the registry_sync exchange to land.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let winner_a = registry_a.whereis("svc");
        let winner_b = registry_b.whereis("svc");
        assert!(winner_a.is_some());
        assert_eq!(winner_a, winner_b, "both nodes must agree on the winner");

        let saw_conflict_a = timeout(Duration::from_millis(500), async {
            loop {
                if let Ok(GlobalRegistryEvent::ConflictResolved { name, .. }) = events_a.recv().await {
                    if name == "svc" {
                        return true;
                    }
                }
            }
        })
        .await
        .unwrap_or(false);
        let saw_conflict_b = timeout(Duration::from_millis(500), async {
            loop {
                if let Ok(GlobalRegistryEvent::ConflictResolved { name, .. }) = events_b.recv().await {
                    if name == "svc" {
                        return true;
                    }
                }
            }
        })
        .await
        .unwrap_or(false);
        assert!(saw_conflict_a, "n1 should observe conflict_resolved");
        assert!(saw_conflict_b, "n2 should observe conflict_resolved");

        cluster_a.stop().await.unwrap();
        cluster_b.stop().await.unwrap();
    }
}
