//! One peer connection's session, after a successful handshake:
//! heartbeat keepalive over a framed transport.
//!
//! Three cooperating tasks per connection, to keep each stream half's I/O
//! cancel-safe (reading a frame by racing it inside a `tokio::select!`
//! would lose already-read header bytes on cancellation):
//! - a **reader** task that only ever calls `read_frame` to completion and
//!   forwards decoded frames on a channel;
//! - a **writer** task that owns the write half and serializes both
//!   outbound application frames and periodic heartbeats through it;
//! - this module's `run_session`, which owns neither half, drives missed-
//!   heartbeat accounting, and dispatches inbound frames.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use otp_types::NodeId;
use parking_lot::Mutex;
use tokio::io::{split, AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use otp_wire::{read_frame, write_frame, Frame, Message};

use crate::events::{ClusterEvent, ClusterEventBus};

/// Shared table of currently-`up` peers, keyed by node id. Holds just
/// enough to route an outbound frame to the right connection's writer.
pub type PeerTable = Arc<Mutex<HashMap<NodeId, mpsc::UnboundedSender<Frame>>>>;

/// Runs one peer connection to completion (until it drops or is kicked
/// for missing too many heartbeats). Registers itself in `table` and
/// removes itself on exit, emitting `NodeUp`/`NodeDown` on `bus`.
///
/// Every frame that is not `Heartbeat`/`NodeGossip` is forwarded on
/// `inbound_tx` tagged with the peer's node id, for `otp-rpc` (or any
/// other subscriber) to consume.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_session<S>(
    stream: S,
    peer_node: NodeId,
    heartbeat_interval: Duration,
    miss_threshold: u32,
    table: PeerTable,
    bus: ClusterEventBus,
    inbound_tx: broadcast::Sender<(NodeId, Frame)>,
    gossip_tx: mpsc::UnboundedSender<String>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut read_half, mut write_half) = split(stream);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
    let (decoded_tx, mut decoded_rx) = mpsc::unbounded_channel::<Frame>();

    table.lock().insert(peer_node.clone(), outbound_tx.clone());
    bus.emit(ClusterEvent::NodeUp(peer_node.clone()));
    emit_state_changed(&table, &bus);

    let reader = tokio::spawn(async move {
        loop {
            match read_frame(&mut read_half).await {
                Ok(frame) => {
                    if decoded_tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                frame = outbound_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            if write_frame(&mut write_half, &frame).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if write_frame(&mut write_half, &Frame::new(Message::Heartbeat)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut missed: u32 = 0;
    let mut missed_ticker = tokio::time::interval(heartbeat_interval);
    missed_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    'session: loop {
        tokio::select! {
            biased;
            frame = decoded_rx.recv() => {
                match frame {
                    Some(Frame { message: Message::Heartbeat, .. }) => {
                        missed = 0;
                        last_seen = Instant::now();
                    }
                    Some(Frame { message: Message::NodeGossip { peers }, .. }) => {
                        missed = 0;
                        last_seen = Instant::now();
                        for addr in peers {
                            let _ = gossip_tx.send(addr);
                        }
                    }
                    Some(frame) => {
                        last_seen = Instant::now();
                        let _ = inbound_tx.send((peer_node.clone(), frame));
                    }
                    None => break 'session,
                }
            }
            _ = missed_ticker.tick() => {
                if last_seen.elapsed() >= heartbeat_interval {
                    missed += 1;
                }
                if missed >= miss_threshold {
                    tracing::warn!(node = %peer_node, missed, "peer missed too many heartbeats, marking down");
                    break 'session;
                }
            }
        }
    }

    reader.abort();
    writer.abort();
    table.lock().remove(&peer_node);
    bus.emit(ClusterEvent::NodeDown(
        peer_node.clone(),
        "heartbeat timeout or connection closed".to_string(),
    ));
    emit_state_changed(&table, &bus);
}

fn emit_state_changed(table: &PeerTable, bus: &ClusterEventBus) {
    let up: Vec<NodeId> = table.lock().keys().cloned().collect();
    bus.emit(ClusterEvent::ClusterStateChanged { up });
}
