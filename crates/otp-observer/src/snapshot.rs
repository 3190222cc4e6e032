//! Read-only snapshot assembly: the point-in-time view `getSnapshot`/the
//! polling loop hand to callers.

use otp_process::{ProcessTable, Status};
use otp_supervisor::{ChildKind, ChildSummary, Strategy, Supervisor};
use otp_types::Pid;
use serde::{Deserialize, Serialize};

/// A tracked supervisor, keyed by the caller-chosen id it was registered
/// under ([`crate::Observer::track_supervisor`]).
#[derive(Clone)]
pub(crate) struct TrackedSupervisor {
    pub(crate) id: String,
    pub(crate) supervisor: Supervisor,
}

/// One process's stats as of the snapshot's timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStats {
    pub id: Pid,
    pub status: StatusWire,
    pub queue_size: usize,
    pub message_count: u64,
    pub started_at_ms: u64,
    pub uptime_ms: u64,
    /// Best-effort; this runtime does not track per-process heap usage, so
    /// this is always `None`. Kept so a future allocator-level estimate
    /// can be plugged in without changing the shape callers depend on.
    pub state_memory_bytes: Option<u64>,
}

/// A serializable mirror of [`otp_process::Status`] — the original isn't
/// `Serialize` since it's an internal runtime type shared across crates
/// that don't otherwise need `serde`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusWire {
    Initializing,
    Running,
    Stopping,
    Stopped,
}

impl From<Status> for StatusWire {
    fn from(status: Status) -> Self {
        match status {
            Status::Initializing => StatusWire::Initializing,
            Status::Running => StatusWire::Running,
            Status::Stopping => StatusWire::Stopping,
            Status::Stopped => StatusWire::Stopped,
        }
    }
}

/// One supervisor's declared children, as of the snapshot's timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorStats {
    pub id: String,
    pub guardian_pid: Pid,
    pub strategy: StrategyWire,
    pub children: Vec<ChildStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyWire {
    OneForOne,
    OneForAll,
    RestForOne,
    SimpleOneForOne,
}

impl From<Strategy> for StrategyWire {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::OneForOne => StrategyWire::OneForOne,
            Strategy::OneForAll => StrategyWire::OneForAll,
            Strategy::RestForOne => StrategyWire::RestForOne,
            Strategy::SimpleOneForOne => StrategyWire::SimpleOneForOne,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildStats {
    pub id: String,
    pub pid: Option<Pid>,
    pub kind: ChildKindWire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildKindWire {
    Worker,
    Supervisor,
}

impl From<ChildKind> for ChildKindWire {
    fn from(kind: ChildKind) -> Self {
        match kind {
            ChildKind::Worker => ChildKindWire::Worker,
            ChildKind::Supervisor => ChildKindWire::Supervisor,
        }
    }
}

/// A node of the supervision tree: a supervisor with its recursively
/// resolved children, or a bare process not under any tracked supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Supervisor {
        id: String,
        pid: Pid,
        strategy: StrategyWire,
        children: Vec<TreeNode>,
    },
    Process {
        id: Pid,
    },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Coarse estimate: live process count times a fixed per-process
    /// bookkeeping overhead. This runtime has no allocator hook, so it
    /// cannot report real heap usage — see `ProcessStats::state_memory_bytes`.
    pub estimated_bytes: u64,
}

/// The full runtime snapshot: every live process, every tracked
/// supervisor, the supervision tree, and rollup counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp_ms: u64,
    pub servers: Vec<ProcessStats>,
    pub supervisors: Vec<SupervisorStats>,
    pub tree: Vec<TreeNode>,
    pub process_count: usize,
    pub total_messages: u64,
    pub total_restarts: u64,
    pub memory_stats: MemoryStats,
}

/// Per-process bookkeeping-overhead estimate used for [`MemoryStats`].
/// Not a measurement — there is no allocator hook in this runtime — just
/// a stable, documented placeholder so `memory_stats` is never zero-ish
/// noise for a runtime that plainly has live processes.
const ESTIMATED_BYTES_PER_PROCESS: u64 = 512;

pub(crate) fn assemble(
    table: &ProcessTable,
    supervisors: &[TrackedSupervisor],
    total_restarts: u64,
    now_ms: u64,
) -> Snapshot {
    let handles = table.handles();

    let mut total_messages = 0u64;
    let servers: Vec<ProcessStats> = handles
        .iter()
        .map(|handle| {
            let message_count = handle.message_count();
            total_messages += message_count;
            let uptime_ms = handle.started_at().elapsed().as_millis() as u64;
            ProcessStats {
                id: handle.pid().clone(),
                status: handle.status().into(),
                queue_size: handle.queue_size(),
                message_count,
                started_at_ms: now_ms.saturating_sub(uptime_ms),
                uptime_ms,
                state_memory_bytes: None,
            }
        })
        .collect();

    let supervisor_stats: Vec<SupervisorStats> = supervisors
        .iter()
        .map(|tracked| supervisor_stats(tracked))
        .collect();

    let tracked_pids: std::collections::HashSet<Pid> = supervisors
        .iter()
        .map(|t| t.supervisor.guardian_pid())
        .collect();

    let tree = build_tree(supervisors, &tracked_pids, &handles);

    let process_count = handles.len();
    let memory_stats = MemoryStats {
        estimated_bytes: process_count as u64 * ESTIMATED_BYTES_PER_PROCESS,
    };

    Snapshot {
        timestamp_ms: now_ms,
        servers,
        supervisors: supervisor_stats,
        tree,
        process_count,
        total_messages,
        total_restarts,
        memory_stats,
    }
}

fn supervisor_stats(tracked: &TrackedSupervisor) -> SupervisorStats {
    SupervisorStats {
        id: tracked.id.clone(),
        guardian_pid: tracked.supervisor.guardian_pid(),
        strategy: tracked.supervisor.strategy().into(),
        children: tracked
            .supervisor
            .which_children()
            .into_iter()
            .map(child_stats)
            .collect(),
    }
}

fn child_stats(summary: ChildSummary) -> ChildStats {
    ChildStats {
        id: summary.id,
        pid: summary.pid,
        kind: summary.kind.into(),
    }
}

/// Walks every top-level tracked supervisor (one not itself a child of
/// another tracked supervisor) and recursively resolves `Supervisor`
/// children against the tracked set; an untracked supervisor child or an
/// ordinary worker appears as a leaf `Process` node. Any live process not
/// reachable from a tracked supervisor appears at the top level too.
fn build_tree(
    supervisors: &[TrackedSupervisor],
    tracked_pids: &std::collections::HashSet<Pid>,
    all_handles: &[otp_process::ProcessHandle],
) -> Vec<TreeNode> {
    let by_pid: std::collections::HashMap<Pid, &TrackedSupervisor> = supervisors
        .iter()
        .map(|t| (t.supervisor.guardian_pid(), t))
        .collect();

    let nested: std::collections::HashSet<Pid> = supervisors
        .iter()
        .flat_map(|t| t.supervisor.which_children())
        .filter(|c| c.kind == ChildKind::Supervisor)
        .filter_map(|c| c.pid)
        .collect();

    let mut tree: Vec<TreeNode> = supervisors
        .iter()
        .filter(|t| !nested.contains(&t.supervisor.guardian_pid()))
        .map(|t| resolve_node(t, &by_pid))
        .collect();

    let accounted: std::collections::HashSet<Pid> = supervisors
        .iter()
        .flat_map(|t| {
            let mut pids: Vec<Pid> = vec![t.supervisor.guardian_pid()];
            pids.extend(t.supervisor.which_children().into_iter().filter_map(|c| c.pid));
            pids
        })
        .collect();

    for handle in all_handles {
        if !accounted.contains(handle.pid()) && !tracked_pids.contains(handle.pid()) {
            tree.push(TreeNode::Process {
                id: handle.pid().clone(),
            });
        }
    }

    tree
}

fn resolve_node(
    tracked: &TrackedSupervisor,
    by_pid: &std::collections::HashMap<Pid, &TrackedSupervisor>,
) -> TreeNode {
    let children = tracked
        .supervisor
        .which_children()
        .into_iter()
        .filter_map(
            |child| match (child.kind, child.pid.as_ref().and_then(|p| by_pid.get(p))) {
                (ChildKind::Supervisor, Some(nested)) => Some(resolve_node(nested, by_pid)),
                (_, _) => child.pid.map(|id| TreeNode::Process { id }),
            },
        )
        .collect();

    TreeNode::Supervisor {
        id: tracked.id.clone(),
        pid: tracked.supervisor.guardian_pid(),
        strategy: tracked.supervisor.strategy().into(),
        children,
    }
}
