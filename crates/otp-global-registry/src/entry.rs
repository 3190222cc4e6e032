//! Global registry entry shape and the conflict-resolution tie-break.

use otp_types::{NodeId, Pid};

/// A cluster-wide name -> reference binding, as replicated to every up peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalEntry {
    pub name: String,
    pub pid: Pid,
    pub node_id: NodeId,
    pub timestamp_ms: u64,
    pub priority: i64,
}

impl GlobalEntry {
    /// The tuple that orders two conflicting entries for the same name:
    /// `(priority desc, timestamp asc, node_id lex asc)`. The strictly
    /// smaller tuple wins, so priority is negated to make "higher priority"
    /// sort first.
    fn tie_break_key(&self) -> (i64, u64, &str) {
        (-self.priority, self.timestamp_ms, self.node_id.as_str())
    }

    /// True if `self` wins over `other` under the conflict-resolution
    /// ordering. Panics-free even when the tuples are equal (the caller's
    /// own entry wins ties, since equal tuples can only arise from two
    /// entries for the same name on the same node).
    pub fn wins_over(&self, other: &GlobalEntry) -> bool {
        self.tie_break_key() <= other.tie_break_key()
    }
}
