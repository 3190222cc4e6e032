//! Process and node identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Canonical node identifier, `name@host:port`.
///
/// Equality is by normalized string; the local node's id is immutable for
/// the lifetime of the runtime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(SmolStr);

impl NodeId {
    /// Builds the canonical `name@host:port` form.
    pub fn new(name: &str, host: &str, port: u16) -> Self {
        Self(SmolStr::new(format!("{name}@{host}:{port}")))
    }

    /// Wraps an already-canonical string without validation.
    ///
    /// Used when parsing a node id received off the wire; the wire layer is
    /// responsible for rejecting malformed ids before they reach here.
    pub fn from_canonical(s: impl Into<SmolStr>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A process reference: `{ id, node_id }`.
///
/// Cheap to clone (an `Arc`-backed string id under the hood via
/// [`SmolStr`]). Holding a `Pid` does not keep its process alive — a `Pid`
/// may become stale the moment its owning process terminates. Sends to a
/// stale local `Pid` are dropped; sends to a stale remote `Pid` fail with
/// [`crate::Error::RemoteProcessGone`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pid {
    id: SmolStr,
    node_id: NodeId,
}

impl Pid {
    pub fn new(id: impl Into<SmolStr>, node_id: NodeId) -> Self {
        Self {
            id: id.into(),
            node_id,
        }
    }

    /// Generates a fresh locally-unique id on the given node.
    pub fn generate(node_id: NodeId) -> Self {
        Self {
            id: SmolStr::new(nanoid::nanoid!(21)),
            node_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// True when this reference names a process owned by `local`.
    pub fn is_local(&self, local: &NodeId) -> bool {
        &self.node_id == local
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_canonical_form() {
        let n = NodeId::new("db", "10.0.0.1", 4040);
        assert_eq!(n.as_str(), "db@10.0.0.1:4040");
    }

    #[test]
    fn pid_generate_is_unique() {
        let node = NodeId::new("a", "localhost", 1);
        let a = Pid::generate(node.clone());
        let b = Pid::generate(node.clone());
        assert_ne!(a, b);
        assert!(a.is_local(&node));
    }

    #[test]
    fn pid_display_roundtrip_shape() {
        let node = NodeId::new("a", "localhost", 1);
        let pid = Pid::new("proc-1", node);
        assert_eq!(pid.to_string(), "proc-1@a@localhost:1");
    }
}
