//! `proptest` strategies for this workspace's identifiers, gated behind
//! the `test-support` feature so consumers that only want
//! [`crate::TestRuntime`] don't pay for pulling in `proptest`.

use otp_types::{NodeId, Pid};
use proptest::prelude::*;

/// Short lowercase-alphanumeric segment, used for both node names and
/// process ids — real names in this runtime are short operator-chosen
/// strings, not arbitrary Unicode.
fn short_ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}".prop_map(|s| s)
}

/// Arbitrary `NodeId`s over a small alphabet of names/hosts and the full
/// `u16` port range, so generated cases exercise both "same node" and
/// "different node" `Pid` comparisons without an unbounded search space.
pub fn node_id() -> impl Strategy<Value = NodeId> {
    (short_ident(), short_ident(), any::<u16>())
        .prop_map(|(name, host, port)| NodeId::new(&name, &host, port))
}

/// Arbitrary `Pid`s: a short id on an arbitrary node.
pub fn pid() -> impl Strategy<Value = Pid> {
    (short_ident(), node_id()).prop_map(|(id, node)| Pid::new(id, node))
}

/// Arbitrary `Pid`s all sharing one fixed node — for properties that only
/// make sense among local processes (e.g. registry uniqueness).
pub fn pid_on(node: NodeId) -> impl Strategy<Value = Pid> {
    short_ident().prop_map(move |id| Pid::new(id, node.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_pids_roundtrip_through_display(p in pid()) {
            let shown = p.to_string();
            prop_assert!(shown.contains(p.id()));
        }

        #[test]
        fn pid_on_shares_the_fixed_node(p in pid_on(NodeId::new("fixed", "localhost", 1))) {
            prop_assert_eq!(p.node_id(), &NodeId::new("fixed", "localhost", 1));
        }
    }
}
