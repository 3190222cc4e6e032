//! # otp-global-registry: cluster-wide name table
//!
//! Each node keeps a local view of a cluster-wide name table. Writes fan
//! out as `registry_event` frames to every up peer; a newly `up` peer is
//! brought up to date with a full `registry_sync`. Conflicts — two nodes
//! registering the same name — resolve deterministically by the tuple
//! `(priority desc, timestamp asc, node_id lex asc)`: the strictly smaller
//! tuple wins, and a `conflict_resolved` event fires locally on every
//! involved node. `lookup`/`whereis` are purely local reads; accuracy is
//! eventual, not linearizable, across a partition.

mod entry;
mod events;
mod registry;

pub use entry::GlobalEntry;
pub use events::{GlobalRegistryEvent, GlobalRegistryEventBus};
pub use registry::GlobalRegistry;
