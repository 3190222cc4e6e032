//! The tagged wire message shape.

use serde::{Deserialize, Serialize};

/// Current protocol major version. Peers with a different version are
/// rejected at handshake.
pub const PROTOCOL_VERSION: u16 = 1;

/// A process reference as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRef {
    pub id: String,
    pub node_id: String,
}

/// How a spawned process should be registered, carried in `spawn_request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Registration {
    None,
    Local,
    Global,
}

/// A global registry entry as exchanged in `registry_sync`/`registry_event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntryWire {
    pub name: String,
    pub ref_: WireRef,
    pub node_id: String,
    pub timestamp_ms: u64,
    pub priority: i64,
}

/// One frame's payload, tagged by variant name as `kind`: `{v, kind,
/// corrId?, body}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    Hello {
        node_id: String,
        nonce: Vec<u8>,
        mac: Vec<u8>,
    },
    HelloAck {
        node_id: String,
        nonce: Vec<u8>,
        mac: Vec<u8>,
    },
    Heartbeat,
    CallRequest {
        target: WireRef,
        payload: Vec<u8>,
        timeout_ms: u64,
    },
    CallReply {
        result: Result<Vec<u8>, String>,
    },
    Cast {
        target: WireRef,
        payload: Vec<u8>,
    },
    SpawnRequest {
        behavior_name: String,
        init_args: Option<Vec<u8>>,
        registration: Registration,
        register_as: Option<String>,
        init_timeout_ms: u64,
    },
    SpawnReply {
        result: Result<WireRef, String>,
    },
    RegistrySync {
        entries: Vec<RegistryEntryWire>,
    },
    RegistryEvent {
        op: String,
        entry: RegistryEntryWire,
    },
    NodeGossip {
        peers: Vec<String>,
    },
    Bye,
}

/// A framed message as it travels the wire: protocol version, optional
/// correlation id for request/reply pairing, and the tagged payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub v: u16,
    pub corr_id: Option<String>,
    pub message: Message,
}

impl Frame {
    pub fn new(message: Message) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            corr_id: None,
            message,
        }
    }

    pub fn with_corr_id(message: Message, corr_id: impl Into<String>) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            corr_id: Some(corr_id.into()),
            message,
        }
    }
}
