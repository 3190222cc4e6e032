//! Behavior registry and remote-spawn type erasure.
//!
//! `BehaviorRegistry::register(name, behavior)` pre-registers a behavior
//! on every node.
//!
//! A [`Behavior`](otp_process::Behavior) is generic over its own message
//! and reply types, so a name-keyed registry that spawns one from a wire
//! `spawn_request` needs to erase that generic shape behind serialized
//! bytes. [`TypedFactory`] is the one place that erasure happens; callers
//! register with [`BehaviorRegistry::register`] and never see it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use otp_process::{Behavior, LifecycleBus, ProcessTable};
use otp_types::{NodeId, Pid};

/// A handle to a remotely-spawnable, running process: erased `call`/
/// `cast` entry points operating on `postcard`-encoded bytes.
#[derive(Clone)]
pub struct RemoteProcess {
    pub pid: Pid,
    call: Arc<dyn Fn(Vec<u8>, Duration) -> BoxFuture<'static, Result<Vec<u8>, String>> + Send + Sync>,
    cast: Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Result<(), String>> + Send + Sync>,
}

impl RemoteProcess {
    pub async fn call_bytes(&self, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, String> {
        (self.call)(payload, timeout).await
    }

    pub async fn cast_bytes(&self, payload: Vec<u8>) -> Result<(), String> {
        (self.cast)(payload).await
    }
}

/// A named, registered behavior constructor, able to spawn itself from
/// wire-carried init args and expose itself as a [`RemoteProcess`].
#[async_trait]
trait ErasedFactory: Send + Sync {
    async fn spawn(
        &self,
        init_args: Option<Vec<u8>>,
        node: NodeId,
        table: ProcessTable,
        bus: LifecycleBus,
    ) -> Result<RemoteProcess, String>;
}

struct TypedFactory<F> {
    ctor: F,
}

#[async_trait]
impl<F, B> ErasedFactory for TypedFactory<F>
where
    F: Fn(Option<Vec<u8>>) -> Result<B, String> + Send + Sync + 'static,
    B: Behavior,
    B::Message: DeserializeOwned + Send,
    B::Reply: Serialize + Send,
{
    async fn spawn(
        &self,
        init_args: Option<Vec<u8>>,
        node: NodeId,
        table: ProcessTable,
        bus: LifecycleBus,
    ) -> Result<RemoteProcess, String> {
        let behavior = (self.ctor)(init_args)?;
        let server_ref = otp_process::spawn(behavior, node, table, bus);
        let pid = server_ref.pid().clone();

        let call_ref = server_ref.clone();
        let call: Arc<
            dyn Fn(Vec<u8>, Duration) -> BoxFuture<'static, Result<Vec<u8>, String>> + Send + Sync,
        > = Arc::new(move |bytes, timeout| {
            let call_ref = call_ref.clone();
            Box::pin(async move {
                let msg: B::Message =
                    postcard::from_bytes(&bytes).map_err(|e| e.to_string())?;
                let reply = call_ref.call(msg, timeout).await.map_err(|e| e.to_string())?;
                postcard::to_allocvec(&reply).map_err(|e| e.to_string())
            })
        });

        let cast_ref = server_ref;
        let cast: Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Result<(), String>> + Send + Sync> =
            Arc::new(move |bytes| {
                let cast_ref = cast_ref.clone();
                Box::pin(async move {
                    let msg: B::Message =
                        postcard::from_bytes(&bytes).map_err(|e| e.to_string())?;
                    cast_ref.cast(msg).await.map_err(|e| e.to_string())
                })
            });

        Ok(RemoteProcess { pid, call, cast })
    }
}

/// Name-keyed table of spawnable behaviors, shared by reference across
/// every node that should accept `spawn_request` for these names.
#[derive(Clone, Default)]
pub struct BehaviorRegistry {
    factories: Arc<Mutex<HashMap<String, Arc<dyn ErasedFactory>>>>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` so that `spawn_request{behaviorName: name, ...}`
    /// from any node constructs a `B` via `ctor(init_args)` and spawns it.
    pub fn register<F, B>(&self, name: impl Into<String>, ctor: F)
    where
        F: Fn(Option<Vec<u8>>) -> Result<B, String> + Send + Sync + 'static,
        B: Behavior,
        B::Message: DeserializeOwned + Send,
        B::Reply: Serialize + Send,
    {
        self.factories
            .lock()
            .insert(name.into(), Arc::new(TypedFactory { ctor }));
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.lock().contains_key(name)
    }

    pub(crate) async fn spawn(
        &self,
        name: &str,
        init_args: Option<Vec<u8>>,
        node: NodeId,
        table: ProcessTable,
        bus: LifecycleBus,
    ) -> Option<Result<RemoteProcess, String>> {
        let factory = self.factories.lock().get(name).cloned();
        match factory {
            Some(factory) => Some(factory.spawn(init_args, node, table, bus).await),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use otp_process::{CallOutcome, HandlerResult, LifecycleBus, ProcessTable, ReplyToken};
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    enum EchoMsg {
        Echo(String),
    }

    struct Echo;

    #[async_trait]
    impl Behavior for Echo {
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

    #[tokio::test]
    async fn registered_behavior_spawns_and_answers_calls() {
        let registry = BehaviorRegistry::new();
        registry.register("echo", |_init_args| Ok(Echo));
        assert!(registry.is_registered("echo"));

        let table = ProcessTable::default();
        let bus = LifecycleBus::default();
        let node = NodeId::new("a", "localhost", 1);

        let remote = registry
            .spawn("echo", None, node, table, bus)
            .await
            .unwrap()
            .unwrap();

        let payload = postcard::to_allocvec(&EchoMsg::Echo("hi".to_string())).unwrap();
        let reply_bytes = remote
            .call_bytes(payload, Duration::from_secs(1))
            .await
            .unwrap();
        let reply: String = postcard::from_bytes(&reply_bytes).unwrap();
        assert_eq!(reply, "hi");
    }

    #[tokio::test]
    async fn unknown_behavior_name_is_none() {
        let registry = BehaviorRegistry::new();
        let result = registry
            .spawn(
                "missing",
                None,
                NodeId::new("a", "localhost", 1),
                ProcessTable::default(),
                LifecycleBus::default(),
            )
            .await;
        assert!(result.is_none());
    }
}
