//! Child specifications.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use otp_types::{Pid, Restart, Result};

type StartFuture = Pin<Box<dyn Future<Output = Result<Pid>> + Send>>;
type StartFn = Arc<dyn Fn() -> StartFuture + Send + Sync>;

/// What kind of process a child is. Supervisors whose own restart
/// intensity is exceeded fail upward exactly like a crashed worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Worker,
    Supervisor,
}

/// One child under supervision. `start` is the thunk the supervisor
/// invokes to (re)spawn the child; it must return the child's resulting
/// [`Pid`] once the child is registered in the shared process table.
#[derive(Clone)]
pub struct ChildSpec {
    pub(crate) id: String,
    pub(crate) restart: Restart,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) kind: ChildKind,
    pub(crate) start: StartFn,
}

impl ChildSpec {
    pub fn new<F, Fut>(
        id: impl Into<String>,
        restart: Restart,
        shutdown_timeout: Duration,
        kind: ChildKind,
        start: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Pid>> + Send + 'static,
    {
        Self {
            id: id.into(),
            restart,
            shutdown_timeout,
            kind,
            start: Arc::new(move || Box::pin(start())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn restart(&self) -> Restart {
        self.restart
    }

    pub fn kind(&self) -> ChildKind {
        self.kind
    }
}
