//! Unique/duplicate keyed name tables.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use otp_process::{LifecycleBus, LifecycleEvent};
use otp_types::{Error, Pid, Result};

use crate::entry::Entry;
use crate::pattern;

/// Whether a name admits one entry or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keys {
    Unique,
    Duplicate,
}

struct Inner<R> {
    keys: Keys,
    entries: Mutex<HashMap<String, Vec<Entry<R>>>>,
}

/// A name registry. `R` is the value type stored under each name (most
/// commonly a `ServerRef<B>`); clone it cheaply, since every lookup hands
/// one back by value.
pub struct Registry<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for Registry<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl<R: Clone + Send + Sync + 'static> Registry<R> {
    pub fn new(keys: Keys) -> Self {
        Self {
            inner: Arc::new(Inner {
                keys,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn keys(&self) -> Keys {
        self.inner.keys
    }

    /// Registers `value` under `name`. In [`Keys::Unique`] mode fails with
    /// [`Error::AlreadyRegistered`] if the name is taken; in
    /// [`Keys::Duplicate`] mode always succeeds and appends.
    pub fn register(
        &self,
        name: impl Into<String>,
        pid: Pid,
        value: R,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let name = name.into();
        let mut entries = self.inner.entries.lock();
        let bucket = entries.entry(name.clone()).or_default();
        if self.inner.keys == Keys::Unique && !bucket.is_empty() {
            return Err(Error::AlreadyRegistered(name));
        }
        bucket.push(Entry {
            name,
            pid,
            value,
            metadata,
            registered_at_ms: now_ms(),
        });
        Ok(())
    }

    /// Unique-mode unregister: removes the single entry for `name`, if any.
    pub fn unregister(&self, name: &str) {
        self.inner.entries.lock().remove(name);
    }

    /// Duplicate-mode unregister: removes only the entry owned by `pid`.
    pub fn unregister_pid(&self, name: &str, pid: &Pid) {
        let mut entries = self.inner.entries.lock();
        if let Some(bucket) = entries.get_mut(name) {
            bucket.retain(|e| &e.pid != pid);
            if bucket.is_empty() {
                entries.remove(name);
            }
        }
    }

    /// Unique-mode lookup. Errors with [`Error::NotRegistered`] if absent.
    pub fn lookup(&self, name: &str) -> Result<R> {
        self.whereis(name)
            .ok_or_else(|| Error::NotRegistered(name.to_string()))
    }

    /// Unique-mode lookup returning `None` instead of erroring.
    pub fn whereis(&self, name: &str) -> Option<R> {
        self.inner
            .entries
            .lock()
            .get(name)
            .and_then(|bucket| bucket.first())
            .map(|e| e.value.clone())
    }

    /// Duplicate-mode lookup: every entry currently registered under `name`.
    pub fn lookup_all(&self, name: &str) -> Vec<R> {
        self.inner
            .entries
            .lock()
            .get(name)
            .map(|bucket| bucket.iter().map(|e| e.value.clone()).collect())
            .unwrap_or_default()
    }

    /// Scans every entry, returning those whose name matches `pattern` and
    /// (if given) satisfies `predicate`.
    pub fn find_matching(
        &self,
        glob: &str,
        predicate: Option<&dyn Fn(&Entry<R>) -> bool>,
    ) -> Vec<Entry<R>> {
        self.inner
            .entries
            .lock()
            .values()
            .flatten()
            .filter(|e| pattern::matches(glob, &e.name))
            .filter(|e| predicate.map_or(true, |p| p(e)))
            .cloned()
            .collect()
    }

    /// Delivers `f` to every entry registered under `name` (duplicate mode),
    /// awaiting each in turn — the default "cast to each" fan-out strategy.
    /// Callers wanting a different fan-out (random, weighted) can use
    /// [`Registry::lookup_all`] directly instead.
    pub async fn dispatch<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(R) -> Fut,
        Fut: Future<Output = ()>,
    {
        for value in self.lookup_all(name) {
            f(value).await;
        }
    }

    /// Removes every entry owned by `pid`, regardless of name. Intended to
    /// be driven by a subscription to the process runtime's terminated
    /// lifecycle event.
    pub fn cleanup_pid(&self, pid: &Pid) {
        let mut entries = self.inner.entries.lock();
        entries.retain(|_, bucket| {
            bucket.retain(|e| &e.pid != pid);
            !bucket.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.inner
            .entries
            .lock()
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns a background task that subscribes to `bus` and removes
    /// registrations as soon as their owning process terminates. The Mutex
    /// guarding entries serializes this against concurrent `register`
    /// calls, so a re-registration attempt either sees the cleanup already
    /// applied or blocks until it is.
    pub fn spawn_auto_cleanup(&self, bus: &LifecycleBus)
    where
        R: 'static,
    {
        let registry = self.clone();
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(LifecycleEvent::Terminated(pid, _)) | Ok(LifecycleEvent::Crashed(pid, _)) => {
                        registry.cleanup_pid(&pid);
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otp_types::NodeId;

    fn pid() -> Pid {
        Pid::generate(NodeId::new("n", "localhost", 4000))
    }

    #[test]
    fn unique_rejects_second_registration() {
        let registry: Registry<u32> = Registry::new(Keys::Unique);
        registry.register("alice", pid(), 1, None).unwrap();
        let err = registry.register("alice", pid(), 2, None).unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered(_)));
    }

    #[test]
    fn unique_lookup_missing_errors() {
        let registry: Registry<u32> = Registry::new(Keys::Unique);
        assert!(registry.lookup("missing").is_err());
        assert!(registry.whereis("missing").is_none());
    }

    #[test]
    fn duplicate_allows_many_and_lists_all() {
        let registry: Registry<u32> = Registry::new(Keys::Duplicate);
        registry.register("workers", pid(), 1, None).unwrap();
        registry.register("workers", pid(), 2, None).unwrap();
        let mut all = registry.lookup_all("workers");
        all.sort_unstable();
        assert_eq!(all, vec![1, 2]);
    }

    #[test]
    fn cleanup_removes_every_entry_for_a_pid() {
        let registry: Registry<u32> = Registry::new(Keys::Duplicate);
        let p = pid();
        registry.register("a", p.clone(), 1, None).unwrap();
        registry.register("b", p.clone(), 2, None).unwrap();
        registry.register("a", pid(), 3, None).unwrap();
        registry.cleanup_pid(&p);
        assert_eq!(registry.lookup_all("a"), vec![3]);
        assert!(registry.lookup_all("b").is_empty());
    }

    #[test]
    fn pattern_scan_filters_by_predicate() {
        let registry: Registry<u32> = Registry::new(Keys::Duplicate);
        registry.register("worker:1", pid(), 1, None).unwrap();
        registry.register("worker:2", pid(), 2, None).unwrap();
        let even: Vec<_> = registry
            .find_matching("worker:*", Some(&|e: &Entry<u32>| e.value % 2 == 0))
            .into_iter()
            .map(|e| e.value)
            .collect();
        assert_eq!(even, vec![2]);
    }
}
