//! Scoped resources held by mounted tenant servers.
//!
//! Every mount acquires its resources into a [`ResourceStack`]; the host
//! keeps one stack per tenant in a [`ResourceLedger`] in acquisition order.
//! Stacks release their resources last-in first-out, the ledger releases
//! tenants last-in first-out, and dropping either releases synchronously so
//! nothing outlives a cancelled mount.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::mcp::SessionStore;

#[async_trait]
pub trait ScopedResource: Send {
    fn name(&self) -> &str;

    /// Release the resource, waiting for whatever shutdown it needs.
    async fn release(self: Box<Self>);
}

pub struct ResourceStack {
    label: String,
    entries: Vec<Box<dyn ScopedResource>>,
}

impl ResourceStack {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn push(&mut self, resource: Box<dyn ScopedResource>) {
        debug!(scope = %self.label, resource = resource.name(), "acquired");
        self.entries.push(resource);
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every resource, newest first.
    pub async fn close(mut self) {
        let mut entries = std::mem::take(&mut self.entries);
        while let Some(resource) = entries.pop() {
            debug!(scope = %self.label, resource = resource.name(), "releasing");
            resource.release().await;
        }
    }
}

impl Drop for ResourceStack {
    fn drop(&mut self) {
        while let Some(resource) = self.entries.pop() {
            drop(resource);
        }
    }
}

/// Resource stacks of every mounted tenant, oldest first.
#[derive(Default)]
pub struct ResourceLedger {
    groups: Mutex<Vec<(String, ResourceStack)>>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, ResourceStack)>> {
        self.groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, tenant_id: &str, stack: ResourceStack) {
        self.lock().push((tenant_id.to_string(), stack));
    }

    pub fn remove(&self, tenant_id: &str) -> Option<ResourceStack> {
        let mut groups = self.lock();
        let index = groups.iter().position(|(tenant, _)| tenant == tenant_id)?;
        Some(groups.remove(index).1)
    }

    /// Take every stack out, newest first.
    pub fn drain_newest_first(&self) -> Vec<(String, ResourceStack)> {
        let mut groups = std::mem::take(&mut *self.lock());
        groups.reverse();
        groups
    }

    pub fn tenants(&self) -> Vec<String> {
        self.lock().iter().map(|(tenant, _)| tenant.clone()).collect()
    }
}

impl Drop for ResourceLedger {
    fn drop(&mut self) {
        let groups = self
            .groups
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while let Some(group) = groups.pop() {
            drop(group);
        }
    }
}

const GATE_PERMITS: u32 = 1 << 16;

/// Tracks in-flight tool calls of one tenant server.
#[derive(Debug, Clone)]
pub struct InvocationGate {
    permits: Arc<Semaphore>,
}

impl InvocationGate {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(GATE_PERMITS as usize)),
        }
    }

    /// Admit one call. `None` once the gate has closed.
    pub async fn enter(&self) -> Option<OwnedSemaphorePermit> {
        self.permits.clone().acquire_owned().await.ok()
    }

    pub fn in_flight(&self) -> usize {
        if self.permits.is_closed() {
            return 0;
        }
        (GATE_PERMITS as usize).saturating_sub(self.permits.available_permits())
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Wait up to `timeout` for in-flight calls to finish, then refuse new
    /// ones. Returns false when the wait timed out.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, self.permits.acquire_many(GATE_PERMITS))
            .await
            .map(|acquired| acquired.is_ok())
            .unwrap_or(false);
        self.permits.close();
        drained
    }

    pub fn close(&self) {
        self.permits.close();
    }
}

impl Default for InvocationGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped handle closing an [`InvocationGate`] on release.
pub struct GateResource {
    gate: InvocationGate,
    drain_timeout: Duration,
}

impl GateResource {
    pub fn new(gate: InvocationGate, drain_timeout: Duration) -> Self {
        Self {
            gate,
            drain_timeout,
        }
    }
}

#[async_trait]
impl ScopedResource for GateResource {
    fn name(&self) -> &str {
        "invocation-gate"
    }

    async fn release(self: Box<Self>) {
        let in_flight = self.gate.in_flight();
        if !self.gate.drain(self.drain_timeout).await {
            warn!(in_flight, "tool calls still running after drain timeout");
        }
    }
}

impl Drop for GateResource {
    fn drop(&mut self) {
        self.gate.close();
    }
}

/// Background task evicting idle MCP sessions.
pub struct SessionReaper {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SessionReaper {
    /// Spawn the reaper on the current runtime.
    pub fn spawn(sessions: Arc<SessionStore>, idle_ttl: Duration, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let evicted = sessions.evict_idle(idle_ttl);
                        if evicted > 0 {
                            debug!(evicted, "evicted idle sessions");
                        }
                    }
                }
            }
            sessions.clear();
        });
        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

#[async_trait]
impl ScopedResource for SessionReaper {
    fn name(&self) -> &str {
        "session-reaper"
    }

    async fn release(self: Box<Self>) {
        let mut reaper = self;
        if let Some(tx) = reaper.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = reaper.handle.take() {
            if let Err(e) = handle.await {
                warn!("session reaper ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SessionReaper {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Recorded {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recorded {
        fn boxed(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn ScopedResource> {
            Box::new(Recorded {
                name: name.to_string(),
                log: log.clone(),
            })
        }
    }

    #[async_trait]
    impl ScopedResource for Recorded {
        fn name(&self) -> &str {
            &self.name
        }

        async fn release(self: Box<Self>) {
            self.log.lock().unwrap().push(format!("release {}", self.name));
        }
    }

    impl Drop for Recorded {
        fn drop(&mut self) {
            self.log.lock().unwrap().push(format!("drop {}", self.name));
        }
    }

    #[tokio::test]
    async fn test_stack_closes_newest_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = ResourceStack::new("acme");
        stack.push(Recorded::boxed("a", &log));
        stack.push(Recorded::boxed("b", &log));
        stack.close().await;
        assert_eq!(
            *log.lock().unwrap(),
            vec!["release b", "drop b", "release a", "drop a"]
        );
    }

    #[test]
    fn test_dropped_stack_releases_newest_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = ResourceStack::new("acme");
        stack.push(Recorded::boxed("a", &log));
        stack.push(Recorded::boxed("b", &log));
        drop(stack);
        assert_eq!(*log.lock().unwrap(), vec!["drop b", "drop a"]);
    }

    #[tokio::test]
    async fn test_ledger_drains_tenants_in_reverse_acquisition_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ledger = ResourceLedger::new();
        for tenant in ["first", "second", "third"] {
            let mut stack = ResourceStack::new(tenant);
            stack.push(Recorded::boxed(tenant, &log));
            ledger.push(tenant, stack);
        }
        let removed = ledger.remove("second").expect("second mounted");
        removed.close().await;

        for (_, stack) in ledger.drain_newest_first() {
            stack.close().await;
        }
        let released: Vec<String> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.starts_with("release"))
            .cloned()
            .collect();
        assert_eq!(
            released,
            vec!["release second", "release third", "release first"]
        );
        assert!(ledger.tenants().is_empty());
    }

    #[tokio::test]
    async fn test_gate_drains_and_refuses_new_calls() {
        let gate = InvocationGate::new();
        let permit = gate.enter().await.expect("open gate admits");
        assert_eq!(gate.in_flight(), 1);

        let draining = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.drain(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        drop(permit);
        assert!(draining.await.unwrap());
        assert!(gate.is_closed());
        assert!(gate.enter().await.is_none());
    }

    #[tokio::test]
    async fn test_session_reaper_stops_on_release() {
        let sessions = Arc::new(SessionStore::new());
        sessions.open();
        let reaper = SessionReaper::spawn(
            sessions.clone(),
            Duration::from_secs(60),
            Duration::from_millis(10),
        );
        Box::new(reaper).release().await;
        assert!(sessions.is_empty());
    }
}
