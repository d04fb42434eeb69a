// Scenario state
//
// In-memory debug targets, their threads and the attribute stores backing
// each breakpoint. The dispatcher owns the breakpoints themselves.

use jdwp_breakpoints::types::{BreakpointId, TargetId, ThreadId};
use jdwp_breakpoints::{CoreConfig, EventDispatcher, MemoryAttributeStore, MemorySession, MemoryThread, TracingSink};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct SessionManager {
    dispatcher: Arc<EventDispatcher>,
    targets: Mutex<HashMap<TargetId, Arc<MemorySession>>>,
    threads: Mutex<HashMap<(TargetId, ThreadId), Arc<MemoryThread>>>,
    stores: Mutex<HashMap<BreakpointId, Arc<MemoryAttributeStore>>>,
}

impl SessionManager {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            dispatcher: Arc::new(EventDispatcher::new(config, Arc::new(TracingSink))),
            targets: Mutex::new(HashMap::new()),
            threads: Mutex::new(HashMap::new()),
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Attach a fresh in-memory target; `None` when the id is taken
    pub async fn attach(&self, target: TargetId) -> Option<Arc<MemorySession>> {
        let mut targets = self.targets.lock().await;
        if targets.contains_key(&target) {
            return None;
        }
        let session = Arc::new(MemorySession::new(target));
        targets.insert(target, Arc::clone(&session));
        Some(session)
    }

    pub async fn detach(&self, target: TargetId) -> Option<Arc<MemorySession>> {
        let session = self.targets.lock().await.remove(&target)?;
        session.disconnect();
        self.dispatcher.target_disconnected(target);
        self.threads.lock().await.retain(|(t, _), _| *t != target);
        Some(session)
    }

    pub async fn target(&self, target: TargetId) -> Option<Arc<MemorySession>> {
        self.targets.lock().await.get(&target).cloned()
    }

    /// Thread handle, created on first use
    pub async fn thread(&self, target: TargetId, thread: ThreadId) -> Arc<MemoryThread> {
        let mut threads = self.threads.lock().await;
        Arc::clone(
            threads
                .entry((target, thread))
                .or_insert_with(|| Arc::new(MemoryThread::new(thread))),
        )
    }

    pub async fn keep_store(&self, id: BreakpointId, store: Arc<MemoryAttributeStore>) {
        self.stores.lock().await.insert(id, store);
    }

    pub async fn store(&self, id: BreakpointId) -> Option<Arc<MemoryAttributeStore>> {
        self.stores.lock().await.get(&id).cloned()
    }

    pub async fn drop_store(&self, id: BreakpointId) {
        self.stores.lock().await.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attach_is_unique_per_target() {
        let manager = SessionManager::new(CoreConfig::default());
        assert!(manager.attach(1).await.is_some());
        assert!(manager.attach(1).await.is_none());
        assert!(manager.target(1).await.is_some());
    }

    #[tokio::test]
    async fn test_detach_disconnects() {
        let manager = SessionManager::new(CoreConfig::default());
        manager.attach(2).await.unwrap();
        let thread = manager.thread(2, 7).await;
        assert!(Arc::ptr_eq(&thread, &manager.thread(2, 7).await));

        let session = manager.detach(2).await.unwrap();
        assert!(!jdwp_breakpoints::Session::is_available(session.as_ref()));
        assert!(manager.target(2).await.is_none());
        assert!(manager.detach(2).await.is_none());
    }
}
