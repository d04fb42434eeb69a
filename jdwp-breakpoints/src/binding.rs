// Breakpoint/target association
//
// One binding per (breakpoint, target). Owns the live requests installed in
// that target and the reason the breakpoint last suspended it.

use crate::request::{LiveRequest, RequestSnapshot};
use crate::session::Session;
use crate::types::{RequestId, TargetId};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LastEventType {
    Entry,
    Exit,
}

#[derive(Debug, Default)]
struct BindingState {
    requests: Vec<Arc<LiveRequest>>,
    last_event: Option<LastEventType>,
}

pub struct TargetBinding {
    target: TargetId,
    session: Arc<dyn Session>,
    state: Mutex<BindingState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BindingSnapshot {
    pub target: TargetId,
    pub last_event: Option<LastEventType>,
    pub requests: Vec<RequestSnapshot>,
}

impl fmt::Debug for TargetBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetBinding")
            .field("target", &self.target)
            .field("state", &self.state)
            .finish()
    }
}

impl TargetBinding {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self {
            target: session.target_id(),
            session,
            state: Mutex::new(BindingState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, BindingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn requests(&self) -> Vec<Arc<LiveRequest>> {
        self.state().requests.clone()
    }

    pub fn request(&self, id: RequestId) -> Option<Arc<LiveRequest>> {
        self.state().requests.iter().find(|r| r.id() == id).cloned()
    }

    pub fn has_requests(&self) -> bool {
        !self.state().requests.is_empty()
    }

    pub(crate) fn register(&self, request: Arc<LiveRequest>) {
        self.state().requests.push(request);
    }

    /// Swap `old` for `new`, returning whether `old` was registered
    pub(crate) fn replace(&self, old: RequestId, new: Arc<LiveRequest>) -> bool {
        let mut state = self.state();
        match state.requests.iter().position(|r| r.id() == old) {
            Some(index) => {
                state.requests[index] = new;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&self, id: RequestId) -> Option<Arc<LiveRequest>> {
        let mut state = self.state();
        let index = state.requests.iter().position(|r| r.id() == id)?;
        Some(state.requests.remove(index))
    }

    pub(crate) fn take_requests(&self) -> Vec<Arc<LiveRequest>> {
        std::mem::take(&mut self.state().requests)
    }

    pub(crate) fn record_event(&self, event: LastEventType) {
        self.state().last_event = Some(event);
    }

    pub fn last_event(&self) -> Option<LastEventType> {
        self.state().last_event
    }

    pub(crate) fn clear_last_event(&self) {
        self.state().last_event = None;
    }

    pub fn snapshot(&self) -> BindingSnapshot {
        let state = self.state();
        BindingSnapshot {
            target: self.target,
            last_event: state.last_event,
            requests: state.requests.iter().map(|r| r.snapshot()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySession;
    use crate::types::RequestKind;

    fn binding() -> TargetBinding {
        TargetBinding::new(Arc::new(MemorySession::new(4)))
    }

    #[test]
    fn test_last_event_lifecycle() {
        let binding = binding();
        assert_eq!(binding.target(), 4);
        assert_eq!(binding.last_event(), None);

        binding.record_event(LastEventType::Exit);
        assert_eq!(binding.last_event(), Some(LastEventType::Exit));

        binding.clear_last_event();
        assert_eq!(binding.last_event(), None);
    }

    #[test]
    fn test_replace_and_take() {
        let binding = binding();
        binding.register(Arc::new(LiveRequest::new(1, RequestKind::MethodEntry, 4)));
        binding.register(Arc::new(LiveRequest::new(2, RequestKind::MethodExit, 4)));

        assert!(binding.replace(1, Arc::new(LiveRequest::new(3, RequestKind::MethodEntry, 4))));
        assert!(!binding.replace(9, Arc::new(LiveRequest::new(4, RequestKind::MethodEntry, 4))));
        assert!(binding.request(3).is_some());
        assert!(binding.request(1).is_none());
        assert_eq!(binding.remove(2).map(|r| r.id()), Some(2));
        assert!(binding.remove(2).is_none());
        binding.register(Arc::new(LiveRequest::new(5, RequestKind::MethodExit, 4)));

        let taken = binding.take_requests();
        assert_eq!(taken.len(), 2);
        assert!(!binding.has_requests());
    }
}
