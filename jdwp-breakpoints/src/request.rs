// Live event requests
//
// Client-side handle for a request registered with a session. The enabled
// bit mirrors the VM; expired and the simulated hit count are local
// properties, like JDI request properties.

use crate::session::{ClassFilter, Session, SessionResult};
use crate::types::{Location, RequestId, RequestKind, StepSpec, TargetId, ThreadId};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default, Clone)]
struct RequestState {
    enabled: bool,
    expired: bool,
    deleted: bool,
    hit_count: Option<u32>,
    configured_hit_count: Option<u32>,
    count_filter: Option<u32>,
    class_filter: Option<ClassFilter>,
    thread_filters: Vec<ThreadId>,
}

/// Result of counting one event against a simulated hit count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitCount {
    /// No hit count configured on the request
    Unlimited,
    /// Counted, more hits needed
    Remaining(u32),
    /// This event exhausted the count
    Reached,
    /// The count was already exhausted; nothing was decremented
    Exhausted,
}

#[derive(Debug)]
pub struct LiveRequest {
    id: RequestId,
    kind: RequestKind,
    target: TargetId,
    location: Option<Location>,
    step: Option<StepSpec>,
    state: Mutex<RequestState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestSnapshot {
    pub id: RequestId,
    pub kind: RequestKind,
    pub enabled: bool,
    pub expired: bool,
    pub hit_count: Option<u32>,
    pub count_filter: Option<u32>,
    pub class_filter: Option<ClassFilter>,
}

impl LiveRequest {
    pub(crate) fn new(id: RequestId, kind: RequestKind, target: TargetId) -> Self {
        Self {
            id,
            kind,
            target,
            location: None,
            step: None,
            state: Mutex::new(RequestState::default()),
        }
    }

    pub(crate) fn at_location(id: RequestId, target: TargetId, location: Location) -> Self {
        Self {
            location: Some(location),
            ..Self::new(id, RequestKind::Breakpoint, target)
        }
    }

    pub(crate) fn step(id: RequestId, target: TargetId, step: StepSpec) -> Self {
        Self {
            step: Some(step),
            ..Self::new(id, RequestKind::Step, target)
        }
    }

    fn state(&self) -> MutexGuard<'_, RequestState> {
        // A poisoned request only ever held plain data
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    /// Location of a location breakpoint request
    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn step_spec(&self) -> Option<StepSpec> {
        self.step
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn is_expired(&self) -> bool {
        self.state().expired
    }

    pub fn is_deleted(&self) -> bool {
        self.state().deleted
    }

    pub fn simulated_hit_count(&self) -> Option<u32> {
        self.state().hit_count
    }

    pub fn count_filter(&self) -> Option<u32> {
        self.state().count_filter
    }

    pub fn class_filter(&self) -> Option<ClassFilter> {
        self.state().class_filter.clone()
    }

    pub fn thread_filters(&self) -> Vec<ThreadId> {
        self.state().thread_filters.clone()
    }

    /// Change the enabled state on the VM. Expired and deleted requests are
    /// left alone.
    pub fn set_enabled(&self, session: &dyn Session, enabled: bool) -> SessionResult<()> {
        let mut state = self.state();
        if state.expired || state.deleted || state.enabled == enabled {
            return Ok(());
        }
        session.set_request_enabled(self.id, enabled)?;
        state.enabled = enabled;
        debug!("Request id={} enabled={}", self.id, enabled);
        Ok(())
    }

    pub fn add_class_filter(&self, session: &dyn Session, filter: ClassFilter) -> SessionResult<()> {
        session.add_class_filter(self.id, &filter)?;
        self.state().class_filter = Some(filter);
        Ok(())
    }

    pub fn add_thread_filter(&self, session: &dyn Session, thread: ThreadId) -> SessionResult<()> {
        session.add_thread_filter(self.id, thread)?;
        self.state().thread_filters.push(thread);
        Ok(())
    }

    pub fn add_count_filter(&self, session: &dyn Session, count: u32) -> SessionResult<()> {
        session.add_count_filter(self.id, count)?;
        self.state().count_filter = Some(count);
        Ok(())
    }

    /// Set the simulated hit count, remembering the value it was armed from
    pub fn put_hit_count(&self, hit_count: Option<u32>) {
        let mut state = self.state();
        state.hit_count = hit_count;
        state.configured_hit_count = hit_count;
    }

    /// Whether the simulated count was armed from a value other than `hit_count`
    pub(crate) fn hit_count_changed(&self, hit_count: Option<u32>) -> bool {
        self.state().configured_hit_count != hit_count
    }

    pub(crate) fn is_hit_count_exhausted(&self) -> bool {
        self.state().hit_count == Some(0)
    }

    /// Count one matching event against the simulated hit count
    pub fn count_hit(&self) -> HitCount {
        let mut state = self.state();
        match state.hit_count {
            None => HitCount::Unlimited,
            Some(0) => HitCount::Exhausted,
            Some(n) => {
                state.hit_count = Some(n - 1);
                if n == 1 {
                    HitCount::Reached
                } else {
                    HitCount::Remaining(n - 1)
                }
            }
        }
    }

    /// Expired is sticky: the VM has retired a count-filtered request
    pub fn mark_expired(&self) {
        let mut state = self.state();
        state.expired = true;
        state.enabled = false;
    }

    /// Remove the request from the VM. An expired location request was
    /// already removed by the VM, so only local state changes.
    pub fn delete(&self, session: &dyn Session) -> SessionResult<()> {
        let mut state = self.state();
        if state.deleted {
            return Ok(());
        }
        if !(state.expired && self.kind == RequestKind::Breakpoint) {
            session.delete_request(self.id)?;
        }
        state.deleted = true;
        state.enabled = false;
        debug!("Deleted request id={} kind={:?}", self.id, self.kind);
        Ok(())
    }

    pub fn snapshot(&self) -> RequestSnapshot {
        let state = self.state();
        RequestSnapshot {
            id: self.id,
            kind: self.kind,
            enabled: state.enabled,
            expired: state.expired,
            hit_count: state.hit_count,
            count_filter: state.count_filter,
            class_filter: state.class_filter.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySession;

    #[test]
    fn test_count_hit_never_goes_below_zero() {
        let request = LiveRequest::new(1, RequestKind::MethodEntry, 1);
        request.put_hit_count(Some(2));

        assert_eq!(request.count_hit(), HitCount::Remaining(1));
        assert_eq!(request.count_hit(), HitCount::Reached);
        assert_eq!(request.count_hit(), HitCount::Exhausted);
        assert_eq!(request.simulated_hit_count(), Some(0));
        assert!(request.is_hit_count_exhausted());
        assert!(!request.hit_count_changed(Some(2)));
        assert!(request.hit_count_changed(Some(5)));
    }

    #[test]
    fn test_unlimited_without_hit_count() {
        let request = LiveRequest::new(1, RequestKind::MethodExit, 1);
        assert_eq!(request.count_hit(), HitCount::Unlimited);
    }

    #[test]
    fn test_expired_request_ignores_enable() {
        let session = MemorySession::new(1);
        let id = session.create_method_entry_request().unwrap();
        let request = LiveRequest::new(id, RequestKind::MethodEntry, 1);

        request.set_enabled(&session, true).unwrap();
        assert!(session.request(id).unwrap().enabled);

        request.mark_expired();
        request.set_enabled(&session, true).unwrap();
        assert!(!request.is_enabled());
        assert!(session.request(id).unwrap().enabled);
    }

    #[test]
    fn test_expired_method_request_is_still_deleted() {
        let session = MemorySession::new(1);
        let id = session.create_method_entry_request().unwrap();
        let request = LiveRequest::new(id, RequestKind::MethodEntry, 1);

        request.mark_expired();
        request.delete(&session).unwrap();

        assert!(request.is_deleted());
        assert!(session.request(id).is_none());
    }

    #[test]
    fn test_expired_location_request_is_deleted_locally() {
        let session = MemorySession::new(1);
        let class = session.define_class("com.foo.Bar", &[("run", "()V", false)]);
        let location = session.method(&class.name, "run", "()V").unwrap().location.unwrap();
        let id = session.create_breakpoint_request(&location).unwrap();
        let request = LiveRequest::at_location(id, 1, location);

        request.mark_expired();
        request.delete(&session).unwrap();

        assert!(request.is_deleted());
        // the VM side retires count-filtered requests on its own
        assert!(session.request(id).is_some());
    }

    #[test]
    fn test_disconnected_enable_leaves_state() {
        let session = MemorySession::new(1);
        let id = session.create_method_exit_request().unwrap();
        let request = LiveRequest::new(id, RequestKind::MethodExit, 1);

        session.disconnect();
        let err = request.set_enabled(&session, true).unwrap_err();
        assert!(err.is_disconnected());
        assert!(!request.is_enabled());
    }
}
