// Event dispatcher
//
// Registry of breakpoints and the entry point for VM events. Events are routed
// by (target, request id) to the owning breakpoint, binding and request; the
// route table is a cache rebuilt from the bindings on a miss.

use crate::attributes::AttributeStore;
use crate::binding::{LastEventType, TargetBinding};
use crate::breakpoint::{Breakpoint, BreakpointKind, BreakpointListener, BreakpointSpec};
use crate::config::CoreConfig;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::{BreakpointError, BreakpointResult};
use crate::factory::EventRequestFactory;
use crate::request::{HitCount, LiveRequest};
use crate::session::{Session, SuspendController};
use crate::types::{BreakpointId, EventKind, ReferenceType, RequestId, StepSpec, TargetId, VmEvent};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// What to do with the event thread after handling an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDisposition {
    Resume,
    Suspend,
}

type Route = (TargetId, RequestId);
type Routed = (Arc<Breakpoint>, Arc<TargetBinding>, Arc<LiveRequest>);
type StepEntry = (Arc<LiveRequest>, Arc<dyn Session>);

pub struct EventDispatcher {
    factory: Arc<EventRequestFactory>,
    listeners: RwLock<Vec<Arc<dyn BreakpointListener>>>,
    breakpoints: RwLock<HashMap<BreakpointId, Arc<Breakpoint>>>,
    routes: RwLock<HashMap<Route, BreakpointId>>,
    steps: Mutex<HashMap<Route, StepEntry>>,
    next_id: AtomicU64,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(CoreConfig::default(), Arc::new(TracingSink))
    }
}

// Fans notifications out to every registered listener
struct Listeners(Vec<Arc<dyn BreakpointListener>>);

impl BreakpointListener for Listeners {
    fn adding(&self, breakpoint: &Breakpoint, target: TargetId) {
        self.0.iter().for_each(|l| l.adding(breakpoint, target));
    }

    fn installed(&self, breakpoint: &Breakpoint, target: TargetId) {
        self.0.iter().for_each(|l| l.installed(breakpoint, target));
    }

    fn removed(&self, breakpoint: &Breakpoint, target: TargetId) {
        self.0.iter().for_each(|l| l.removed(breakpoint, target));
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn suspend(thread: &dyn SuspendController) -> EventDisposition {
    if thread.suspend() {
        EventDisposition::Suspend
    } else {
        warn!("Failed to suspend thread {:#x}", thread.thread_id());
        EventDisposition::Resume
    }
}

impl EventDispatcher {
    pub fn new(config: CoreConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            factory: Arc::new(EventRequestFactory::new(config, sink)),
            listeners: RwLock::new(Vec::new()),
            breakpoints: RwLock::new(HashMap::new()),
            routes: RwLock::new(HashMap::new()),
            steps: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        self.factory.config()
    }

    pub fn factory(&self) -> &Arc<EventRequestFactory> {
        &self.factory
    }

    pub fn add_listener(&self, listener: Arc<dyn BreakpointListener>) {
        write(&self.listeners).push(listener);
    }

    fn listeners(&self) -> Listeners {
        Listeners(read(&self.listeners).clone())
    }

    pub fn create_breakpoint(
        &self,
        spec: BreakpointSpec,
        store: Arc<dyn AttributeStore>,
    ) -> BreakpointResult<Arc<Breakpoint>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let breakpoint = Arc::new(Breakpoint::create(id, spec, store, Arc::clone(&self.factory))?);
        write(&self.breakpoints).insert(id, Arc::clone(&breakpoint));
        info!("Registered breakpoint {}", id);
        Ok(breakpoint)
    }

    /// Register a breakpoint persisted by an earlier run
    pub fn restore_breakpoint(
        &self,
        kind: BreakpointKind,
        store: Arc<dyn AttributeStore>,
    ) -> BreakpointResult<Arc<Breakpoint>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let reset = self.config().reset_at_startup;
        let breakpoint = Arc::new(Breakpoint::restore(id, kind, store, Arc::clone(&self.factory), reset)?);
        write(&self.breakpoints).insert(id, Arc::clone(&breakpoint));
        info!("Restored breakpoint {}", id);
        Ok(breakpoint)
    }

    pub fn breakpoint(&self, id: BreakpointId) -> Option<Arc<Breakpoint>> {
        read(&self.breakpoints).get(&id).cloned()
    }

    pub fn breakpoints(&self) -> Vec<Arc<Breakpoint>> {
        let mut breakpoints: Vec<_> = read(&self.breakpoints).values().cloned().collect();
        breakpoints.sort_by_key(|b| b.id());
        breakpoints
    }

    fn require(&self, id: BreakpointId) -> BreakpointResult<Arc<Breakpoint>> {
        self.breakpoint(id).ok_or(BreakpointError::UnknownBreakpoint(id))
    }

    /// Unregister a breakpoint, uninstalling it from every target first
    pub fn remove_breakpoint(&self, id: BreakpointId) -> BreakpointResult<Arc<Breakpoint>> {
        let breakpoint = write(&self.breakpoints)
            .remove(&id)
            .ok_or(BreakpointError::UnknownBreakpoint(id))?;
        let listeners = self.listeners();
        for target in breakpoint.targets() {
            breakpoint.remove_from_target(target, &listeners);
        }
        write(&self.routes).retain(|_, owner| *owner != id);
        info!("Removed breakpoint {}", id);
        Ok(breakpoint)
    }

    pub fn add_to_target(
        &self,
        id: BreakpointId,
        session: Arc<dyn Session>,
    ) -> BreakpointResult<Arc<TargetBinding>> {
        let breakpoint = self.require(id)?;
        let binding = breakpoint.add_to_target(session, &self.listeners())?;
        self.cache_routes(id, &binding);
        Ok(binding)
    }

    pub fn remove_from_target(&self, id: BreakpointId, target: TargetId) -> BreakpointResult<bool> {
        let breakpoint = self.require(id)?;
        let removed = breakpoint.remove_from_target(target, &self.listeners());
        write(&self.routes).retain(|(t, _), owner| !(*t == target && *owner == id));
        Ok(removed)
    }

    /// Drop everything bound to a target that went away
    pub fn target_disconnected(&self, target: TargetId) {
        let listeners = self.listeners();
        for breakpoint in self.breakpoints() {
            breakpoint.remove_from_target(target, &listeners);
        }
        write(&self.routes).retain(|(t, _), _| *t != target);
        self.steps_map().retain(|(t, _), _| *t != target);
        info!("Target {} disconnected", target);
    }

    /// Install pending breakpoints for a newly loaded class. Returns the
    /// number of requests created.
    pub fn class_prepared(&self, target: TargetId, class: &ReferenceType) -> usize {
        let listeners = self.listeners();
        let mut installed = 0;
        for breakpoint in self.breakpoints() {
            let created = breakpoint.class_prepared(target, class, &listeners);
            if created > 0 {
                if let Some(binding) = breakpoint.binding(target) {
                    self.cache_routes(breakpoint.id(), &binding);
                }
                installed += created;
            }
        }
        installed
    }

    /// Rebuild a request the target invalidated. Returns the id of the
    /// replacement.
    pub fn request_invalidated(&self, target: TargetId, request_id: RequestId) -> Option<RequestId> {
        let (breakpoint, _, _) = self.route(target, request_id)?;
        let new = breakpoint.recreate_request(target, request_id);
        let mut routes = write(&self.routes);
        routes.remove(&(target, request_id));
        let new = new?;
        routes.insert((target, new.id()), breakpoint.id());
        Some(new.id())
    }

    fn steps_map(&self) -> MutexGuard<'_, HashMap<Route, StepEntry>> {
        self.steps.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// One-shot step request; the first step event deletes it
    pub fn create_step(&self, session: Arc<dyn Session>, step: StepSpec) -> Option<RequestId> {
        let request = self.factory.create_step_request(session.as_ref(), step)?;
        let id = request.id();
        self.steps_map().insert((session.target_id(), id), (request, session));
        Some(id)
    }

    fn cache_routes(&self, id: BreakpointId, binding: &TargetBinding) {
        let mut routes = write(&self.routes);
        for request in binding.requests() {
            routes.insert((binding.target(), request.id()), id);
        }
    }

    fn lookup(&self, id: BreakpointId, target: TargetId, request_id: RequestId) -> Option<Routed> {
        let breakpoint = self.breakpoint(id)?;
        let binding = breakpoint.binding(target)?;
        let request = binding.request(request_id)?;
        Some((breakpoint, binding, request))
    }

    fn route(&self, target: TargetId, request_id: RequestId) -> Option<Routed> {
        let cached = read(&self.routes).get(&(target, request_id)).copied();
        if let Some(found) = cached.and_then(|id| self.lookup(id, target, request_id)) {
            return Some(found);
        }
        // requests recreated inside a breakpoint are not in the cache yet
        let found = self
            .breakpoints()
            .into_iter()
            .find_map(|b| self.lookup(b.id(), target, request_id))?;
        write(&self.routes).insert((target, request_id), found.0.id());
        Some(found)
    }

    /// Decide whether the event thread stays suspended
    pub fn handle_event(
        &self,
        event: &VmEvent,
        target: TargetId,
        thread: &dyn SuspendController,
    ) -> EventDisposition {
        if event.kind == EventKind::Step {
            return self.handle_step(event, target, thread);
        }
        let Some((breakpoint, binding, request)) = self.route(target, event.request_id) else {
            debug!("No owner for request id={} in target {}", event.request_id, target);
            return EventDisposition::Resume;
        };
        debug!(
            "{:?} event for breakpoint {} request id={} in {}.{}",
            event.kind,
            breakpoint.id(),
            request.id(),
            event.method.declaring_type,
            event.method.name
        );

        binding.record_event(match event.kind {
            EventKind::MethodExit => LastEventType::Exit,
            _ => LastEventType::Entry,
        });

        if !breakpoint.accepts(&event.method) {
            return EventDisposition::Resume;
        }

        if request.count_filter().is_some() {
            // the VM only reports the final hit, then retires the request
            request.mark_expired();
            let disposition = suspend(thread);
            self.expire(&breakpoint);
            return disposition;
        }

        match request.count_hit() {
            HitCount::Unlimited => suspend(thread),
            HitCount::Remaining(left) => {
                debug!("Breakpoint {} needs {} more hits", breakpoint.id(), left);
                EventDisposition::Resume
            }
            HitCount::Exhausted => EventDisposition::Resume,
            HitCount::Reached => {
                let disposition = suspend(thread);
                self.expire(&breakpoint);
                disposition
            }
        }
    }

    fn expire(&self, breakpoint: &Breakpoint) {
        if let Err(e) = breakpoint.expire() {
            self.factory.sink().report("expire breakpoint", &e);
        }
    }

    fn handle_step(&self, event: &VmEvent, target: TargetId, thread: &dyn SuspendController) -> EventDisposition {
        let Some((request, session)) = self.steps_map().remove(&(target, event.request_id)) else {
            debug!("No step request id={} in target {}", event.request_id, target);
            return EventDisposition::Resume;
        };
        if let Err(e) = request.delete(session.as_ref()) {
            self.factory.session_failure("delete step request", session.as_ref(), &e);
        }
        suspend(thread)
    }

    /// Handle every event of one composite event; suspends when any event
    /// asks for it
    pub fn handle_event_set(
        &self,
        events: &[VmEvent],
        target: TargetId,
        thread: &dyn SuspendController,
    ) -> EventDisposition {
        events
            .iter()
            .map(|event| self.handle_event(event, target, thread))
            .fold(EventDisposition::Resume, |acc, d| {
                if d == EventDisposition::Suspend {
                    d
                } else {
                    acc
                }
            })
    }
}
