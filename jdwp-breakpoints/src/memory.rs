// In-memory debug target
//
// Emulates the VM side of event requests closely enough to drive the core
// without a JVM: class/thread/count filters, enabled bits and request expiry.
// Used by the tests and by the scenario driver.

use crate::commands::type_tags;
use crate::error::SessionError;
use crate::pattern::TypeNamePattern;
use crate::session::{ClassFilter, Session, SessionResult, SuspendController};
use crate::types::{
    EventKind, Location, MethodInfo, ReferenceType, RequestId, RequestKind, StepSpec,
    SuspendPolicy, TargetId, ThreadId, VmEvent,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// A request as the emulated VM sees it
#[derive(Debug, Clone)]
pub struct MemoryRequest {
    pub kind: RequestKind,
    pub enabled: bool,
    pub expired: bool,
    pub location: Option<Location>,
    pub step: Option<StepSpec>,
    pub class_filters: Vec<ClassFilter>,
    pub thread_filters: Vec<ThreadId>,
    pub count: Option<u32>,
    pub suspend_policy: SuspendPolicy,
}

impl MemoryRequest {
    fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            enabled: false,
            expired: false,
            location: None,
            step: None,
            class_filters: Vec::new(),
            thread_filters: Vec::new(),
            count: None,
            suspend_policy: SuspendPolicy::All,
        }
    }

    fn accepts(&self, thread: ThreadId, declaring_type: &str) -> bool {
        if !self.enabled || self.expired {
            return false;
        }
        if !self.thread_filters.is_empty() && !self.thread_filters.contains(&thread) {
            return false;
        }
        self.class_filters.iter().all(|filter| match filter {
            ClassFilter::Pattern(p) => TypeNamePattern::new(p).matches(declaring_type),
            ClassFilter::Type(t) => t.name == declaring_type,
        })
    }

    /// Apply the count filter; true when the event should be reported
    fn fire(&mut self) -> bool {
        match self.count {
            None => true,
            Some(n) if n > 1 => {
                self.count = Some(n - 1);
                false
            }
            Some(_) => {
                self.count = Some(0);
                self.expired = true;
                true
            }
        }
    }
}

#[derive(Debug)]
struct MemoryClass {
    reference: ReferenceType,
    methods: Vec<MethodInfo>,
    lines: BTreeMap<u32, Vec<Location>>,
}

#[derive(Debug)]
struct MemoryVm {
    next_request: RequestId,
    next_id: u64,
    requests: BTreeMap<RequestId, MemoryRequest>,
    classes: Vec<MemoryClass>,
}

#[derive(Debug)]
pub struct MemorySession {
    target: TargetId,
    connected: AtomicBool,
    failure: Mutex<Option<String>>,
    vm: Mutex<MemoryVm>,
}

impl MemorySession {
    pub fn new(target: TargetId) -> Self {
        Self {
            target,
            connected: AtomicBool::new(true),
            failure: Mutex::new(None),
            vm: Mutex::new(MemoryVm {
                next_request: 1,
                next_id: 0x100,
                requests: BTreeMap::new(),
                classes: Vec::new(),
            }),
        }
    }

    fn vm(&self) -> MutexGuard<'_, MemoryVm> {
        self.vm.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> SessionResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SessionError::Disconnected);
        }
        let failure = self.failure.lock().unwrap_or_else(|e| e.into_inner());
        match failure.as_ref() {
            Some(message) => Err(SessionError::Failed(message.clone())),
            None => Ok(()),
        }
    }

    /// Simulate VM death
    pub fn disconnect(&self) {
        debug!("Target {} disconnected", self.target);
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Make every subsequent request operation fail with `message`
    pub fn fail_with(&self, message: Option<&str>) {
        let mut failure = self.failure.lock().unwrap_or_else(|e| e.into_inner());
        *failure = message.map(str::to_string);
    }

    /// Load a class with `(name, signature, native)` methods
    pub fn define_class(&self, name: &str, methods: &[(&str, &str, bool)]) -> ReferenceType {
        let mut vm = self.vm();
        vm.next_id += 1;
        let reference = ReferenceType::class(vm.next_id, name);

        let mut infos = Vec::with_capacity(methods.len());
        for (method_name, signature, is_native) in methods {
            vm.next_id += 1;
            let location = (!is_native).then(|| Location {
                type_tag: type_tags::CLASS,
                class_id: reference.id,
                method_id: vm.next_id,
                index: 0,
            });
            infos.push(MethodInfo {
                id: vm.next_id,
                name: method_name.to_string(),
                signature: signature.to_string(),
                declaring_type: name.to_string(),
                is_native: *is_native,
                location,
            });
        }

        vm.classes.push(MemoryClass {
            reference: reference.clone(),
            methods: infos,
            lines: BTreeMap::new(),
        });
        reference
    }

    /// Map a source line to a bytecode index in one of the class's methods
    pub fn add_line(&self, class: &str, method: &str, line: u32, index: u64) -> Option<Location> {
        let mut vm = self.vm();
        let class = vm.classes.iter_mut().find(|c| c.reference.name == class)?;
        let method = class.methods.iter().find(|m| m.name == method)?;
        let location = Location {
            type_tag: type_tags::CLASS,
            class_id: class.reference.id,
            method_id: method.id,
            index,
        };
        class.lines.entry(line).or_default().push(location);
        Some(location)
    }

    pub fn method(&self, class: &str, name: &str, signature: &str) -> Option<MethodInfo> {
        self.vm()
            .classes
            .iter()
            .filter(|c| c.reference.name == class)
            .flat_map(|c| c.methods.iter())
            .find(|m| m.name == name && m.signature == signature)
            .cloned()
    }

    pub fn request(&self, id: RequestId) -> Option<MemoryRequest> {
        self.vm().requests.get(&id).cloned()
    }

    pub fn requests(&self) -> Vec<(RequestId, MemoryRequest)> {
        self.vm()
            .requests
            .iter()
            .map(|(id, r)| (*id, r.clone()))
            .collect()
    }

    /// Thread `thread` enters `method`: method entry events plus location
    /// breakpoints at the method's first location
    pub fn invoke(&self, thread: ThreadId, method: &MethodInfo) -> Vec<VmEvent> {
        let location = method.location.unwrap_or(Location {
            type_tag: type_tags::CLASS,
            class_id: 0,
            method_id: method.id,
            index: 0,
        });
        let mut vm = self.vm();
        let mut events = Vec::new();
        for (id, request) in vm.requests.iter_mut() {
            let kind = match request.kind {
                RequestKind::MethodEntry => EventKind::MethodEntry,
                RequestKind::Breakpoint if request.location == method.location => {
                    EventKind::Breakpoint
                }
                _ => continue,
            };
            if request.accepts(thread, &method.declaring_type) && request.fire() {
                events.push(event(kind, *id, thread, location, method));
            }
        }
        events
    }

    /// Thread `thread` returns from `method`
    pub fn return_from(&self, thread: ThreadId, method: &MethodInfo) -> Vec<VmEvent> {
        let location = method.location.unwrap_or(Location {
            type_tag: type_tags::CLASS,
            class_id: 0,
            method_id: method.id,
            index: 0,
        });
        let mut vm = self.vm();
        let mut events = Vec::new();
        for (id, request) in vm.requests.iter_mut() {
            if request.kind == RequestKind::MethodExit
                && request.accepts(thread, &method.declaring_type)
                && request.fire()
            {
                events.push(event(EventKind::MethodExit, *id, thread, location, method));
            }
        }
        events
    }

    /// Thread `thread` reaches `location` inside `method`
    pub fn reach(&self, thread: ThreadId, method: &MethodInfo, location: Location) -> Vec<VmEvent> {
        let mut vm = self.vm();
        let mut events = Vec::new();
        for (id, request) in vm.requests.iter_mut() {
            let kind = match request.kind {
                RequestKind::Breakpoint if request.location == Some(location) => {
                    EventKind::Breakpoint
                }
                RequestKind::Step => EventKind::Step,
                _ => continue,
            };
            if request.accepts(thread, &method.declaring_type) && request.fire() {
                events.push(event(kind, *id, thread, location, method));
            }
        }
        events
    }

    fn create(&self, request: MemoryRequest) -> SessionResult<RequestId> {
        self.check()?;
        let mut vm = self.vm();
        let id = vm.next_request;
        vm.next_request += 1;
        debug!("Target {} created {:?} request id={}", self.target, request.kind, id);
        vm.requests.insert(id, request);
        Ok(id)
    }

    fn update<F>(&self, id: RequestId, f: F) -> SessionResult<()>
    where
        F: FnOnce(&mut MemoryRequest),
    {
        self.check()?;
        let mut vm = self.vm();
        let request = vm
            .requests
            .get_mut(&id)
            .ok_or_else(|| SessionError::Failed(format!("INVALID_EVENT_REQUEST {}", id)))?;
        f(request);
        Ok(())
    }
}

fn event(
    kind: EventKind,
    request_id: RequestId,
    thread: ThreadId,
    location: Location,
    method: &MethodInfo,
) -> VmEvent {
    VmEvent {
        kind,
        request_id,
        thread,
        location,
        method: method.clone(),
    }
}

impl Session for MemorySession {
    fn target_id(&self) -> TargetId {
        self.target
    }

    fn is_available(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn create_breakpoint_request(&self, location: &Location) -> SessionResult<RequestId> {
        let mut request = MemoryRequest::new(RequestKind::Breakpoint);
        request.location = Some(*location);
        self.create(request)
    }

    fn create_method_entry_request(&self) -> SessionResult<RequestId> {
        self.create(MemoryRequest::new(RequestKind::MethodEntry))
    }

    fn create_method_exit_request(&self) -> SessionResult<RequestId> {
        self.create(MemoryRequest::new(RequestKind::MethodExit))
    }

    fn create_step_request(&self, step: &StepSpec) -> SessionResult<RequestId> {
        let mut request = MemoryRequest::new(RequestKind::Step);
        request.step = Some(*step);
        self.create(request)
    }

    fn add_class_filter(&self, request: RequestId, filter: &ClassFilter) -> SessionResult<()> {
        self.update(request, |r| r.class_filters.push(filter.clone()))
    }

    fn add_thread_filter(&self, request: RequestId, thread: ThreadId) -> SessionResult<()> {
        self.update(request, |r| r.thread_filters.push(thread))
    }

    fn add_count_filter(&self, request: RequestId, count: u32) -> SessionResult<()> {
        self.update(request, |r| r.count = Some(count))
    }

    fn set_suspend_policy(&self, request: RequestId, policy: SuspendPolicy) -> SessionResult<()> {
        self.update(request, |r| r.suspend_policy = policy)
    }

    fn set_request_enabled(&self, request: RequestId, enabled: bool) -> SessionResult<()> {
        self.update(request, |r| r.enabled = enabled)
    }

    fn delete_request(&self, request: RequestId) -> SessionResult<()> {
        self.check()?;
        self.vm().requests.remove(&request);
        Ok(())
    }

    fn classes_by_name(&self, name: &str) -> SessionResult<Vec<ReferenceType>> {
        self.check()?;
        Ok(self
            .vm()
            .classes
            .iter()
            .filter(|c| c.reference.name == name)
            .map(|c| c.reference.clone())
            .collect())
    }

    fn concrete_method(
        &self,
        class: &ReferenceType,
        name: &str,
        signature: &str,
    ) -> SessionResult<Option<MethodInfo>> {
        self.check()?;
        Ok(self
            .vm()
            .classes
            .iter()
            .find(|c| c.reference.id == class.id)
            .and_then(|c| {
                c.methods
                    .iter()
                    .find(|m| m.name == name && m.signature == signature)
                    .cloned()
            }))
    }

    fn line_locations(&self, class: &ReferenceType, line: u32) -> SessionResult<Vec<Location>> {
        self.check()?;
        Ok(self
            .vm()
            .classes
            .iter()
            .find(|c| c.reference.id == class.id)
            .and_then(|c| c.lines.get(&line).cloned())
            .unwrap_or_default())
    }
}

/// Thread double that records suspensions
#[derive(Debug)]
pub struct MemoryThread {
    id: ThreadId,
    suspended: AtomicBool,
    suspend_calls: AtomicU32,
    fail: AtomicBool,
}

impl MemoryThread {
    pub fn new(id: ThreadId) -> Self {
        Self {
            id,
            suspended: AtomicBool::new(false),
            suspend_calls: AtomicU32::new(0),
            fail: AtomicBool::new(false),
        }
    }

    /// A thread whose suspension always fails
    pub fn failing(id: ThreadId) -> Self {
        let thread = Self::new(id);
        thread.fail.store(true, Ordering::SeqCst);
        thread
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    pub fn suspend_calls(&self) -> u32 {
        self.suspend_calls.load(Ordering::SeqCst)
    }

    pub fn resume(&self) {
        self.suspended.store(false, Ordering::SeqCst);
    }
}

impl SuspendController for MemoryThread {
    fn thread_id(&self) -> ThreadId {
        self.id
    }

    fn suspend(&self) -> bool {
        self.suspend_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return false;
        }
        self.suspended.store(true, Ordering::SeqCst);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_request_respects_class_pattern() {
        let session = MemorySession::new(1);
        session.define_class("com.foo.Bar", &[("run", "()V", false)]);
        session.define_class("org.Other", &[("run", "()V", false)]);

        let id = session.create_method_entry_request().unwrap();
        session
            .add_class_filter(id, &ClassFilter::Pattern("com.foo.*".into()))
            .unwrap();

        let bar = session.method("com.foo.Bar", "run", "()V").unwrap();
        let other = session.method("org.Other", "run", "()V").unwrap();

        // disabled requests report nothing
        assert!(session.invoke(7, &bar).is_empty());

        session.set_request_enabled(id, true).unwrap();
        assert_eq!(session.invoke(7, &bar).len(), 1);
        assert!(session.invoke(7, &other).is_empty());
    }

    #[test]
    fn test_count_filter_reports_once_then_expires() {
        let session = MemorySession::new(1);
        session.define_class("com.foo.Bar", &[("run", "()V", false)]);
        let run = session.method("com.foo.Bar", "run", "()V").unwrap();

        let id = session.create_breakpoint_request(&run.location.unwrap()).unwrap();
        session.add_count_filter(id, 2).unwrap();
        session.set_request_enabled(id, true).unwrap();

        assert!(session.invoke(7, &run).is_empty());
        let events = session.invoke(7, &run);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Breakpoint);
        assert!(session.invoke(7, &run).is_empty());
        assert!(session.request(id).unwrap().expired);
    }

    #[test]
    fn test_thread_filter() {
        let session = MemorySession::new(1);
        session.define_class("com.foo.Bar", &[("run", "()V", false)]);
        let run = session.method("com.foo.Bar", "run", "()V").unwrap();

        let id = session.create_method_exit_request().unwrap();
        session.add_thread_filter(id, 3).unwrap();
        session.set_request_enabled(id, true).unwrap();

        assert!(session.return_from(4, &run).is_empty());
        assert_eq!(session.return_from(3, &run).len(), 1);
    }

    #[test]
    fn test_native_methods_have_no_location() {
        let session = MemorySession::new(1);
        session.define_class("java.lang.Object", &[("hashCode", "()I", true)]);
        let hash = session.method("java.lang.Object", "hashCode", "()I").unwrap();
        assert!(hash.is_native);
        assert!(hash.location.is_none());
    }

    #[test]
    fn test_disconnected_session_rejects_operations() {
        let session = MemorySession::new(1);
        session.disconnect();
        assert!(!session.is_available());
        assert_eq!(
            session.create_method_entry_request().unwrap_err(),
            SessionError::Disconnected
        );
    }

    #[test]
    fn test_failing_thread() {
        let thread = MemoryThread::failing(9);
        assert!(!thread.suspend());
        assert!(!thread.is_suspended());
        assert_eq!(thread.suspend_calls(), 1);
    }
}
