// Event request construction
//
// Builds live requests for a breakpoint in one session. Creation never fails
// loudly: a disconnected target yields `None` silently, anything else is
// reported to the diagnostic sink and also yields `None`.

use crate::breakpoint::Breakpoint;
use crate::config::CoreConfig;
use crate::diagnostics::DiagnosticSink;
use crate::error::SessionError;
use crate::request::LiveRequest;
use crate::session::{ClassFilter, Session, SessionResult};
use crate::types::{Location, ReferenceType, RequestKind, StepSpec};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub struct EventRequestFactory {
    config: CoreConfig,
    sink: Arc<dyn DiagnosticSink>,
}

impl fmt::Debug for EventRequestFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRequestFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EventRequestFactory {
    pub fn new(config: CoreConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn DiagnosticSink> {
        &self.sink
    }

    /// Method entry (or location) request when `entry`, method exit request
    /// otherwise, scoped by `class_filter`
    pub fn create_method_request(
        &self,
        session: &dyn Session,
        breakpoint: &Breakpoint,
        class_filter: &ClassFilter,
        entry: bool,
    ) -> Option<Arc<LiveRequest>> {
        let result = self.try_create_method_request(session, breakpoint, class_filter, entry);
        self.finish(session, "create method request", result)
    }

    /// One location request per executable location of the breakpoint's line
    pub fn create_line_requests(
        &self,
        session: &dyn Session,
        breakpoint: &Breakpoint,
        class: &ReferenceType,
    ) -> Vec<Arc<LiveRequest>> {
        let Some(line) = breakpoint.line_number() else {
            return Vec::new();
        };
        let locations = match session.line_locations(class, line) {
            Ok(locations) => locations,
            Err(e) => {
                self.session_failure("look up line locations", session, &e);
                return Vec::new();
            }
        };
        if locations.is_empty() {
            debug!("No executable code at {}:{}", class.name, line);
        }
        locations
            .into_iter()
            .filter_map(|location| {
                let result = self.try_create_location_request(session, breakpoint, location);
                self.finish(session, "create line breakpoint request", result)
            })
            .collect()
    }

    pub fn create_step_request(&self, session: &dyn Session, step: StepSpec) -> Option<Arc<LiveRequest>> {
        let result = session.create_step_request(&step).and_then(|id| {
            let request = Arc::new(LiveRequest::step(id, session.target_id(), step));
            let configured = request
                .add_thread_filter(session, step.thread)
                .and_then(|_| session.set_suspend_policy(id, self.config.suspend_policy))
                .and_then(|_| request.set_enabled(session, true));
            match configured {
                Ok(()) => Ok(request),
                Err(e) => {
                    request.delete(session).ok();
                    Err(e)
                }
            }
        });
        self.finish(session, "create step request", result)
    }

    /// Rebuild an invalidated request. Location requests are recreated at the
    /// same location; method requests use the breakpoint's current type name
    /// as a class pattern. A disconnected target keeps the old request.
    pub fn recreate_request(
        &self,
        old: &Arc<LiveRequest>,
        session: &dyn Session,
        breakpoint: &Breakpoint,
    ) -> Option<Arc<LiveRequest>> {
        let result = match old.kind() {
            RequestKind::Breakpoint => {
                let location = old.location()?;
                self.try_create_location_request(session, breakpoint, location)
            }
            RequestKind::MethodEntry | RequestKind::MethodExit => {
                let pattern = breakpoint.type_name()?;
                let entry = old.kind() == RequestKind::MethodEntry;
                self.try_create_method_request(session, breakpoint, &ClassFilter::Pattern(pattern), entry)
            }
            RequestKind::Step => return None,
        };
        match result {
            Ok(request) => {
                debug!("Recreated request id={} as id={}", old.id(), request.id());
                Some(request)
            }
            Err(e) if e.is_disconnected() && !session.is_available() => Some(Arc::clone(old)),
            Err(e) => {
                self.sink.report("recreate request", &e);
                None
            }
        }
    }

    fn try_create_method_request(
        &self,
        session: &dyn Session,
        breakpoint: &Breakpoint,
        class_filter: &ClassFilter,
        entry: bool,
    ) -> SessionResult<Arc<LiveRequest>> {
        let target = session.target_id();
        if entry {
            if let Some(location) = self.entry_location(session, breakpoint, class_filter)? {
                // cheaper on the VM than a method entry request
                return self.try_create_location_request(session, breakpoint, location);
            }
        }
        let request = if entry {
            LiveRequest::new(session.create_method_entry_request()?, RequestKind::MethodEntry, target)
        } else {
            LiveRequest::new(session.create_method_exit_request()?, RequestKind::MethodExit, target)
        };
        self.configure(session, breakpoint, Arc::new(request), Some(class_filter))
    }

    fn try_create_location_request(
        &self,
        session: &dyn Session,
        breakpoint: &Breakpoint,
        location: Location,
    ) -> SessionResult<Arc<LiveRequest>> {
        let id = session.create_breakpoint_request(&location)?;
        let request = LiveRequest::at_location(id, session.target_id(), location);
        self.configure(session, breakpoint, Arc::new(request), None)
    }

    /// Location of the breakpoint's method when an exact, non-native match
    /// exists in the filtered class
    fn entry_location(
        &self,
        session: &dyn Session,
        breakpoint: &Breakpoint,
        class_filter: &ClassFilter,
    ) -> SessionResult<Option<Location>> {
        if !self.config.prefer_location_requests || breakpoint.is_native_only() {
            return Ok(None);
        }
        let ClassFilter::Type(class) = class_filter else {
            return Ok(None);
        };
        let (Some(name), Some(signature)) = (breakpoint.method_name(), breakpoint.method_signature())
        else {
            return Ok(None);
        };
        if !class.is_class() || breakpoint.type_name().as_deref() != Some(class.name.as_str()) {
            return Ok(None);
        }
        let method = session.concrete_method(class, name, signature)?;
        Ok(method.filter(|m| !m.is_native).and_then(|m| m.location))
    }

    fn configure(
        &self,
        session: &dyn Session,
        breakpoint: &Breakpoint,
        request: Arc<LiveRequest>,
        class_filter: Option<&ClassFilter>,
    ) -> SessionResult<Arc<LiveRequest>> {
        match self.apply_configuration(session, breakpoint, &request, class_filter) {
            Ok(()) => {
                debug!(
                    "Created {:?} request id={} for breakpoint {} in target {}",
                    request.kind(),
                    request.id(),
                    breakpoint.id(),
                    request.target()
                );
                Ok(request)
            }
            Err(e) => {
                // half-configured requests must not stay behind on the VM
                request.delete(session).ok();
                Err(e)
            }
        }
    }

    fn apply_configuration(
        &self,
        session: &dyn Session,
        breakpoint: &Breakpoint,
        request: &LiveRequest,
        class_filter: Option<&ClassFilter>,
    ) -> SessionResult<()> {
        if let Some(filter) = class_filter {
            request.add_class_filter(session, filter.clone())?;
        }
        session.set_suspend_policy(request.id(), self.config.suspend_policy)?;
        if let Some(hit_count) = breakpoint.configured_hit_count() {
            match request.kind() {
                RequestKind::Breakpoint => request.add_count_filter(session, hit_count)?,
                // the VM has no hit counts for these, so the count is simulated
                RequestKind::MethodEntry | RequestKind::MethodExit => {
                    request.put_hit_count(Some(hit_count))
                }
                RequestKind::Step => {}
            }
        }
        request.set_enabled(session, breakpoint.request_enabled(request.kind()))
    }

    fn finish<T>(&self, session: &dyn Session, context: &str, result: SessionResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.session_failure(context, session, &e);
                None
            }
        }
    }

    /// Disconnects from a target that is gone are expected and stay quiet
    pub(crate) fn session_failure(&self, context: &str, session: &dyn Session, err: &SessionError) {
        if err.is_disconnected() && !session.is_available() {
            debug!("{}: target {} disconnected", context, session.target_id());
        } else {
            self.sink.report(context, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::MemoryAttributeStore;
    use crate::breakpoint::BreakpointSpec;
    use crate::diagnostics::RecordingSink;
    use crate::memory::MemorySession;
    use crate::types::{StepDepth, StepSize, SuspendPolicy};

    struct Fixture {
        factory: Arc<EventRequestFactory>,
        sink: Arc<RecordingSink>,
        session: MemorySession,
    }

    fn fixture(config: CoreConfig) -> Fixture {
        let sink = Arc::new(RecordingSink::new());
        let factory = Arc::new(EventRequestFactory::new(config, sink.clone()));
        let session = MemorySession::new(1);
        session.define_class("com.foo.Bar", &[("run", "()V", false), ("peek", "()I", true)]);
        Fixture {
            factory,
            sink,
            session,
        }
    }

    fn breakpoint(fixture: &Fixture, spec: BreakpointSpec) -> Breakpoint {
        Breakpoint::create(1, spec, Arc::new(MemoryAttributeStore::new()), fixture.factory.clone())
            .unwrap()
    }

    fn bar(fixture: &Fixture) -> ClassFilter {
        ClassFilter::Type(fixture.session.classes_by_name("com.foo.Bar").unwrap().remove(0))
    }

    #[test]
    fn test_exact_entry_prefers_location_request() {
        let f = fixture(CoreConfig::default());
        let bp = breakpoint(&f, BreakpointSpec::method("com.foo.Bar", Some("run"), Some("()V")));

        let request = f.factory.create_method_request(&f.session, &bp, &bar(&f), true).unwrap();

        assert_eq!(request.kind(), RequestKind::Breakpoint);
        let run = f.session.method("com.foo.Bar", "run", "()V").unwrap();
        assert_eq!(request.location(), run.location);
        assert!(request.is_enabled());
        assert_eq!(
            f.session.request(request.id()).unwrap().suspend_policy,
            SuspendPolicy::EventThread
        );
    }

    #[test]
    fn test_pattern_filter_uses_method_entry() {
        let f = fixture(CoreConfig::default());
        let bp = breakpoint(&f, BreakpointSpec::method("com.foo.*", Some("run"), Some("()V")));
        let filter = ClassFilter::Pattern("com.foo.*".into());

        let request = f.factory.create_method_request(&f.session, &bp, &filter, true).unwrap();

        assert_eq!(request.kind(), RequestKind::MethodEntry);
        assert_eq!(request.class_filter(), Some(filter.clone()));
        assert_eq!(f.session.request(request.id()).unwrap().class_filters, vec![filter]);
    }

    #[test]
    fn test_native_method_falls_back_to_method_entry() {
        let f = fixture(CoreConfig::default());
        let bp = breakpoint(&f, BreakpointSpec::method("com.foo.Bar", Some("peek"), Some("()I")));

        let request = f.factory.create_method_request(&f.session, &bp, &bar(&f), true).unwrap();
        assert_eq!(request.kind(), RequestKind::MethodEntry);
    }

    #[test]
    fn test_location_preference_can_be_disabled() {
        let f = fixture(CoreConfig {
            prefer_location_requests: false,
            ..CoreConfig::default()
        });
        let bp = breakpoint(&f, BreakpointSpec::method("com.foo.Bar", Some("run"), Some("()V")));

        let request = f.factory.create_method_request(&f.session, &bp, &bar(&f), true).unwrap();
        assert_eq!(request.kind(), RequestKind::MethodEntry);
    }

    #[test]
    fn test_exit_is_always_method_exit() {
        let f = fixture(CoreConfig::default());
        let bp = breakpoint(
            &f,
            BreakpointSpec::method("com.foo.Bar", Some("run"), Some("()V")).with_exit(true),
        );

        let request = f.factory.create_method_request(&f.session, &bp, &bar(&f), false).unwrap();
        assert_eq!(request.kind(), RequestKind::MethodExit);
        assert!(request.is_enabled());
    }

    #[test]
    fn test_hit_count_is_simulated_on_method_requests() {
        let f = fixture(CoreConfig::default());
        let bp = breakpoint(&f, BreakpointSpec::method("com.foo.*", None, None).with_hit_count(3));
        let filter = ClassFilter::Pattern("com.foo.*".into());

        let request = f.factory.create_method_request(&f.session, &bp, &filter, true).unwrap();

        assert_eq!(request.simulated_hit_count(), Some(3));
        assert_eq!(f.session.request(request.id()).unwrap().count, None);
    }

    #[test]
    fn test_hit_count_is_native_on_location_requests() {
        let f = fixture(CoreConfig::default());
        let bp = breakpoint(
            &f,
            BreakpointSpec::method("com.foo.Bar", Some("run"), Some("()V")).with_hit_count(2),
        );

        let request = f.factory.create_method_request(&f.session, &bp, &bar(&f), true).unwrap();

        assert_eq!(request.count_filter(), Some(2));
        assert_eq!(request.simulated_hit_count(), None);
        assert_eq!(f.session.request(request.id()).unwrap().count, Some(2));
    }

    #[test]
    fn test_disconnected_target_is_silent() {
        let f = fixture(CoreConfig::default());
        let bp = breakpoint(&f, BreakpointSpec::method("com.foo.*", None, None));
        f.session.disconnect();

        let filter = ClassFilter::Pattern("com.foo.*".into());
        assert!(f.factory.create_method_request(&f.session, &bp, &filter, true).is_none());
        assert!(f.sink.is_empty());
    }

    #[test]
    fn test_unexpected_failure_is_reported() {
        let f = fixture(CoreConfig::default());
        let bp = breakpoint(&f, BreakpointSpec::method("com.foo.*", None, None));
        f.session.fail_with(Some("INTERNAL"));

        let filter = ClassFilter::Pattern("com.foo.*".into());
        assert!(f.factory.create_method_request(&f.session, &bp, &filter, false).is_none());
        assert_eq!(f.sink.reports(), vec!["create method request: INTERNAL".to_string()]);
    }

    #[test]
    fn test_recreate_uses_current_type_name() {
        let f = fixture(CoreConfig::default());
        let bp = breakpoint(&f, BreakpointSpec::method("com.foo.*", None, None).with_exit(true));
        let filter = ClassFilter::Pattern("com.foo.*".into());
        let old = f.factory.create_method_request(&f.session, &bp, &filter, false).unwrap();

        let new = f.factory.recreate_request(&old, &f.session, &bp).unwrap();

        assert_ne!(new.id(), old.id());
        assert_eq!(new.kind(), RequestKind::MethodExit);
        assert_eq!(new.class_filter(), Some(filter));
    }

    #[test]
    fn test_recreate_on_dead_target_keeps_old_request() {
        let f = fixture(CoreConfig::default());
        let bp = breakpoint(&f, BreakpointSpec::method("com.foo.*", None, None));
        let filter = ClassFilter::Pattern("com.foo.*".into());
        let old = f.factory.create_method_request(&f.session, &bp, &filter, true).unwrap();

        f.session.disconnect();
        let kept = f.factory.recreate_request(&old, &f.session, &bp).unwrap();
        assert!(Arc::ptr_eq(&kept, &old));
    }

    #[test]
    fn test_line_requests_per_location() {
        let f = fixture(CoreConfig::default());
        f.session.add_line("com.foo.Bar", "run", 12, 4).unwrap();
        f.session.add_line("com.foo.Bar", "run", 12, 9).unwrap();
        let bp = breakpoint(&f, BreakpointSpec::line("com.foo.Bar", 12));
        let class = f.session.classes_by_name("com.foo.Bar").unwrap().remove(0);

        let requests = f.factory.create_line_requests(&f.session, &bp, &class);

        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.kind() == RequestKind::Breakpoint && r.is_enabled()));
    }

    #[test]
    fn test_step_request() {
        let f = fixture(CoreConfig::default());
        let step = StepSpec {
            thread: 7,
            size: StepSize::Line,
            depth: StepDepth::Over,
        };

        let request = f.factory.create_step_request(&f.session, step).unwrap();

        assert_eq!(request.kind(), RequestKind::Step);
        assert_eq!(request.step_spec(), Some(step));
        let installed = f.session.request(request.id()).unwrap();
        assert!(installed.enabled);
        assert_eq!(installed.thread_filters, vec![7]);
    }
}
