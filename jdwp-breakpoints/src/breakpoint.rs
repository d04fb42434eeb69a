// Breakpoint definitions
//
// A breakpoint is a bag of persisted attributes plus one binding per debug
// target it is installed in. Method and line breakpoints share the state
// machine and differ only in how requests are created and which flags they
// support.

use crate::attributes::{keys, AttributeStore, AttributeValue};
use crate::binding::{BindingSnapshot, LastEventType, TargetBinding};
use crate::error::{BreakpointError, BreakpointResult, PersistenceError};
use crate::factory::EventRequestFactory;
use crate::pattern::TypeNamePattern;
use crate::request::LiveRequest;
use crate::session::{ClassFilter, Session};
use crate::types::{BreakpointId, MethodInfo, ReferenceType, RequestId, RequestKind, TargetId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakpointKind {
    Method,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub supports_condition: bool,
    pub supports_entry_exit: bool,
    pub supports_hit_count: bool,
}

impl BreakpointKind {
    pub fn capabilities(self) -> Capabilities {
        match self {
            BreakpointKind::Method => Capabilities {
                supports_condition: false,
                supports_entry_exit: true,
                supports_hit_count: true,
            },
            BreakpointKind::Line => Capabilities {
                supports_condition: true,
                supports_entry_exit: false,
                supports_hit_count: true,
            },
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// User input for a new breakpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointSpec {
    pub kind: BreakpointKind,
    /// Type name, or a pattern with a leading and/or trailing `*`
    pub type_name: String,
    #[serde(default)]
    pub method_name: Option<String>,
    #[serde(default)]
    pub method_signature: Option<String>,
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub entry: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub native_only: bool,
    /// 0 means unlimited
    #[serde(default)]
    pub hit_count: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl BreakpointSpec {
    pub fn method(type_name: &str, method_name: Option<&str>, method_signature: Option<&str>) -> Self {
        Self {
            kind: BreakpointKind::Method,
            type_name: type_name.to_string(),
            method_name: method_name.map(str::to_string),
            method_signature: method_signature.map(str::to_string),
            line_number: None,
            entry: false,
            exit: false,
            native_only: false,
            hit_count: 0,
            enabled: true,
        }
    }

    pub fn line(type_name: &str, line_number: u32) -> Self {
        Self {
            kind: BreakpointKind::Line,
            line_number: Some(line_number),
            ..Self::method(type_name, None, None)
        }
    }

    pub fn with_entry(mut self, entry: bool) -> Self {
        self.entry = entry;
        self
    }

    pub fn with_exit(mut self, exit: bool) -> Self {
        self.exit = exit;
        self
    }

    pub fn with_hit_count(mut self, hit_count: u32) -> Self {
        self.hit_count = hit_count;
        self
    }

    pub fn with_native_only(mut self, native_only: bool) -> Self {
        self.native_only = native_only;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn validate(&self) -> BreakpointResult<()> {
        if self.type_name.trim().is_empty() {
            return Err(BreakpointError::InvalidSpec("type name is empty".to_string()));
        }
        match self.kind {
            BreakpointKind::Line if self.line_number.is_none() => Err(BreakpointError::InvalidSpec(
                "line breakpoint without a line number".to_string(),
            )),
            BreakpointKind::Line if self.entry || self.exit => Err(BreakpointError::InvalidSpec(
                "line breakpoints have no entry/exit flags".to_string(),
            )),
            BreakpointKind::Line if TypeNamePattern::is_pattern(&self.type_name) => {
                Err(BreakpointError::InvalidPattern(self.type_name.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Install notifications. Every method has an empty default.
pub trait BreakpointListener: Send + Sync {
    /// About to install a pattern breakpoint in `target`
    fn adding(&self, _breakpoint: &Breakpoint, _target: TargetId) {}

    fn installed(&self, _breakpoint: &Breakpoint, _target: TargetId) {}

    fn removed(&self, _breakpoint: &Breakpoint, _target: TargetId) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl BreakpointListener for NoopListener {}

#[derive(Debug, Clone, Serialize)]
pub struct BreakpointSnapshot {
    pub id: BreakpointId,
    pub kind: BreakpointKind,
    pub type_name: Option<String>,
    pub method_name: Option<String>,
    pub method_signature: Option<String>,
    pub line_number: Option<u32>,
    pub enabled: bool,
    pub expired: bool,
    pub entry: bool,
    pub exit: bool,
    pub native_only: bool,
    pub hit_count: u32,
    pub install_count: u32,
    pub bindings: Vec<BindingSnapshot>,
}

pub struct Breakpoint {
    id: BreakpointId,
    kind: BreakpointKind,
    store: Arc<dyn AttributeStore>,
    factory: Arc<EventRequestFactory>,
    method_name: Option<String>,
    method_signature: Option<String>,
    // serializes attribute read-modify-write sequences
    transition: Mutex<()>,
    bindings: Mutex<HashMap<TargetId, Arc<TargetBinding>>>,
}

impl fmt::Debug for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Breakpoint")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("method_name", &self.method_name)
            .field("method_signature", &self.method_signature)
            .finish_non_exhaustive()
    }
}

impl Breakpoint {
    /// Create a breakpoint from `spec`, writing its attributes to `store`
    pub fn create(
        id: BreakpointId,
        spec: BreakpointSpec,
        store: Arc<dyn AttributeStore>,
        factory: Arc<EventRequestFactory>,
    ) -> BreakpointResult<Self> {
        spec.validate()?;

        let mut entries: Vec<(&str, AttributeValue)> = vec![
            (keys::TYPE_NAME, spec.type_name.clone().into()),
            (keys::ENABLED, spec.enabled.into()),
            (keys::EXPIRED, false.into()),
            (keys::INSTALL_COUNT, 0u32.into()),
            (keys::HIT_COUNT, spec.hit_count.into()),
            (keys::NATIVE, spec.native_only.into()),
        ];
        match spec.kind {
            BreakpointKind::Method => {
                let default_entry = spec.enabled && !spec.entry && !spec.exit;
                entries.push((keys::ENTRY, (spec.entry || default_entry).into()));
                entries.push((keys::EXIT, spec.exit.into()));
                if let Some(name) = &spec.method_name {
                    entries.push((keys::METHOD_NAME, name.clone().into()));
                }
                if let Some(signature) = &spec.method_signature {
                    entries.push((keys::METHOD_SIGNATURE, signature.clone().into()));
                }
            }
            BreakpointKind::Line => {
                if let Some(line) = spec.line_number {
                    entries.push((keys::LINE_NUMBER, line.into()));
                }
            }
        }
        store.set_attributes(&entries)?;

        debug!("Created {:?} breakpoint {} on {}", spec.kind, id, spec.type_name);
        Ok(Self::with_store(id, spec.kind, store, factory, spec.method_name, spec.method_signature))
    }

    /// Rebuild a breakpoint from attributes persisted by an earlier run. With
    /// `reset_at_startup`, a stale install count and expired state are repaired.
    pub fn restore(
        id: BreakpointId,
        kind: BreakpointKind,
        store: Arc<dyn AttributeStore>,
        factory: Arc<EventRequestFactory>,
        reset_at_startup: bool,
    ) -> BreakpointResult<Self> {
        if store.get_attribute(keys::TYPE_NAME)?.and_then(|v| v.as_str().map(str::to_string)).is_none() {
            return Err(BreakpointError::InvalidSpec("missing type name".to_string()));
        }
        let string_attribute = |key: &str| -> BreakpointResult<Option<String>> {
            Ok(store.get_attribute(key)?.and_then(|v| v.as_str().map(str::to_string)))
        };
        let method_name = string_attribute(keys::METHOD_NAME)?;
        let method_signature = string_attribute(keys::METHOD_SIGNATURE)?;

        let breakpoint = Self::with_store(id, kind, store, factory, method_name, method_signature);
        if reset_at_startup {
            breakpoint.configure_at_startup()?;
        }
        Ok(breakpoint)
    }

    fn with_store(
        id: BreakpointId,
        kind: BreakpointKind,
        store: Arc<dyn AttributeStore>,
        factory: Arc<EventRequestFactory>,
        method_name: Option<String>,
        method_signature: Option<String>,
    ) -> Self {
        Self {
            id,
            kind,
            store,
            factory,
            method_name,
            method_signature,
            transition: Mutex::new(()),
            bindings: Mutex::new(HashMap::new()),
        }
    }

    fn configure_at_startup(&self) -> BreakpointResult<()> {
        let _guard = self.transition();
        let mut entries: Vec<(&str, AttributeValue)> = Vec::new();
        if self.int_attribute(keys::INSTALL_COUNT)? > 0 {
            entries.push((keys::INSTALL_COUNT, 0u32.into()));
        }
        if self.bool_attribute(keys::EXPIRED)? {
            entries.push((keys::EXPIRED, false.into()));
            entries.push((keys::ENABLED, true.into()));
        }
        if !entries.is_empty() {
            info!("Breakpoint {} repaired at startup", self.id);
            self.store.set_attributes(&entries)?;
        }
        Ok(())
    }

    fn transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bindings_map(&self) -> MutexGuard<'_, HashMap<TargetId, Arc<TargetBinding>>> {
        self.bindings.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Strict reads for mutators; errors go back to the caller

    fn bool_attribute(&self, key: &str) -> Result<bool, PersistenceError> {
        Ok(self.store.get_attribute(key)?.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    fn int_attribute(&self, key: &str) -> Result<i64, PersistenceError> {
        Ok(self.store.get_attribute(key)?.and_then(|v| v.as_int()).unwrap_or(0))
    }

    // Lenient reads for queries; errors are reported and the default returned

    fn read<T>(&self, key: &str, convert: impl FnOnce(&AttributeValue) -> Option<T>) -> Option<T> {
        match self.store.get_attribute(key) {
            Ok(value) => value.as_ref().and_then(convert),
            Err(e) => {
                self.factory.sink().report("read breakpoint attribute", &e);
                None
            }
        }
    }

    fn read_bool(&self, key: &str) -> bool {
        self.read(key, AttributeValue::as_bool).unwrap_or(false)
    }

    fn read_count(&self, key: &str) -> u32 {
        self.read(key, AttributeValue::as_int)
            .map(|v| v.clamp(0, u32::MAX as i64) as u32)
            .unwrap_or(0)
    }

    pub fn id(&self) -> BreakpointId {
        self.id
    }

    pub fn kind(&self) -> BreakpointKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.read_bool(keys::ENABLED)
    }

    pub fn is_expired(&self) -> bool {
        self.read_bool(keys::EXPIRED)
    }

    pub fn install_count(&self) -> u32 {
        self.read_count(keys::INSTALL_COUNT)
    }

    pub fn is_installed(&self) -> bool {
        self.install_count() > 0
    }

    /// Configured hit count, 0 when unlimited
    pub fn hit_count(&self) -> u32 {
        self.read_count(keys::HIT_COUNT)
    }

    pub(crate) fn configured_hit_count(&self) -> Option<u32> {
        if !self.kind.capabilities().supports_hit_count {
            return None;
        }
        Some(self.hit_count()).filter(|&n| n > 0)
    }

    pub fn type_name(&self) -> Option<String> {
        self.read(keys::TYPE_NAME, |v| v.as_str().map(str::to_string))
    }

    pub fn method_name(&self) -> Option<&str> {
        self.method_name.as_deref()
    }

    pub fn method_signature(&self) -> Option<&str> {
        self.method_signature.as_deref()
    }

    pub fn line_number(&self) -> Option<u32> {
        self.read(keys::LINE_NUMBER, AttributeValue::as_int)
            .and_then(|v| u32::try_from(v).ok())
    }

    pub fn is_entry(&self) -> bool {
        self.read_bool(keys::ENTRY)
    }

    pub fn is_exit(&self) -> bool {
        self.read_bool(keys::EXIT)
    }

    pub fn is_native_only(&self) -> bool {
        self.read_bool(keys::NATIVE)
    }

    pub fn uses_type_pattern(&self) -> bool {
        self.type_name().is_some_and(|name| TypeNamePattern::is_pattern(&name))
    }

    /// Whether requests of `kind` follow this breakpoint's enabled state.
    /// Entry gates method entry and location requests, exit gates method exit.
    pub fn applies_to(&self, kind: RequestKind) -> bool {
        match (self.kind, kind) {
            (_, RequestKind::Step) => false,
            (BreakpointKind::Line, _) => true,
            (BreakpointKind::Method, RequestKind::MethodExit) => self.is_exit(),
            (BreakpointKind::Method, _) => self.is_entry(),
        }
    }

    pub(crate) fn request_enabled(&self, kind: RequestKind) -> bool {
        self.is_enabled() && self.applies_to(kind)
    }

    /// Event filter: native-only, method name, signature and type pattern
    pub fn accepts(&self, method: &MethodInfo) -> bool {
        if self.is_native_only() && !method.is_native {
            return false;
        }
        if self.method_name().is_some_and(|name| name != method.name) {
            return false;
        }
        if self.method_signature().is_some_and(|sig| sig != method.signature) {
            return false;
        }
        // class-filtered requests also report methods inherited from supertypes
        self.type_name()
            .map_or(true, |name| TypeNamePattern::new(&name).matches(&method.declaring_type))
    }

    pub fn binding(&self, target: TargetId) -> Option<Arc<TargetBinding>> {
        self.bindings_map().get(&target).cloned()
    }

    pub fn bindings(&self) -> Vec<Arc<TargetBinding>> {
        let mut bindings: Vec<_> = self.bindings_map().values().cloned().collect();
        bindings.sort_by_key(|b| b.target());
        bindings
    }

    pub fn targets(&self) -> Vec<TargetId> {
        self.bindings().iter().map(|b| b.target()).collect()
    }

    pub fn last_event(&self, target: TargetId) -> Option<LastEventType> {
        self.binding(target).and_then(|b| b.last_event())
    }

    /// Whether the last suspension in `target` came from a method entry
    pub fn is_entry_suspend(&self, target: TargetId) -> bool {
        self.last_event(target) == Some(LastEventType::Entry)
    }

    pub fn enable(&self) -> BreakpointResult<()> {
        self.set_enabled(true)
    }

    pub fn disable(&self) -> BreakpointResult<()> {
        self.set_enabled(false)
    }

    pub fn set_enabled(&self, enabled: bool) -> BreakpointResult<()> {
        {
            let _guard = self.transition();
            let mut entries: Vec<(&str, AttributeValue)> = vec![(keys::ENABLED, enabled.into())];
            if enabled {
                entries.extend(self.default_flags()?);
            }
            self.store.set_attributes(&entries)?;
        }
        debug!("Breakpoint {} enabled={}", self.id, enabled);
        self.update_requests();
        Ok(())
    }

    /// entry=true, exit=false for a method breakpoint with neither flag set
    fn default_flags(&self) -> Result<Vec<(&'static str, AttributeValue)>, PersistenceError> {
        if self.kind != BreakpointKind::Method
            || self.bool_attribute(keys::ENTRY)?
            || self.bool_attribute(keys::EXIT)?
        {
            return Ok(Vec::new());
        }
        Ok(vec![(keys::ENTRY, true.into()), (keys::EXIT, false.into())])
    }

    pub fn set_entry(&self, entry: bool) -> BreakpointResult<()> {
        self.set_flag(keys::ENTRY, keys::EXIT, entry)
    }

    pub fn set_exit(&self, exit: bool) -> BreakpointResult<()> {
        self.set_flag(keys::EXIT, keys::ENTRY, exit)
    }

    fn set_flag(&self, key: &'static str, other: &'static str, value: bool) -> BreakpointResult<()> {
        if !self.kind.capabilities().supports_entry_exit {
            return Err(BreakpointError::InvalidSpec(format!(
                "{:?} breakpoints have no entry/exit flags",
                self.kind
            )));
        }
        {
            let _guard = self.transition();
            if self.bool_attribute(key)? == value {
                return Ok(());
            }
            let enabled = self.bool_attribute(keys::ENABLED)?;
            let mut entries: Vec<(&str, AttributeValue)> = vec![(key, value.into())];
            if value && !enabled {
                entries.push((keys::ENABLED, true.into()));
            } else if !value && enabled && !self.bool_attribute(other)? {
                entries.push((keys::ENABLED, false.into()));
            }
            self.store.set_attributes(&entries)?;
        }
        debug!("Breakpoint {} {}={}", self.id, key, value);
        self.update_requests();
        Ok(())
    }

    /// Native-only applies to events, so installed requests are unaffected
    pub fn set_native_only(&self, native_only: bool) -> BreakpointResult<()> {
        self.store.set_attribute(keys::NATIVE, native_only.into())?;
        Ok(())
    }

    /// Persist a new hit count (0 = unlimited) and reconfigure installed requests
    pub fn set_hit_count(&self, hit_count: u32) -> BreakpointResult<()> {
        if !self.kind.capabilities().supports_hit_count {
            return Err(BreakpointError::InvalidSpec(format!(
                "{:?} breakpoints have no hit count",
                self.kind
            )));
        }
        self.store.set_attribute(keys::HIT_COUNT, hit_count.into())?;
        debug!("Breakpoint {} hit count={}", self.id, hit_count);
        self.update_requests();
        Ok(())
    }

    pub fn increment_install_count(&self) -> BreakpointResult<u32> {
        let _guard = self.transition();
        let count = self.int_attribute(keys::INSTALL_COUNT)?.max(0) + 1;
        self.store.set_attribute(keys::INSTALL_COUNT, count.into())?;
        Ok(count as u32)
    }

    /// Never goes below 0. The last uninstall of an expired breakpoint
    /// un-expires and re-enables it.
    pub fn decrement_install_count(&self) -> BreakpointResult<u32> {
        let _guard = self.transition();
        let count = self.int_attribute(keys::INSTALL_COUNT)?;
        if count <= 0 {
            return Ok(0);
        }
        if count == 1 && self.bool_attribute(keys::EXPIRED)? {
            self.store.set_attributes(&[
                (keys::INSTALL_COUNT, 0u32.into()),
                (keys::EXPIRED, false.into()),
                (keys::ENABLED, true.into()),
            ])?;
            info!("Breakpoint {} un-expired after last uninstall", self.id);
        } else {
            self.store.set_attribute(keys::INSTALL_COUNT, (count - 1).into())?;
        }
        Ok((count - 1) as u32)
    }

    /// Hit count exhausted. Expired is recorded before enabled is cleared.
    pub(crate) fn expire(&self) -> BreakpointResult<()> {
        {
            let _guard = self.transition();
            self.store.set_attribute(keys::EXPIRED, true.into())?;
            self.store.set_attribute(keys::ENABLED, false.into())?;
        }
        info!("Breakpoint {} expired", self.id);
        self.update_requests();
        Ok(())
    }

    /// Install in `session`'s target. Idempotent per target.
    pub fn add_to_target(
        &self,
        session: Arc<dyn Session>,
        listener: &dyn BreakpointListener,
    ) -> BreakpointResult<Arc<TargetBinding>> {
        let target = session.target_id();
        if let Some(existing) = self.binding(target) {
            return Ok(existing);
        }

        let type_name = self.type_name().unwrap_or_default();
        let pattern = self.kind == BreakpointKind::Method && TypeNamePattern::is_pattern(&type_name);
        if pattern {
            listener.adding(self, target);
        }
        if type_name.trim().is_empty() {
            return Err(BreakpointError::InvalidPattern(type_name));
        }
        if self.kind == BreakpointKind::Line && TypeNamePattern::is_pattern(&type_name) {
            // line locations only resolve in a concrete class
            warn!("Line breakpoint {} has type pattern {:?}, not installing", self.id, type_name);
            return Err(BreakpointError::InvalidPattern(type_name));
        }

        let binding = {
            let mut bindings = self.bindings_map();
            match bindings.get(&target) {
                Some(existing) => return Ok(Arc::clone(existing)),
                None => {
                    let binding = Arc::new(TargetBinding::new(session));
                    bindings.insert(target, Arc::clone(&binding));
                    binding
                }
            }
        };

        let installed = if pattern {
            let filter = ClassFilter::Pattern(type_name);
            [true, false]
                .into_iter()
                .filter_map(|entry| {
                    self.factory
                        .create_method_request(binding.session().as_ref(), self, &filter, entry)
                })
                .map(|request| self.register(&binding, request))
                .count()
        } else {
            let session = binding.session().as_ref();
            match session.classes_by_name(&type_name) {
                Ok(classes) => classes.iter().map(|class| self.install_for_class(&binding, class)).sum::<usize>(),
                Err(e) => {
                    self.factory.session_failure("look up classes", session, &e);
                    0
                }
            }
        };

        if installed > 0 {
            info!("Breakpoint {} installed in target {} ({} requests)", self.id, target, installed);
            listener.installed(self, target);
        } else {
            debug!("Breakpoint {} pending in target {}", self.id, target);
        }
        Ok(binding)
    }

    /// Deferred install once a class matching a concrete type name is loaded.
    /// Returns the number of requests created.
    pub fn class_prepared(
        &self,
        target: TargetId,
        class: &ReferenceType,
        listener: &dyn BreakpointListener,
    ) -> usize {
        let Some(binding) = self.binding(target) else {
            return 0;
        };
        if self.uses_type_pattern() || self.type_name().as_deref() != Some(class.name.as_str()) {
            return 0;
        }
        let already = binding.requests().iter().any(|r| {
            r.location().is_some_and(|l| l.class_id == class.id)
                || r.class_filter().is_some_and(|f| f == ClassFilter::Type(class.clone()))
        });
        if already {
            return 0;
        }
        let installed = self.install_for_class(&binding, class);
        if installed > 0 {
            info!("Breakpoint {} installed in {} on target {}", self.id, class.name, target);
            listener.installed(self, target);
        }
        installed
    }

    fn install_for_class(&self, binding: &Arc<TargetBinding>, class: &ReferenceType) -> usize {
        let session = binding.session().as_ref();
        let requests: Vec<Arc<LiveRequest>> = match self.kind {
            BreakpointKind::Method => {
                let filter = ClassFilter::Type(class.clone());
                [true, false]
                    .into_iter()
                    .filter_map(|entry| self.factory.create_method_request(session, self, &filter, entry))
                    .collect()
            }
            BreakpointKind::Line => self.factory.create_line_requests(session, self, class),
        };
        requests.into_iter().map(|request| self.register(binding, request)).count()
    }

    fn register(&self, binding: &TargetBinding, request: Arc<LiveRequest>) {
        binding.register(request);
        if let Err(e) = self.increment_install_count() {
            self.factory.sink().report("increment install count", &e);
        }
    }

    /// Uninstall from `target`. Returns false when it was not installed there.
    pub fn remove_from_target(&self, target: TargetId, listener: &dyn BreakpointListener) -> bool {
        let Some(binding) = self.bindings_map().remove(&target) else {
            return false;
        };
        binding.clear_last_event();
        let session = binding.session().as_ref();
        for request in binding.take_requests() {
            if let Err(e) = request.delete(session) {
                self.factory.session_failure("delete request", session, &e);
            }
            if let Err(e) = self.decrement_install_count() {
                self.factory.sink().report("decrement install count", &e);
            }
        }
        info!("Breakpoint {} removed from target {}", self.id, target);
        listener.removed(self, target);
        true
    }

    /// Replace an invalidated request in `target`. A request that cannot be
    /// rebuilt is dropped from the binding.
    pub fn recreate_request(&self, target: TargetId, request_id: RequestId) -> Option<Arc<LiveRequest>> {
        let binding = self.binding(target)?;
        let old = binding.request(request_id)?;
        self.recreate_in(&binding, &old)
    }

    fn recreate_in(&self, binding: &TargetBinding, old: &Arc<LiveRequest>) -> Option<Arc<LiveRequest>> {
        let session = binding.session().as_ref();
        let recreated = self.factory.recreate_request(old, session, self);
        if recreated.as_ref().is_some_and(|new| Arc::ptr_eq(new, old)) {
            return recreated;
        }
        if let Err(e) = old.delete(session) {
            self.factory.session_failure("delete request", session, &e);
        }
        match recreated {
            Some(new) => {
                binding.replace(old.id(), Arc::clone(&new));
                Some(new)
            }
            None => {
                binding.remove(old.id());
                if let Err(e) = self.decrement_install_count() {
                    self.factory.sink().report("decrement install count", &e);
                }
                None
            }
        }
    }

    /// Push hit count and enabled state to every installed request. Enabling
    /// re-arms exhausted requests even while the breakpoint stays expired.
    pub fn update_requests(&self) {
        let enabled = self.is_enabled();
        let hit_count = self.configured_hit_count();

        for binding in self.bindings() {
            for request in binding.requests() {
                let request = match request.kind() {
                    RequestKind::Breakpoint => {
                        let stale = request.count_filter() != hit_count
                            || (request.is_expired() && enabled);
                        if stale {
                            match self.recreate_in(&binding, &request) {
                                Some(new) => new,
                                None => continue,
                            }
                        } else {
                            request
                        }
                    }
                    RequestKind::MethodEntry | RequestKind::MethodExit => {
                        if request.hit_count_changed(hit_count)
                            || (request.is_hit_count_exhausted() && enabled)
                        {
                            request.put_hit_count(hit_count);
                        }
                        request
                    }
                    RequestKind::Step => continue,
                };
                let session = binding.session().as_ref();
                if let Err(e) = request.set_enabled(session, self.request_enabled(request.kind())) {
                    self.factory.session_failure("update request enabled state", session, &e);
                }
            }
        }
    }

    pub fn snapshot(&self) -> BreakpointSnapshot {
        BreakpointSnapshot {
            id: self.id,
            kind: self.kind,
            type_name: self.type_name(),
            method_name: self.method_name.clone(),
            method_signature: self.method_signature.clone(),
            line_number: self.line_number(),
            enabled: self.is_enabled(),
            expired: self.is_expired(),
            entry: self.is_entry(),
            exit: self.is_exit(),
            native_only: self.is_native_only(),
            hit_count: self.hit_count(),
            install_count: self.install_count(),
            bindings: self.bindings().iter().map(|b| b.snapshot()).collect(),
        }
    }
}
