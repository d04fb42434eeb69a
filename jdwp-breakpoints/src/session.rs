// Debug target collaborators
//
// A `Session` is one connected VM. It exposes the EventRequestManager
// primitives the core needs; the wire transport behind it is not our concern.

use crate::error::SessionError;
use crate::types::{
    Location, MethodInfo, ReferenceType, RequestId, StepSpec, SuspendPolicy, TargetId, ThreadId,
};
use serde::{Deserialize, Serialize};

pub type SessionResult<T> = Result<T, SessionError>;

/// Scope of a method entry/exit request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassFilter {
    /// Class name pattern (ClassMatch modifier)
    Pattern(String),
    /// A loaded type (ClassOnly modifier)
    Type(ReferenceType),
}

pub trait Session: Send + Sync {
    fn target_id(&self) -> TargetId;

    /// Whether the target is still usable. A disconnected error from an
    /// available target is unexpected and gets reported.
    fn is_available(&self) -> bool;

    fn create_breakpoint_request(&self, location: &Location) -> SessionResult<RequestId>;

    fn create_method_entry_request(&self) -> SessionResult<RequestId>;

    fn create_method_exit_request(&self) -> SessionResult<RequestId>;

    fn create_step_request(&self, step: &StepSpec) -> SessionResult<RequestId>;

    fn add_class_filter(&self, request: RequestId, filter: &ClassFilter) -> SessionResult<()>;

    fn add_thread_filter(&self, request: RequestId, thread: ThreadId) -> SessionResult<()>;

    /// Native hit count: the VM reports only the `count`-th event, then
    /// expires the request
    fn add_count_filter(&self, request: RequestId, count: u32) -> SessionResult<()>;

    fn set_suspend_policy(&self, request: RequestId, policy: SuspendPolicy) -> SessionResult<()>;

    fn set_request_enabled(&self, request: RequestId, enabled: bool) -> SessionResult<()>;

    fn delete_request(&self, request: RequestId) -> SessionResult<()>;

    /// Loaded classes with exactly this name
    fn classes_by_name(&self, name: &str) -> SessionResult<Vec<ReferenceType>>;

    /// Concrete (non-abstract) method of `class` with this name and signature
    fn concrete_method(
        &self,
        class: &ReferenceType,
        name: &str,
        signature: &str,
    ) -> SessionResult<Option<MethodInfo>>;

    /// Executable locations of a source line in `class`
    fn line_locations(&self, class: &ReferenceType, line: u32) -> SessionResult<Vec<Location>>;
}

/// Suspend primitive for the thread an event arrived on
pub trait SuspendController: Send + Sync {
    fn thread_id(&self) -> ThreadId;

    /// Suspend the thread; `false` when suspension failed
    fn suspend(&self) -> bool;
}
