// JDWP breakpoint core
//
// Breakpoint management for a Java debugger client:
// - Breakpoint state (enabled, expired, install count, hit count)
// - Event request construction against a debug target session
// - Event dispatch with simulated hit counts and auto-disable
// - Per-target last suspend reason

pub mod attributes;
pub mod binding;
pub mod breakpoint;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod memory;
pub mod pattern;
pub mod request;
pub mod session;
pub mod types;

pub use attributes::{AttributeStore, AttributeValue, MemoryAttributeStore};
pub use binding::{LastEventType, TargetBinding};
pub use breakpoint::{Breakpoint, BreakpointKind, BreakpointListener, BreakpointSpec, NoopListener};
pub use config::CoreConfig;
pub use diagnostics::{DiagnosticSink, RecordingSink, TracingSink};
pub use dispatcher::{EventDisposition, EventDispatcher};
pub use error::{BreakpointError, BreakpointResult, PersistenceError, SessionError};
pub use factory::EventRequestFactory;
pub use memory::{MemorySession, MemoryThread};
pub use pattern::TypeNamePattern;
pub use request::LiveRequest;
pub use session::{ClassFilter, Session, SuspendController};
pub use types::SuspendPolicy;
