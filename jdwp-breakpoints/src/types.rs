// JDWP type definitions
//
// Identifiers and descriptors shared by requests, events and sessions

use crate::commands::{event_kinds, step_depths, step_sizes, type_tags};
use serde::{Deserialize, Serialize};

// Object IDs are 8 bytes in JDWP
pub type ObjectId = u64;
pub type ThreadId = ObjectId;

pub type ReferenceTypeId = u64;
pub type MethodId = u64;

// Request IDs are assigned by the target VM (EventRequest.Set reply)
pub type RequestId = i32;

// One debug target (one connected VM) per id
pub type TargetId = u32;

pub type BreakpointId = u64;

// Location identifies a code position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub type_tag: u8, // 1=class, 2=interface, 3=array
    pub class_id: ReferenceTypeId,
    pub method_id: MethodId,
    pub index: u64, // bytecode index (PC)
}

/// A loaded reference type in the target VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceType {
    pub id: ReferenceTypeId,
    pub tag: u8,
    /// Fully qualified name, e.g. `com.example.Foo`
    pub name: String,
}

impl ReferenceType {
    pub fn class(id: ReferenceTypeId, name: impl Into<String>) -> Self {
        Self {
            id,
            tag: type_tags::CLASS,
            name: name.into(),
        }
    }

    pub fn is_class(&self) -> bool {
        self.tag == type_tags::CLASS
    }
}

/// A method as seen by the debugger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub id: MethodId,
    pub name: String,
    pub signature: String,
    pub declaring_type: String,
    pub is_native: bool,
    /// First executable location; `None` for native and abstract methods
    pub location: Option<Location>,
}

/// Kind of a live event request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Breakpoint,
    MethodEntry,
    MethodExit,
    Step,
}

impl RequestKind {
    /// JDWP event kind byte used by EventRequest.Set for this request
    pub fn event_kind(self) -> u8 {
        match self {
            RequestKind::Breakpoint => event_kinds::BREAKPOINT,
            RequestKind::MethodEntry => event_kinds::METHOD_ENTRY,
            RequestKind::MethodExit => event_kinds::METHOD_EXIT,
            RequestKind::Step => event_kinds::SINGLE_STEP,
        }
    }
}

/// Kind of an event delivered by a target VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Breakpoint,
    MethodEntry,
    MethodExit,
    Step,
}

/// Single event delivered by a target session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmEvent {
    pub kind: EventKind,
    pub request_id: RequestId,
    pub thread: ThreadId,
    pub location: Location,
    pub method: MethodInfo,
}

// Suspend policy for events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SuspendPolicy {
    None = 0,
    #[default]
    EventThread = 1,
    All = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum StepSize {
    Min = step_sizes::MIN,
    Line = step_sizes::LINE,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum StepDepth {
    Into = step_depths::INTO,
    Over = step_depths::OVER,
    Out = step_depths::OUT,
}

/// Parameters of a step request: the thread to step and how far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub thread: ThreadId,
    pub size: StepSize,
    pub depth: StepDepth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_kind_event_codes() {
        assert_eq!(RequestKind::Breakpoint.event_kind(), 2);
        assert_eq!(RequestKind::MethodEntry.event_kind(), 40);
        assert_eq!(RequestKind::MethodExit.event_kind(), 41);
        assert_eq!(RequestKind::Step.event_kind(), 1);
    }

    #[test]
    fn test_step_constants() {
        assert_eq!(StepDepth::Out as i32, 2);
        assert_eq!(StepSize::Line as i32, 1);
        assert_eq!(SuspendPolicy::default() as u8, 1);
    }
}
