//! Container change events and the signal keys observers connect to

use crate::store::ContainerHandle;

/// What happened to a name in a container
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyChange {
    /// The name became resolvable
    Added,
    /// The name stopped being resolvable
    Removed,
    /// The resolved value changed
    ReferenceChanged,
}

/// A queued container-level change
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyEvent {
    pub container: ContainerHandle,
    pub name: String,
    pub change: PropertyChange,
}

/// Signals a container exposes
///
/// `Added` and `Removed` fire for any name; `ReferenceChanged` is per name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertySignal {
    Added(ContainerHandle),
    Removed(ContainerHandle),
    ReferenceChanged(ContainerHandle, String),
}

impl PropertySignal {
    /// Container the signal belongs to
    pub fn container(&self) -> ContainerHandle {
        match self {
            PropertySignal::Added(c)
            | PropertySignal::Removed(c)
            | PropertySignal::ReferenceChanged(c, _) => *c,
        }
    }
}

impl From<&PropertyEvent> for PropertySignal {
    fn from(event: &PropertyEvent) -> Self {
        match event.change {
            PropertyChange::Added => PropertySignal::Added(event.container),
            PropertyChange::Removed => PropertySignal::Removed(event.container),
            PropertyChange::ReferenceChanged => {
                PropertySignal::ReferenceChanged(event.container, event.name.clone())
            }
        }
    }
}
