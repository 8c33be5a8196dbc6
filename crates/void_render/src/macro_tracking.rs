//! Macro bookkeeping of a surface
//!
//! - [`MacroDrawCalls`]: macro property name → draw calls whose pass chain
//!   reads it, used to find what to reconfigure when a name changes
//! - [`MacroListeners`]: one `ReferenceChanged` connection per resolved
//!   macro, reference-counted by the draw calls depending on it
//! - [`IncorrectMacros`]: macros that made a (technique, pass) selection
//!   fail, each watched until it is forgiven

use std::collections::HashMap;

use void_data::{ContainerProperty, PropertySignal};
use void_shader::PassId;

use crate::draw_call::DrawCallHandle;
use crate::signals::{Slot, SurfaceConnection, SurfaceLinks};

/// Macro property name → dependent draw calls
#[derive(Debug, Default)]
pub struct MacroDrawCalls {
    by_name: HashMap<String, Vec<DrawCallHandle>>,
}

impl MacroDrawCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a draw call under a property name
    pub fn insert(&mut self, name: &str, draw_call: DrawCallHandle) {
        let entry = self.by_name.entry(name.to_string()).or_default();
        if !entry.contains(&draw_call) {
            entry.push(draw_call);
        }
    }

    /// Drop a draw call from every name
    pub fn remove_draw_call(&mut self, draw_call: DrawCallHandle) {
        self.by_name.retain(|_, list| {
            list.retain(|dc| *dc != draw_call);
            !list.is_empty()
        });
    }

    /// Snapshot of the draw calls indexed under a name
    pub fn draw_calls(&self, name: &str) -> Vec<DrawCallHandle> {
        self.by_name.get(name).cloned().unwrap_or_default()
    }

    /// Number of indexed names
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_name.clear();
    }
}

#[derive(Debug)]
struct ListenerEntry {
    connection: SurfaceConnection,
    count: usize,
}

/// Reference-counted `ReferenceChanged` connections per resolved macro
#[derive(Debug, Default)]
pub struct MacroListeners {
    entries: HashMap<ContainerProperty, ListenerEntry>,
}

impl MacroListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference; the first one connects the listener
    ///
    /// Unresolved macros have nothing to listen to and are ignored.
    pub fn retain(&mut self, links: &mut SurfaceLinks<'_>, key: &ContainerProperty) -> bool {
        let Some(container) = key.container() else {
            return false;
        };

        if let Some(entry) = self.entries.get_mut(key) {
            entry.count += 1;
            return false;
        }

        let connection = links.connect(
            PropertySignal::ReferenceChanged(container, key.name().to_string()),
            Slot::MacroChanged,
        );
        log::trace!("Listening to macro {:?}", key);
        self.entries.insert(key.clone(), ListenerEntry { connection, count: 1 });
        true
    }

    /// Drop a reference; the last one disconnects the listener
    pub fn release(&mut self, links: &mut SurfaceLinks<'_>, key: &ContainerProperty) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };

        entry.count -= 1;
        if entry.count > 0 {
            return false;
        }

        if let Some(entry) = self.entries.remove(key) {
            links.disconnect(entry.connection);
            log::trace!("Stopped listening to macro {:?}", key);
        }
        true
    }

    /// Current reference count
    pub fn count(&self, key: &ContainerProperty) -> usize {
        self.entries.get(key).map_or(0, |e| e.count)
    }

    /// Number of connected listeners
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Disconnect everything regardless of reference counts
    pub fn clear(&mut self, links: &mut SurfaceLinks<'_>) {
        for (_, entry) in self.entries.drain() {
            links.disconnect(entry.connection);
        }
    }
}

/// A pass of a technique, as recorded against a failed macro
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TechniquePass {
    pub technique: String,
    pub pass: PassId,
}

impl TechniquePass {
    pub fn new(technique: impl Into<String>, pass: PassId) -> Self {
        Self {
            technique: technique.into(),
            pass,
        }
    }
}

#[derive(Debug)]
struct IncorrectEntry {
    failures: Vec<TechniquePass>,
    connection: SurfaceConnection,
}

/// Macros whose value made some selection fail
#[derive(Debug, Default)]
pub struct IncorrectMacros {
    entries: HashMap<ContainerProperty, IncorrectEntry>,
}

impl IncorrectMacros {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure; the first one for a macro starts watching it
    pub fn blame(
        &mut self,
        links: &mut SurfaceLinks<'_>,
        key: &ContainerProperty,
        failure: &TechniquePass,
    ) {
        let Some(container) = key.container() else {
            return;
        };

        match self.entries.get_mut(key) {
            Some(entry) => {
                if !entry.failures.contains(failure) {
                    entry.failures.push(failure.clone());
                }
            }
            None => {
                let connection = links.connect(
                    PropertySignal::ReferenceChanged(container, key.name().to_string()),
                    Slot::BadMacroChanged(key.clone()),
                );
                log::debug!(
                    "Macro {:?} blamed for technique '{}'",
                    key,
                    failure.technique
                );
                self.entries.insert(
                    key.clone(),
                    IncorrectEntry {
                        failures: vec![failure.clone()],
                        connection,
                    },
                );
            }
        }
    }

    /// Withdraw a failure; the last one stops watching the macro
    pub fn forgive(
        &mut self,
        links: &mut SurfaceLinks<'_>,
        key: &ContainerProperty,
        failure: &TechniquePass,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };

        let before = entry.failures.len();
        entry.failures.retain(|f| f != failure);
        if entry.failures.len() == before {
            return false;
        }

        if entry.failures.is_empty() {
            if let Some(entry) = self.entries.remove(key) {
                links.disconnect(entry.connection);
                log::debug!("Macro {:?} forgiven", key);
            }
        }
        true
    }

    /// Earliest failure still recorded for a macro
    pub fn first_failure(&self, key: &ContainerProperty) -> Option<&TechniquePass> {
        self.entries.get(key)?.failures.first()
    }

    /// Check if a macro is blamed for anything
    pub fn is_blamed(&self, key: &ContainerProperty) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of blamed macros
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every failure and disconnect the watches
    pub fn clear(&mut self, links: &mut SurfaceLinks<'_>) {
        for (_, entry) in self.entries.drain() {
            links.disconnect(entry.connection);
        }
    }
}
