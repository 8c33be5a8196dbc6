//! Listener connections between the property store and surfaces

use void_data::{ContainerProperty, PropertySignal};
use void_event::{ConnectionId, SignalTable};

use crate::surface::SurfaceHandle;

/// Which surface handler a connection routes to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Added/Removed on a container the surface's macros may resolve in
    MacroAddedOrRemoved,
    /// ReferenceChanged on a macro some draw call depends on
    MacroChanged,
    /// ReferenceChanged on a macro that made a selection fail
    BadMacroChanged(ContainerProperty),
}

/// Connection payload: the surface to notify and how
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listener {
    pub surface: SurfaceHandle,
    pub slot: Slot,
}

/// Connections of every surface, keyed by property signal
pub type SurfaceSignals = SignalTable<PropertySignal, Listener>;

/// One surface listener connection
pub type SurfaceConnection = ConnectionId<PropertySignal, Listener>;

/// A surface's view of the signal table
///
/// Every connection made through it is tagged with the owning surface.
pub struct SurfaceLinks<'a> {
    signals: &'a mut SurfaceSignals,
    owner: SurfaceHandle,
}

impl<'a> SurfaceLinks<'a> {
    /// Borrow the table on behalf of `owner`
    pub fn new(signals: &'a mut SurfaceSignals, owner: SurfaceHandle) -> Self {
        Self { signals, owner }
    }

    /// Surface the links belong to
    pub fn owner(&self) -> SurfaceHandle {
        self.owner
    }

    /// Connect one of the owner's handlers to a signal
    pub fn connect(&mut self, signal: PropertySignal, slot: Slot) -> SurfaceConnection {
        self.signals.connect(
            signal,
            Listener {
                surface: self.owner,
                slot,
            },
        )
    }

    /// Drop a connection
    pub fn disconnect(&mut self, connection: SurfaceConnection) -> bool {
        self.signals.disconnect(connection)
    }

    /// Number of live connections owned by this surface
    pub fn count(&self) -> usize {
        let owner = self.owner;
        self.signals.count_where(|_, l| l.surface == owner)
    }
}
