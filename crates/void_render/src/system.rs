//! Surface system
//!
//! Owns the property store, the listener table and the surfaces. Every
//! mutation made through the system is followed by a dispatch that drains
//! the store's events, routes each one to the connections registered for
//! its signal and handles whatever the notified surfaces queued in turn.
//! When a call returns, the draw calls of every surface are up to date.

use void_core::HandleMap;
use void_data::{
    ContainerHandle, PropertySignal, PropertyStore, ProviderHandle, Value,
};

use crate::config::RenderConfig;
use crate::draw_call::DrawCallHandle;
use crate::geometry::Geometry;
use crate::signals::{SurfaceLinks, SurfaceSignals};
use crate::surface::{SceneTarget, Surface, SurfaceEvent, SurfaceHandle};
use crate::{RenderError, Result};

/// Renderer-side owner of surfaces
#[derive(Debug, Default)]
pub struct SurfaceSystem {
    config: RenderConfig,
    store: PropertyStore,
    signals: SurfaceSignals,
    surfaces: HandleMap<Surface>,
    events: Vec<(SurfaceHandle, SurfaceEvent)>,
}

impl SurfaceSystem {
    /// Create a system with its own property store
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Property store shared by every surface
    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    /// Listener connections of every surface
    pub fn signals(&self) -> &SurfaceSignals {
        &self.signals
    }

    /// Number of connections owned by one surface
    pub fn connection_count(&self, surface: SurfaceHandle) -> usize {
        self.signals.count_where(|_, l| l.surface == surface)
    }

    // ----------------------------------------------------------------------
    // Store mutations
    // ----------------------------------------------------------------------

    pub fn create_provider(&mut self, name: impl Into<String>) -> ProviderHandle {
        self.store.create_provider(name)
    }

    pub fn create_container(&mut self, name: impl Into<String>) -> ContainerHandle {
        self.store.create_container(name)
    }

    /// Set a property and propagate the change
    pub fn set_property(&mut self, provider: ProviderHandle, name: &str, value: impl Into<Value>) -> Result<()> {
        self.update(|store| Ok(store.set(provider, name, value)?))
    }

    /// Remove a property and propagate the change
    pub fn unset_property(&mut self, provider: ProviderHandle, name: &str) -> Result<Option<Value>> {
        self.update(|store| Ok(store.unset(provider, name)?))
    }

    /// Layer a provider into a container and propagate the change
    pub fn add_provider(&mut self, container: ContainerHandle, provider: ProviderHandle) -> Result<()> {
        self.update(|store| Ok(store.add_provider(container, provider)?))
    }

    /// Unlayer a provider from a container and propagate the change
    pub fn remove_provider(&mut self, container: ContainerHandle, provider: ProviderHandle) -> Result<()> {
        self.update(|store| Ok(store.remove_provider(container, provider)?))
    }

    /// Run arbitrary store mutations, then propagate them
    ///
    /// The dispatch runs even if `f` fails part way.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut PropertyStore) -> Result<R>) -> Result<R> {
        let result = f(&mut self.store);
        self.dispatch()?;
        result
    }

    // ----------------------------------------------------------------------
    // Surfaces
    // ----------------------------------------------------------------------

    /// Take ownership of a surface; it inherits the system's limits
    pub fn add_surface(&mut self, surface: Surface) -> SurfaceHandle {
        self.surfaces.insert(surface.with_config(self.config.clone()))
    }

    /// Detach and hand back a surface
    pub fn remove_surface(&mut self, handle: SurfaceHandle) -> Result<Surface> {
        if self.surface(handle).and_then(Surface::target).is_some() {
            self.detach(handle)?;
        }

        self.signals.disconnect_where(|l| l.surface == handle);
        let mut surface = self
            .surfaces
            .remove(handle)
            .ok_or(RenderError::SurfaceNotFound(handle))?;
        for event in surface.drain_events() {
            self.events.push((handle, event));
        }
        Ok(surface)
    }

    pub fn surface(&self, handle: SurfaceHandle) -> Option<&Surface> {
        self.surfaces.get(handle)
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Attach a surface to a node
    pub fn attach(&mut self, handle: SurfaceHandle, target: SceneTarget) -> Result<()> {
        self.with_surface(handle, |surface, store, _| surface.target_added(store, target))
    }

    /// Detach a surface from its node
    pub fn detach(&mut self, handle: SurfaceHandle) -> Result<()> {
        self.with_surface(handle, |surface, store, links| surface.target_removed(store, links))
    }

    /// The surface's node left the scene
    pub fn node_removed(&mut self, handle: SurfaceHandle) -> Result<()> {
        self.with_surface(handle, |surface, _, links| {
            surface.removed(links);
            Ok(())
        })
    }

    /// Build a surface's draw calls for a renderer context
    ///
    /// Returns the draw calls the context ends up with once technique
    /// fallbacks have been handled.
    pub fn create_draw_calls(
        &mut self,
        handle: SurfaceHandle,
        renderer_data: ContainerHandle,
    ) -> Result<Vec<DrawCallHandle>> {
        self.with_surface(handle, |surface, store, links| {
            surface.create_draw_calls(store, links, renderer_data)
        })?;

        Ok(self
            .surface(handle)
            .map(|s| s.draw_calls(renderer_data).to_vec())
            .unwrap_or_default())
    }

    /// Destroy a surface's draw calls for a renderer context
    pub fn delete_draw_calls(&mut self, handle: SurfaceHandle, renderer_data: ContainerHandle) -> Result<()> {
        self.with_surface(handle, |surface, _, links| {
            surface.delete_draw_calls(links, renderer_data);
            Ok(())
        })
    }

    /// Switch a surface's technique and rebuild its draw calls
    pub fn set_technique(&mut self, handle: SurfaceHandle, technique: &str) -> Result<()> {
        self.with_surface(handle, |surface, _, _| surface.set_technique(technique))
    }

    /// Swap a surface's geometry
    pub fn set_geometry(&mut self, handle: SurfaceHandle, geometry: Geometry) -> Result<()> {
        self.with_surface(handle, |surface, store, _| surface.set_geometry(store, geometry))
    }

    /// Take the notifications of every surface, in emission order
    pub fn drain_events(&mut self) -> Vec<(SurfaceHandle, SurfaceEvent)> {
        std::mem::take(&mut self.events)
    }

    fn with_surface<R>(
        &mut self,
        handle: SurfaceHandle,
        f: impl FnOnce(&mut Surface, &mut PropertyStore, &mut SurfaceLinks<'_>) -> Result<R>,
    ) -> Result<R> {
        let surface = self
            .surfaces
            .get_mut(handle)
            .ok_or(RenderError::SurfaceNotFound(handle))?;
        let mut links = SurfaceLinks::new(&mut self.signals, handle);
        let result = f(surface, &mut self.store, &mut links);
        self.dispatch()?;
        result
    }

    // ----------------------------------------------------------------------
    // Dispatch
    // ----------------------------------------------------------------------

    /// Deliver every pending property event and surface notification
    pub fn dispatch(&mut self) -> Result<()> {
        for (_, surface) in self.surfaces.iter_mut() {
            surface.reset_recovery_attempts();
        }

        let mut switches = 0;
        for handle in self.surfaces.handles() {
            self.flush_surface(handle, &mut switches)?;
        }

        while let Some(event) = self.store.pop_event() {
            let signal = PropertySignal::from(&event);

            for (connection, listener) in self.signals.listeners(&signal) {
                // An earlier handler may have dropped this connection
                if !self.signals.is_connected(connection) {
                    continue;
                }
                let Some(surface) = self.surfaces.get_mut(listener.surface) else {
                    continue;
                };

                let mut links = SurfaceLinks::new(&mut self.signals, listener.surface);
                surface.handle_signal(&self.store, &mut links, &listener.slot, &event)?;
                self.flush_surface(listener.surface, &mut switches)?;
            }
        }
        Ok(())
    }

    /// Forward a surface's notifications; rebuild on technique changes
    fn flush_surface(&mut self, handle: SurfaceHandle, switches: &mut u32) -> Result<()> {
        loop {
            let Some(surface) = self.surfaces.get_mut(handle) else {
                return Ok(());
            };
            let events = surface.drain_events();
            if events.is_empty() {
                return Ok(());
            }

            let mut technique_changed = false;
            for event in events {
                technique_changed |= matches!(event, SurfaceEvent::TechniqueChanged { .. });
                self.events.push((handle, event));
            }
            if !technique_changed {
                continue;
            }

            *switches += 1;
            if *switches > self.config.max_technique_switches {
                log::warn!(
                    "Surface {:?}: more than {} technique switches in one dispatch, draw calls not rebuilt",
                    handle,
                    self.config.max_technique_switches
                );
                return Ok(());
            }
            self.rebuild(handle)?;
        }
    }

    /// Recreate the draw calls of every renderer context a surface knows
    fn rebuild(&mut self, handle: SurfaceHandle) -> Result<()> {
        let Some(surface) = self.surfaces.get_mut(handle) else {
            return Ok(());
        };
        if surface.target().is_none() {
            return Ok(());
        }

        let mut links = SurfaceLinks::new(&mut self.signals, handle);
        for renderer_data in surface.renderer_contexts() {
            surface.create_draw_calls(&self.store, &mut links, renderer_data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use void_shader::{Effect, MacroBinding, Pass, Technique};

    fn effect(system: &mut SurfaceSystem) -> Arc<Effect> {
        let main = Pass::builder("main")
            .macro_binding("SHADOWS", MacroBinding::boolean("shadows"))
            .build();
        Effect::builder("shadowed")
            .technique(Technique::new("default", vec![main]))
            .build(system.create_provider("effect"))
            .unwrap()
    }

    #[test]
    fn test_unknown_surface() {
        let mut system = SurfaceSystem::default();
        let stale = SurfaceHandle::from_bits(99);
        assert!(matches!(
            system.set_technique(stale, "default"),
            Err(RenderError::SurfaceNotFound(_))
        ));
    }

    #[test]
    fn test_property_change_reaches_surface() {
        let mut system = SurfaceSystem::default();
        let effect = effect(&mut system);
        let node = system.create_container("node");
        let root = system.create_container("root");
        let renderer = system.create_container("renderer");
        let material = system.create_provider("material");
        let geometry = system.update(|store| Ok(Geometry::new(store, "mesh"))).unwrap();

        let surface = Surface::new("mesh", geometry, material, effect, "default").unwrap();
        let handle = system.add_surface(surface);
        system.attach(handle, SceneTarget::new(node, root)).unwrap();

        let draw_calls = system.create_draw_calls(handle, renderer).unwrap();
        assert_eq!(draw_calls.len(), 1);

        system.set_property(material, "shadows", true).unwrap();
        let program = system
            .surface(handle)
            .and_then(|s| s.draw_call(draw_calls[0]))
            .and_then(|dc| dc.program())
            .unwrap();
        assert!(program.variant().is_defined("SHADOWS"));

        system.set_property(material, "shadows", false).unwrap();
        let program = system
            .surface(handle)
            .and_then(|s| s.draw_call(draw_calls[0]))
            .and_then(|dc| dc.program())
            .unwrap();
        assert!(!program.variant().is_defined("SHADOWS"));

        let removed = system.remove_surface(handle).unwrap();
        assert_eq!(removed.draw_call_count(), 0);
        assert_eq!(system.signals().len(), 0);
        assert!(!system.store().is_layered(node, material));
    }
}
