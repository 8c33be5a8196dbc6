//! Surface: geometry + material + effect, compiled into draw calls
//!
//! For every renderer context (the container of per-renderer globals such as
//! the camera) a surface builds one draw call per entry pass of its current
//! technique. Each draw call reads properties from three layers:
//!
//! ```text
//! target (node data: material, geometry, effect) → renderer data → root data
//! ```
//!
//! Program selection depends on the macro properties of the pass, so the
//! surface listens to them and keeps its draw calls valid:
//!
//! - a macro's value changes: the dependent draw calls are reconfigured
//! - a macro appears or disappears: dependents re-resolve their macros
//! - no variant matches: the pass falls back along its fallback chain; if
//!   the chain is exhausted the renderer context fails, the context's draw
//!   calls are destroyed and the surface switches to the technique's
//!   fallback
//! - an integer macro blamed for a failure changes: the failing technique
//!   is tried again
//!
//! Per renderer context the state moves `absent → Building → Complete |
//! Failed`.
//!
//! A surface never dispatches anything itself. Listener connections go
//! through [`SurfaceLinks`] and notifications are queued as
//! [`SurfaceEvent`]s for whoever owns the surface to drain.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use void_core::{Handle, HandleMap};
use void_data::{
    ContainerHandle, ContainerProperty, DataLayers, PropertyChange, PropertyEvent, PropertySignal,
    PropertyStore, ProviderHandle,
};
use void_event::EventQueue;
use void_shader::{Effect, Pass, ProgramSelection};

use crate::config::RenderConfig;
use crate::draw_call::{DrawCall, DrawCallHandle};
use crate::geometry::Geometry;
use crate::macro_tracking::{IncorrectMacros, MacroDrawCalls, MacroListeners, TechniquePass};
use crate::signals::{Slot, SurfaceConnection, SurfaceLinks};
use crate::{RenderError, Result};

/// Handle to a surface in a [`SurfaceSystem`](crate::SurfaceSystem)
pub type SurfaceHandle = Handle<Surface>;

/// The node a surface is attached to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneTarget {
    /// Node data container
    pub data: ContainerHandle,
    /// Data container of the node's scene root
    pub root_data: ContainerHandle,
}

impl SceneTarget {
    pub fn new(data: ContainerHandle, root_data: ContainerHandle) -> Self {
        Self { data, root_data }
    }
}

/// Notifications for the renderer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SurfaceEvent {
    DrawCallAdded {
        renderer_data: ContainerHandle,
        draw_call: DrawCallHandle,
    },
    DrawCallRemoved {
        renderer_data: ContainerHandle,
        draw_call: DrawCallHandle,
    },
    TechniqueChanged {
        previous: String,
        technique: String,
    },
}

/// Draw-call state of one renderer context
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContextState {
    /// Draw calls are being created
    Building(Vec<DrawCallHandle>),
    /// Every entry pass has a draw call
    Complete(Vec<DrawCallHandle>),
    /// Some entry pass had no matching variant under the technique
    Failed,
}

impl ContextState {
    /// Draw calls of the context, in pass order
    pub fn draw_calls(&self) -> &[DrawCallHandle] {
        match self {
            ContextState::Building(list) | ContextState::Complete(list) => list,
            ContextState::Failed => &[],
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ContextState::Complete(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ContextState::Failed)
    }
}

/// A drawable surface
#[derive(Debug)]
pub struct Surface {
    name: String,
    geometry: Geometry,
    material: ProviderHandle,
    effect: Arc<Effect>,
    technique: String,
    technique_macro_names: HashMap<String, HashSet<String>>,
    config: RenderConfig,

    target: Option<SceneTarget>,
    draw_calls: HandleMap<DrawCall>,
    contexts: BTreeMap<ContainerHandle, ContextState>,

    macro_draw_calls: MacroDrawCalls,
    macro_listeners: MacroListeners,
    incorrect_macros: IncorrectMacros,
    existence_watch: Vec<SurfaceConnection>,
    recovery_attempts: u32,

    events: EventQueue<SurfaceEvent>,
}

impl Surface {
    /// Create a surface using `technique` of `effect`
    pub fn new(
        name: impl Into<String>,
        geometry: Geometry,
        material: ProviderHandle,
        effect: Arc<Effect>,
        technique: impl Into<String>,
    ) -> Result<Self> {
        let technique = technique.into();
        if !effect.has_technique(&technique) {
            return Err(RenderError::TechniqueNotFound(technique));
        }

        let technique_macro_names = effect
            .techniques()
            .iter()
            .map(|(name, t)| (name.clone(), t.macro_properties()))
            .collect();

        Ok(Self {
            name: name.into(),
            geometry,
            material,
            effect,
            technique,
            technique_macro_names,
            config: RenderConfig::default(),
            target: None,
            draw_calls: HandleMap::new(),
            contexts: BTreeMap::new(),
            macro_draw_calls: MacroDrawCalls::new(),
            macro_listeners: MacroListeners::new(),
            incorrect_macros: IncorrectMacros::new(),
            existence_watch: Vec::new(),
            recovery_attempts: 0,
            events: EventQueue::new(),
        })
    }

    /// Replace the default limits
    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    // ----------------------------------------------------------------------
    // Accessors
    // ----------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn material(&self) -> ProviderHandle {
        self.material
    }

    pub fn effect(&self) -> &Arc<Effect> {
        &self.effect
    }

    /// Current technique name
    pub fn technique(&self) -> &str {
        &self.technique
    }

    /// Node the surface is attached to
    pub fn target(&self) -> Option<SceneTarget> {
        self.target
    }

    /// Draw calls of a renderer context; empty unless the context is complete
    pub fn draw_calls(&self, renderer_data: ContainerHandle) -> &[DrawCallHandle] {
        match self.contexts.get(&renderer_data) {
            Some(state @ ContextState::Complete(_)) => state.draw_calls(),
            _ => &[],
        }
    }

    /// Look up a live draw call
    pub fn draw_call(&self, handle: DrawCallHandle) -> Option<&DrawCall> {
        self.draw_calls.get(handle)
    }

    /// Number of live draw calls over every renderer context
    pub fn draw_call_count(&self) -> usize {
        self.draw_calls.len()
    }

    /// Renderer contexts the surface has been asked to draw in
    pub fn renderer_contexts(&self) -> Vec<ContainerHandle> {
        self.contexts.keys().copied().collect()
    }

    pub fn context_state(&self, renderer_data: ContainerHandle) -> Option<&ContextState> {
        self.contexts.get(&renderer_data)
    }

    /// Reference count of the listener on a resolved macro
    pub fn macro_listener_count(&self, key: &ContainerProperty) -> usize {
        self.macro_listeners.count(key)
    }

    /// Number of macros with a connected value listener
    pub fn macro_listener_total(&self) -> usize {
        self.macro_listeners.len()
    }

    /// Number of macros currently blamed for a failed selection
    pub fn incorrect_macro_count(&self) -> usize {
        self.incorrect_macros.len()
    }

    pub fn is_blamed(&self, key: &ContainerProperty) -> bool {
        self.incorrect_macros.is_blamed(key)
    }

    /// Containers watched for macro additions and removals
    pub fn existence_watch_count(&self) -> usize {
        self.existence_watch.len()
    }

    /// Recovery attempts made since the last reset
    pub fn recovery_attempts(&self) -> u32 {
        self.recovery_attempts
    }

    /// Start a new recovery budget
    ///
    /// The owner calls this once per dispatch, so the limit only bounds
    /// retries triggered by a single batch of property changes.
    pub fn reset_recovery_attempts(&mut self) {
        self.recovery_attempts = 0;
    }

    /// Take the queued notifications
    pub fn drain_events(&mut self) -> Vec<SurfaceEvent> {
        self.events.drain()
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    // ----------------------------------------------------------------------
    // Attachment
    // ----------------------------------------------------------------------

    fn providers(&self) -> [ProviderHandle; 3] {
        [self.material, self.geometry.data(), self.effect.data()]
    }

    /// Attach to a node: layer material, geometry and effect data into it
    pub fn target_added(&mut self, store: &mut PropertyStore, target: SceneTarget) -> Result<()> {
        if self.target.is_some() {
            return Err(RenderError::AlreadyAttached);
        }

        let providers = self.providers();
        for (i, provider) in providers.iter().enumerate() {
            if let Err(e) = store.add_provider(target.data, *provider) {
                for added in &providers[..i] {
                    if let Err(undo) = store.remove_provider(target.data, *added) {
                        log::warn!(
                            "Surface '{}': could not unlayer {:?} from {:?} after a failed attach: {}",
                            self.name,
                            added,
                            target.data,
                            undo
                        );
                    }
                }
                return Err(e.into());
            }
        }

        self.target = Some(target);
        log::debug!("Surface '{}' attached to {:?}", self.name, target.data);
        Ok(())
    }

    /// Detach from the node, dropping every draw call and listener
    pub fn target_removed(&mut self, store: &mut PropertyStore, links: &mut SurfaceLinks<'_>) -> Result<()> {
        let target = self.target.take().ok_or(RenderError::NotAttached)?;

        self.clear_existence_watch(links);
        self.delete_all_draw_calls(links);
        self.incorrect_macros.clear(links);
        self.recovery_attempts = 0;

        for provider in self.providers() {
            store.remove_provider(target.data, provider)?;
        }

        log::debug!("Surface '{}' detached from {:?}", self.name, target.data);
        Ok(())
    }

    /// The target node left the scene
    pub fn removed(&mut self, links: &mut SurfaceLinks<'_>) {
        self.clear_existence_watch(links);
        self.delete_all_draw_calls(links);
        self.incorrect_macros.clear(links);
        self.recovery_attempts = 0;
    }

    /// Swap the geometry, re-layering its provider if attached
    pub fn set_geometry(&mut self, store: &mut PropertyStore, geometry: Geometry) -> Result<()> {
        if let Some(target) = self.target {
            store.remove_provider(target.data, self.geometry.data())?;
            store.add_provider(target.data, geometry.data())?;
        }
        self.geometry = geometry;
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Draw calls
    // ----------------------------------------------------------------------

    /// Build the draw calls of a renderer context under the current technique
    ///
    /// Any previous draw calls of the context are destroyed first. If some
    /// entry pass has no matching variant the context fails, the surface
    /// switches to the technique's fallback and the list is empty.
    pub fn create_draw_calls(
        &mut self,
        store: &PropertyStore,
        links: &mut SurfaceLinks<'_>,
        renderer_data: ContainerHandle,
    ) -> Result<Vec<DrawCallHandle>> {
        if self.target.is_none() {
            return Err(RenderError::NotAttached);
        }

        self.delete_draw_calls(links, renderer_data);

        let passes = self.effect.technique(&self.technique)?.entry_passes();
        self.contexts
            .insert(renderer_data, ContextState::Building(Vec::new()));

        for pass in &passes {
            let Some(draw_call) = self.initialize_draw_call(store, links, pass, renderer_data, None) else {
                log::debug!(
                    "Surface '{}': pass '{}' of technique '{}' has no matching variant",
                    self.name,
                    pass.name(),
                    self.technique
                );
                self.fail_context(links, renderer_data);
                self.switch_to_fallback_technique()?;
                return Ok(Vec::new());
            };

            if let Some(ContextState::Building(list)) = self.contexts.get_mut(&renderer_data) {
                list.push(draw_call);
            }
            self.events.send(SurfaceEvent::DrawCallAdded {
                renderer_data,
                draw_call,
            });
        }

        let list = match self.contexts.remove(&renderer_data) {
            Some(ContextState::Building(list)) => list,
            _ => Vec::new(),
        };
        self.contexts
            .insert(renderer_data, ContextState::Complete(list.clone()));

        self.recovery_attempts = 0;
        self.watch_macro_addition_or_deletion(links);
        Ok(list)
    }

    /// Select a program for `pass` and create or reconfigure its draw call
    ///
    /// Returns `None` when neither the pass nor any of its fallbacks has a
    /// matching variant. Integer macros that caused the failure are blamed
    /// for (technique, pass); those that matched are forgiven.
    pub fn initialize_draw_call(
        &mut self,
        store: &PropertyStore,
        links: &mut SurfaceLinks<'_>,
        pass: &Arc<Pass>,
        renderer_data: ContainerHandle,
        existing: Option<DrawCallHandle>,
    ) -> Option<DrawCallHandle> {
        let target = self.target?;
        let layers = DataLayers::new(target.data, renderer_data, target.root_data);

        let selection = self.working_program(store, pass, &layers);
        let failure = TechniquePass::new(self.technique.as_str(), pass.id());
        for key in &selection.integer_macros {
            self.incorrect_macros.forgive(links, key, &failure);
        }
        for key in &selection.incorrect_integer_macros {
            self.incorrect_macros.blame(links, key, &failure);
        }

        let program = selection.program?;

        let macro_names = self.chain_macro_names(pass);
        let handle = match existing.filter(|h| self.draw_calls.contains(*h)) {
            Some(handle) => handle,
            None => {
                let handle = self
                    .draw_calls
                    .insert(DrawCall::new(Arc::clone(pass), renderer_data));
                for name in &macro_names {
                    self.macro_draw_calls.insert(name, handle);
                }
                handle
            }
        };

        self.track_macros(store, links, handle, &macro_names, &layers);
        if let Some(draw_call) = self.draw_calls.get_mut(handle) {
            draw_call.configure(program, layers);
        }
        Some(handle)
    }

    /// Walk `pass` and its fallbacks until one has a matching variant
    ///
    /// The macro lists of every pass tried are accumulated.
    pub fn working_program(&self, store: &PropertyStore, pass: &Arc<Pass>, layers: &DataLayers) -> ProgramSelection {
        let mut selection = ProgramSelection::default();

        for candidate in self.pass_chain(pass) {
            selection.merge(candidate.select_program(store, layers));
            if selection.program.is_some() {
                break;
            }
            if let Some(fallback) = candidate.fallback() {
                log::log!(
                    self.config.fallback_level(),
                    "Surface '{}': pass '{}' falls back to '{}'",
                    self.name,
                    candidate.name(),
                    fallback
                );
            }
        }
        selection
    }

    /// Destroy the draw calls of a renderer context
    pub fn delete_draw_calls(&mut self, links: &mut SurfaceLinks<'_>, renderer_data: ContainerHandle) {
        let Some(state) = self.contexts.remove(&renderer_data) else {
            return;
        };

        for &handle in state.draw_calls() {
            self.events.send(SurfaceEvent::DrawCallRemoved {
                renderer_data,
                draw_call: handle,
            });
            self.macro_draw_calls.remove_draw_call(handle);
            if let Some(draw_call) = self.draw_calls.remove(handle) {
                for key in draw_call.macro_keys() {
                    self.macro_listeners.release(links, key);
                }
            }
        }
    }

    /// Destroy the draw calls of every renderer context
    pub fn delete_all_draw_calls(&mut self, links: &mut SurfaceLinks<'_>) {
        for renderer_data in self.renderer_contexts() {
            self.delete_draw_calls(links, renderer_data);
        }
        self.macro_draw_calls.clear();
        self.macro_listeners.clear(links);
    }

    fn fail_context(&mut self, links: &mut SurfaceLinks<'_>, renderer_data: ContainerHandle) {
        self.delete_draw_calls(links, renderer_data);
        self.contexts.insert(renderer_data, ContextState::Failed);
    }

    fn failed_contexts(&self) -> Vec<ContainerHandle> {
        self.contexts
            .iter()
            .filter(|(_, state)| state.is_failed())
            .map(|(c, _)| *c)
            .collect()
    }

    fn pass_chain(&self, pass: &Arc<Pass>) -> Vec<Arc<Pass>> {
        match self.effect.technique(&self.technique) {
            Ok(technique) => technique.fallback_chain(pass),
            Err(_) => vec![Arc::clone(pass)],
        }
    }

    fn chain_macro_names(&self, pass: &Arc<Pass>) -> BTreeSet<String> {
        self.pass_chain(pass)
            .iter()
            .flat_map(|p| p.macro_properties().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    /// Re-resolve the macros of a draw call and move its listener references
    fn track_macros(
        &mut self,
        store: &PropertyStore,
        links: &mut SurfaceLinks<'_>,
        handle: DrawCallHandle,
        names: &BTreeSet<String>,
        layers: &DataLayers,
    ) {
        let keys: Vec<ContainerProperty> = names
            .iter()
            .map(|name| ContainerProperty::resolve(name.as_str(), store, layers))
            .filter(|key| key.container().is_some())
            .collect();

        let Some(draw_call) = self.draw_calls.get_mut(handle) else {
            return;
        };
        let previous = draw_call.replace_macro_keys(keys.clone());

        for key in keys.iter().filter(|k| !previous.contains(k)) {
            self.macro_listeners.retain(links, key);
        }
        for key in previous.iter().filter(|k| !keys.contains(k)) {
            self.macro_listeners.release(links, key);
        }
    }

    // ----------------------------------------------------------------------
    // Macro watches
    // ----------------------------------------------------------------------

    fn watch_macro_addition_or_deletion(&mut self, links: &mut SurfaceLinks<'_>) {
        self.clear_existence_watch(links);
        let Some(target) = self.target else {
            return;
        };

        let mut containers = BTreeSet::from([target.data, target.root_data]);
        containers.extend(
            self.contexts
                .iter()
                .filter(|(_, state)| state.is_complete())
                .map(|(c, _)| *c),
        );

        for container in containers {
            self.existence_watch.push(
                links.connect(PropertySignal::Added(container), Slot::MacroAddedOrRemoved),
            );
            self.existence_watch.push(
                links.connect(PropertySignal::Removed(container), Slot::MacroAddedOrRemoved),
            );
        }
    }

    fn clear_existence_watch(&mut self, links: &mut SurfaceLinks<'_>) {
        for connection in self.existence_watch.drain(..) {
            links.disconnect(connection);
        }
    }

    /// Route a property event delivered through one of this surface's
    /// connections
    pub fn handle_signal(
        &mut self,
        store: &PropertyStore,
        links: &mut SurfaceLinks<'_>,
        slot: &Slot,
        event: &PropertyEvent,
    ) -> Result<()> {
        match slot {
            Slot::MacroAddedOrRemoved | Slot::MacroChanged => {
                self.macro_changed(store, links, event.container, &event.name, event.change)
            }
            Slot::BadMacroChanged(key) => self.bad_macro_changed(store, links, key),
        }
    }

    /// A macro property changed value, appeared or disappeared
    pub fn macro_changed(
        &mut self,
        store: &PropertyStore,
        links: &mut SurfaceLinks<'_>,
        container: ContainerHandle,
        name: &str,
        change: PropertyChange,
    ) -> Result<()> {
        if change != PropertyChange::ReferenceChanged {
            let referenced = self
                .technique_macro_names
                .get(&self.technique)
                .is_some_and(|names| names.contains(name));
            if !referenced {
                return Ok(());
            }
        }

        log::trace!(
            "Surface '{}': macro '{}' {:?} in {:?}",
            self.name,
            name,
            change,
            container
        );

        for handle in self.macro_draw_calls.draw_calls(name) {
            let Some(draw_call) = self.draw_calls.get(handle) else {
                continue;
            };
            let pass = Arc::clone(draw_call.pass());
            let renderer_data = draw_call.renderer_data();

            if self
                .initialize_draw_call(store, links, &pass, renderer_data, Some(handle))
                .is_none()
            {
                self.fail_context(links, renderer_data);
                self.switch_to_fallback_technique()?;
                break;
            }
        }
        Ok(())
    }

    /// A macro blamed for a failed selection changed value
    ///
    /// The technique that failed is tried again. When it is the current one,
    /// the failed renderer contexts are rebuilt in place.
    pub fn bad_macro_changed(
        &mut self,
        store: &PropertyStore,
        links: &mut SurfaceLinks<'_>,
        key: &ContainerProperty,
    ) -> Result<()> {
        let Some(failure) = self.incorrect_macros.first_failure(key).cloned() else {
            return Ok(());
        };

        let failed = self.failed_contexts();
        if failure.technique == self.technique && failed.is_empty() {
            return Ok(());
        }

        if self.recovery_attempts >= self.config.max_recovery_attempts {
            log::warn!(
                "Surface '{}': giving up on recovering technique '{}' after {} attempts",
                self.name,
                failure.technique,
                self.recovery_attempts
            );
            return Ok(());
        }
        self.recovery_attempts += 1;

        if failure.technique != self.technique {
            log::log!(
                self.config.fallback_level(),
                "Surface '{}': macro {:?} changed, retrying technique '{}'",
                self.name,
                key,
                failure.technique
            );
            return self.set_technique(&failure.technique);
        }

        for renderer_data in failed {
            self.create_draw_calls(store, links, renderer_data)?;
        }
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Techniques
    // ----------------------------------------------------------------------

    /// Switch to another technique of the effect
    ///
    /// The owner rebuilds the draw calls on the resulting
    /// [`SurfaceEvent::TechniqueChanged`].
    pub fn set_technique(&mut self, technique: &str) -> Result<()> {
        if technique == self.technique {
            return Ok(());
        }
        if !self.effect.has_technique(technique) {
            return Err(RenderError::TechniqueNotFound(technique.to_string()));
        }

        let previous = std::mem::replace(&mut self.technique, technique.to_string());
        log::info!(
            "Surface '{}': technique '{}' -> '{}'",
            self.name,
            previous,
            self.technique
        );
        self.events.send(SurfaceEvent::TechniqueChanged {
            previous,
            technique: self.technique.clone(),
        });
        Ok(())
    }

    /// Switch to the current technique's fallback, if it declares one
    pub fn switch_to_fallback_technique(&mut self) -> Result<bool> {
        match self.effect.fallback(&self.technique).map(str::to_string) {
            Some(fallback) => {
                log::log!(
                    self.config.fallback_level(),
                    "Surface '{}': technique '{}' falls back to '{}'",
                    self.name,
                    self.technique,
                    fallback
                );
                self.set_technique(&fallback)?;
                Ok(true)
            }
            None => {
                log::warn!(
                    "Surface '{}': technique '{}' cannot be drawn and has no fallback",
                    self.name,
                    self.technique
                );
                Ok(false)
            }
        }
    }
}
