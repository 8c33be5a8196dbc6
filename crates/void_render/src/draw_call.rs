//! Draw calls
//!
//! A draw call is the unit a renderer submits: a selected program, the
//! attribute/uniform/state bindings and static states of the pass that
//! produced it, and the three data layers its bindings are looked up in.
//! Draw calls are owned by the surface that created them and referenced by
//! handle everywhere else.

use std::collections::BTreeMap;
use std::sync::Arc;

use void_core::Handle;
use void_data::{ContainerHandle, ContainerProperty, DataLayers, PropertyStore, Value};
use void_shader::{BindingMap, Pass, Program, RenderStates};

/// Handle to a draw call in its surface's arena
pub type DrawCallHandle = Handle<DrawCall>;

/// One drawable pass of a surface for one renderer context
#[derive(Debug)]
pub struct DrawCall {
    pass: Arc<Pass>,
    renderer_data: ContainerHandle,
    attribute_bindings: BindingMap,
    uniform_bindings: BindingMap,
    state_bindings: BindingMap,
    states: RenderStates,
    program: Option<Arc<Program>>,
    layers: Option<DataLayers>,
    macro_keys: Vec<ContainerProperty>,
}

impl DrawCall {
    /// Create an unconfigured draw call from a pass's bindings and states
    pub fn new(pass: Arc<Pass>, renderer_data: ContainerHandle) -> Self {
        Self {
            attribute_bindings: pass.attribute_bindings().clone(),
            uniform_bindings: pass.uniform_bindings().clone(),
            state_bindings: pass.state_bindings().clone(),
            states: pass.states().clone(),
            pass,
            renderer_data,
            program: None,
            layers: None,
            macro_keys: Vec::new(),
        }
    }

    /// Bind a program and the containers the bindings read from
    pub fn configure(&mut self, program: Arc<Program>, layers: DataLayers) {
        self.program = Some(program);
        self.layers = Some(layers);
    }

    /// Entry pass this draw call was created for
    pub fn pass(&self) -> &Arc<Pass> {
        &self.pass
    }

    /// Renderer context the draw call belongs to
    pub fn renderer_data(&self) -> ContainerHandle {
        self.renderer_data
    }

    /// Bound program
    pub fn program(&self) -> Option<&Arc<Program>> {
        self.program.as_ref()
    }

    /// Bound data layers
    pub fn layers(&self) -> Option<&DataLayers> {
        self.layers.as_ref()
    }

    /// Check if a program and containers are bound
    pub fn is_configured(&self) -> bool {
        self.program.is_some() && self.layers.is_some()
    }

    pub fn attribute_bindings(&self) -> &BindingMap {
        &self.attribute_bindings
    }

    pub fn uniform_bindings(&self) -> &BindingMap {
        &self.uniform_bindings
    }

    pub fn state_bindings(&self) -> &BindingMap {
        &self.state_bindings
    }

    pub fn states(&self) -> &RenderStates {
        &self.states
    }

    /// Resolved macros this draw call holds a listener reference on
    pub fn macro_keys(&self) -> &[ContainerProperty] {
        &self.macro_keys
    }

    pub(crate) fn replace_macro_keys(&mut self, keys: Vec<ContainerProperty>) -> Vec<ContainerProperty> {
        std::mem::replace(&mut self.macro_keys, keys)
    }

    /// Uniform name → current value, skipping unresolved properties
    pub fn resolve_uniforms(&self, store: &PropertyStore) -> BTreeMap<String, Value> {
        self.resolve(store, &self.uniform_bindings)
    }

    /// Attribute name → current value, skipping unresolved properties
    pub fn resolve_attributes(&self, store: &PropertyStore) -> BTreeMap<String, Value> {
        self.resolve(store, &self.attribute_bindings)
    }

    /// State name → current value, skipping unresolved properties
    pub fn resolve_states(&self, store: &PropertyStore) -> BTreeMap<String, Value> {
        self.resolve(store, &self.state_bindings)
    }

    fn resolve(&self, store: &PropertyStore, bindings: &BindingMap) -> BTreeMap<String, Value> {
        let Some(layers) = &self.layers else {
            return BTreeMap::new();
        };

        bindings
            .iter()
            .filter_map(|(input, property)| {
                layers
                    .get(store, property)
                    .map(|value| (input.clone(), value.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use void_shader::MacroBinding;

    #[test]
    fn test_bindings_resolve_through_layers() {
        let mut store = PropertyStore::new();
        let target = store.create_container("target");
        let renderer = store.create_container("renderer");
        let root = store.create_container("root");

        let material = store.create_provider("material");
        store.set(material, "material.diffuseColor", Value::Vec4([1.0, 0.0, 0.0, 1.0])).unwrap();
        store.add_provider(target, material).unwrap();

        let camera = store.create_provider("camera");
        store.set(camera, "camera.viewProjection", Value::Mat4([0.0; 16])).unwrap();
        store.set(camera, "material.diffuseColor", Value::Vec4([0.0, 0.0, 0.0, 1.0])).unwrap();
        store.add_provider(renderer, camera).unwrap();

        let pass = Pass::builder("main")
            .macro_binding("DIFFUSE_MAP", MacroBinding::boolean("material.diffuseMap"))
            .uniform("uDiffuseColor", "material.diffuseColor")
            .uniform("uViewProjection", "camera.viewProjection")
            .uniform("uFog", "scene.fogColor")
            .attribute("aPosition", "geometry.position")
            .build();
        let program = pass
            .select_program(&store, &DataLayers::new(target, renderer, root))
            .program
            .unwrap();

        let mut draw_call = DrawCall::new(Arc::clone(&pass), renderer);
        assert!(!draw_call.is_configured());
        assert!(draw_call.resolve_uniforms(&store).is_empty());

        draw_call.configure(program, DataLayers::new(target, renderer, root));
        assert!(draw_call.is_configured());

        let uniforms = draw_call.resolve_uniforms(&store);
        assert_eq!(uniforms.len(), 2);
        assert_eq!(uniforms["uDiffuseColor"], Value::Vec4([1.0, 0.0, 0.0, 1.0]));
        assert!(draw_call.resolve_attributes(&store).is_empty());
        assert_eq!(draw_call.renderer_data(), renderer);
        assert_eq!(draw_call.pass().name(), "main");
    }
}
