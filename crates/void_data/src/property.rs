//! Properties resolved across the three data layers of a draw call

use std::fmt;

use crate::store::{ContainerHandle, PropertyStore};
use crate::value::Value;

/// The containers a draw call reads from, in lookup precedence order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DataLayers {
    /// Data of the node the surface is attached to
    pub target: ContainerHandle,
    /// Per renderer-pass globals
    pub renderer: ContainerHandle,
    /// Data of the scene root
    pub root: ContainerHandle,
}

impl DataLayers {
    /// Bundle the three layers
    pub fn new(target: ContainerHandle, renderer: ContainerHandle, root: ContainerHandle) -> Self {
        Self { target, renderer, root }
    }

    /// Layers in precedence order
    pub fn ordered(&self) -> [ContainerHandle; 3] {
        [self.target, self.renderer, self.root]
    }

    /// First layer defining `name`
    pub fn resolve(&self, store: &PropertyStore, name: &str) -> Option<ContainerHandle> {
        self.ordered().into_iter().find(|c| store.has(*c, name))
    }

    /// Value of `name` in the first layer defining it
    pub fn get<'a>(&self, store: &'a PropertyStore, name: &str) -> Option<&'a Value> {
        self.ordered().into_iter().find_map(|c| store.get(c, name))
    }
}

/// A property name bound to the container it resolves in
///
/// Two references to the same name resolving in the same container are
/// equal, so they collapse to a single listener. `container` is `None` when
/// no candidate layer defines the name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ContainerProperty {
    name: String,
    container: Option<ContainerHandle>,
}

impl ContainerProperty {
    /// Reference a name in a known container
    pub fn new(name: impl Into<String>, container: ContainerHandle) -> Self {
        Self {
            name: name.into(),
            container: Some(container),
        }
    }

    /// Resolve a name against the layers, target first
    pub fn resolve(name: impl Into<String>, store: &PropertyStore, layers: &DataLayers) -> Self {
        let name = name.into();
        let container = layers.resolve(store, &name);
        Self { name, container }
    }

    /// Property name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Container the name resolves in
    pub fn container(&self) -> Option<ContainerHandle> {
        self.container
    }

    /// Current value
    pub fn value<'a>(&self, store: &'a PropertyStore) -> Option<&'a Value> {
        store.get(self.container?, &self.name)
    }
}

impl fmt::Debug for ContainerProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.container {
            Some(c) => write!(f, "'{}'@{}v{}", self.name, c.index(), c.generation()),
            None => write!(f, "'{}'@unresolved", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_precedence() {
        let mut store = PropertyStore::new();
        let target = store.create_container("target");
        let renderer = store.create_container("renderer");
        let root = store.create_container("root");
        let layers = DataLayers::new(target, renderer, root);

        let lights = store.create_provider("lights");
        store.set(lights, "NUM_LIGHTS", 1).unwrap();
        store.add_provider(root, lights).unwrap();

        let pass_globals = store.create_provider("pass");
        store.set(pass_globals, "NUM_LIGHTS", 4).unwrap();
        store.add_provider(renderer, pass_globals).unwrap();

        let m = ContainerProperty::resolve("NUM_LIGHTS", &store, &layers);
        assert_eq!(m.container(), Some(renderer));
        assert_eq!(m.value(&store), Some(&Value::Int(4)));
        assert_eq!(m, ContainerProperty::new("NUM_LIGHTS", renderer));

        let missing = ContainerProperty::resolve("FOG", &store, &layers);
        assert_eq!(missing.container(), None);
        assert_eq!(missing.value(&store), None);
    }
}
