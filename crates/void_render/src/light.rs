//! Scene lights as root-level properties
//!
//! Lights of one kind form an array published by the [`LightManager`]'s
//! provider, which is layered into the scene root:
//!
//! ```text
//! directionalLights.length        = 2
//! directionalLights[0].color      = Vec3
//! directionalLights[0].direction  = Vec3
//! directionalLights[1].color      = Vec3
//! ...
//! ```
//!
//! Passes bind integer macros to the `.length` properties, so adding or
//! removing a light reselects the programs of every draw call that cares.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use void_data::{ContainerHandle, PropertyStore, ProviderHandle, Value};

use crate::{RenderError, Result};

/// Maximum ambient lights
pub const MAX_AMBIENT_LIGHTS: usize = 8;
/// Maximum directional lights
pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;
/// Maximum point lights
pub const MAX_POINT_LIGHTS: usize = 256;
/// Maximum spot lights
pub const MAX_SPOT_LIGHTS: usize = 128;

/// Light variant, one property array each
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
    Spot,
}

impl LightKind {
    /// Name of the property array
    pub fn array_name(&self) -> &'static str {
        match self {
            LightKind::Ambient => "ambientLights",
            LightKind::Directional => "directionalLights",
            LightKind::Point => "pointLights",
            LightKind::Spot => "spotLights",
        }
    }

    /// Maximum lights of this kind
    pub fn max_lights(&self) -> usize {
        match self {
            LightKind::Ambient => MAX_AMBIENT_LIGHTS,
            LightKind::Directional => MAX_DIRECTIONAL_LIGHTS,
            LightKind::Point => MAX_POINT_LIGHTS,
            LightKind::Spot => MAX_SPOT_LIGHTS,
        }
    }

    /// Property holding the number of lights of this kind
    pub fn length_property(&self) -> String {
        format!("{}.length", self.array_name())
    }
}

/// A light source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Light {
    Ambient {
        color: [f32; 3],
        ambient: f32,
    },
    Directional {
        color: [f32; 3],
        diffuse: f32,
        specular: f32,
        direction: [f32; 3],
    },
    Point {
        color: [f32; 3],
        diffuse: f32,
        specular: f32,
        position: [f32; 3],
        attenuation_distance: f32,
    },
    Spot {
        color: [f32; 3],
        diffuse: f32,
        specular: f32,
        position: [f32; 3],
        direction: [f32; 3],
        /// Radians
        inner_cone_angle: f32,
        /// Radians
        outer_cone_angle: f32,
    },
}

impl Light {
    /// White ambient light
    pub fn ambient(ambient: f32) -> Self {
        Light::Ambient {
            color: [1.0; 3],
            ambient,
        }
    }

    /// White directional light
    pub fn directional(direction: [f32; 3]) -> Self {
        Light::Directional {
            color: [1.0; 3],
            diffuse: 1.0,
            specular: 1.0,
            direction,
        }
    }

    /// White point light
    pub fn point(position: [f32; 3], attenuation_distance: f32) -> Self {
        Light::Point {
            color: [1.0; 3],
            diffuse: 1.0,
            specular: 1.0,
            position,
            attenuation_distance,
        }
    }

    /// White spot light
    pub fn spot(position: [f32; 3], direction: [f32; 3], inner_cone_angle: f32, outer_cone_angle: f32) -> Self {
        Light::Spot {
            color: [1.0; 3],
            diffuse: 1.0,
            specular: 1.0,
            position,
            direction,
            inner_cone_angle,
            outer_cone_angle,
        }
    }

    pub fn kind(&self) -> LightKind {
        match self {
            Light::Ambient { .. } => LightKind::Ambient,
            Light::Directional { .. } => LightKind::Directional,
            Light::Point { .. } => LightKind::Point,
            Light::Spot { .. } => LightKind::Spot,
        }
    }

    pub fn color(&self) -> [f32; 3] {
        match self {
            Light::Ambient { color, .. }
            | Light::Directional { color, .. }
            | Light::Point { color, .. }
            | Light::Spot { color, .. } => *color,
        }
    }

    fn set_color(&mut self, value: [f32; 3]) {
        match self {
            Light::Ambient { color, .. }
            | Light::Directional { color, .. }
            | Light::Point { color, .. }
            | Light::Spot { color, .. } => *color = value,
        }
    }

    /// Field name → value, as published in the light's array slot
    pub fn properties(&self) -> Vec<(&'static str, Value)> {
        let mut fields = vec![("color", Value::Vec3(self.color()))];
        match *self {
            Light::Ambient { ambient, .. } => {
                fields.push(("ambient", Value::Float(ambient)));
            }
            Light::Directional {
                diffuse,
                specular,
                direction,
                ..
            } => {
                fields.push(("diffuse", Value::Float(diffuse)));
                fields.push(("specular", Value::Float(specular)));
                fields.push(("direction", Value::Vec3(direction)));
            }
            Light::Point {
                diffuse,
                specular,
                position,
                attenuation_distance,
                ..
            } => {
                fields.push(("diffuse", Value::Float(diffuse)));
                fields.push(("specular", Value::Float(specular)));
                fields.push(("position", Value::Vec3(position)));
                fields.push(("attenuationDistance", Value::Float(attenuation_distance)));
            }
            Light::Spot {
                diffuse,
                specular,
                position,
                direction,
                inner_cone_angle,
                outer_cone_angle,
                ..
            } => {
                fields.push(("diffuse", Value::Float(diffuse)));
                fields.push(("specular", Value::Float(specular)));
                fields.push(("position", Value::Vec3(position)));
                fields.push(("direction", Value::Vec3(direction)));
                fields.push(("cosInnerConeAngle", Value::Float(inner_cone_angle.cos())));
                fields.push(("cosOuterConeAngle", Value::Float(outer_cone_angle.cos())));
            }
        }
        fields
    }
}

/// Stable identity of a managed light; survives index compaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LightId {
    kind: LightKind,
    serial: u64,
}

impl LightId {
    pub fn kind(&self) -> LightKind {
        self.kind
    }
}

/// Publishes the scene's lights into the root container
#[derive(Debug)]
pub struct LightManager {
    data: ProviderHandle,
    root: Option<ContainerHandle>,
    lights: BTreeMap<LightKind, Vec<(LightId, Light)>>,
    next_serial: u64,
}

impl LightManager {
    /// Create a manager with an empty provider
    pub fn new(store: &mut PropertyStore) -> Self {
        Self {
            data: store.create_provider("lights"),
            root: None,
            lights: BTreeMap::new(),
            next_serial: 0,
        }
    }

    /// Provider holding the light arrays
    pub fn data(&self) -> ProviderHandle {
        self.data
    }

    /// Root container the lights are published in
    pub fn root(&self) -> Option<ContainerHandle> {
        self.root
    }

    /// Layer the lights into a root container, leaving the previous one
    pub fn attach(&mut self, store: &mut PropertyStore, root: ContainerHandle) -> Result<()> {
        if self.root == Some(root) {
            return Ok(());
        }
        self.detach(store)?;
        store.add_provider(root, self.data)?;
        self.root = Some(root);
        log::debug!("Lights attached to root {:?}", root);
        Ok(())
    }

    /// Remove the lights from their root container
    pub fn detach(&mut self, store: &mut PropertyStore) -> Result<()> {
        if let Some(root) = self.root.take() {
            store.remove_provider(root, self.data)?;
        }
        Ok(())
    }

    /// Number of lights of a kind
    pub fn count(&self, kind: LightKind) -> usize {
        self.lights.get(&kind).map_or(0, Vec::len)
    }

    /// Lights of a kind, in array order
    pub fn light_ids(&self, kind: LightKind) -> Vec<LightId> {
        self.slots(kind)
            .map(|slots| slots.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default()
    }

    /// Look up a light
    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.slots(id.kind)?
            .iter()
            .find(|(other, _)| *other == id)
            .map(|(_, light)| light)
    }

    /// Index of a light in its array
    pub fn index_of(&self, id: LightId) -> Option<usize> {
        self.slots(id.kind)?.iter().position(|(other, _)| *other == id)
    }

    /// Append a light to its array
    pub fn add_light(&mut self, store: &mut PropertyStore, light: Light) -> Result<LightId> {
        let kind = light.kind();
        if self.count(kind) >= kind.max_lights() {
            return Err(RenderError::LightLimit { kind, max: kind.max_lights() });
        }

        let id = LightId {
            kind,
            serial: self.next_serial,
        };
        self.next_serial += 1;

        let slots = self.lights.entry(kind).or_default();
        let index = slots.len();
        Self::write_slot(store, self.data, kind, index, &light)?;
        slots.push((id, light));
        store.set(self.data, &kind.length_property(), slots.len())?;

        log::debug!("Added {:?} light at {}[{}]", kind, kind.array_name(), index);
        Ok(id)
    }

    /// Remove a light and shift the following ones down
    pub fn remove_light(&mut self, store: &mut PropertyStore, id: LightId) -> Result<Light> {
        let index = self.index_of(id).ok_or(RenderError::LightNotFound(id))?;
        let kind = id.kind;
        let data = self.data;

        let Some(slots) = self.lights.get_mut(&kind) else {
            return Err(RenderError::LightNotFound(id));
        };
        let (_, removed) = slots.remove(index);

        for (i, (_, light)) in slots.iter().enumerate().skip(index) {
            Self::write_slot(store, data, kind, i, light)?;
        }

        let last = slots.len();
        for (field, _) in removed.properties() {
            store.unset(data, &Self::field_property(kind, last, field))?;
        }

        if slots.is_empty() {
            self.lights.remove(&kind);
        }
        store.set(data, &kind.length_property(), last)?;

        Ok(removed)
    }

    /// Change the color of a light
    pub fn set_color(&mut self, store: &mut PropertyStore, id: LightId, color: [f32; 3]) -> Result<()> {
        let index = self.index_of(id).ok_or(RenderError::LightNotFound(id))?;
        let data = self.data;

        let light = self
            .lights
            .get_mut(&id.kind)
            .and_then(|slots| slots.get_mut(index))
            .map(|(_, light)| light)
            .ok_or(RenderError::LightNotFound(id))?;

        light.set_color(color);
        store.set(data, &Self::field_property(id.kind, index, "color"), Value::Vec3(color))?;
        Ok(())
    }

    /// `"<array>[<index>].<field>"`
    pub fn field_property(kind: LightKind, index: usize, field: &str) -> String {
        format!("{}[{}].{}", kind.array_name(), index, field)
    }

    fn slots(&self, kind: LightKind) -> Option<&Vec<(LightId, Light)>> {
        self.lights.get(&kind)
    }

    fn write_slot(
        store: &mut PropertyStore,
        data: ProviderHandle,
        kind: LightKind,
        index: usize,
        light: &Light,
    ) -> Result<()> {
        for (field, value) in light.properties() {
            store.set(data, &Self::field_property(kind, index, field), value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (PropertyStore, LightManager, ContainerHandle) {
        let mut store = PropertyStore::new();
        let root = store.create_container("root");
        let mut lights = LightManager::new(&mut store);
        lights.attach(&mut store, root).unwrap();
        (store, lights, root)
    }

    #[test]
    fn test_lights_publish_arrays() {
        let (mut store, mut lights, root) = manager();

        let sun = lights.add_light(&mut store, Light::directional([0.0, -1.0, 0.0])).unwrap();
        lights.add_light(&mut store, Light::ambient(0.2)).unwrap();

        assert_eq!(store.get(root, "directionalLights.length"), Some(&Value::Int(1)));
        assert_eq!(store.get(root, "ambientLights.length"), Some(&Value::Int(1)));
        assert_eq!(
            store.get(root, "directionalLights[0].direction"),
            Some(&Value::Vec3([0.0, -1.0, 0.0]))
        );

        lights.set_color(&mut store, sun, [1.0, 0.5, 0.0]).unwrap();
        assert_eq!(
            store.get(root, "directionalLights[0].color"),
            Some(&Value::Vec3([1.0, 0.5, 0.0]))
        );
    }

    #[test]
    fn test_removal_compacts_indices() {
        let (mut store, mut lights, root) = manager();

        let a = lights.add_light(&mut store, Light::point([1.0, 0.0, 0.0], 10.0)).unwrap();
        let b = lights.add_light(&mut store, Light::point([2.0, 0.0, 0.0], 10.0)).unwrap();

        lights.remove_light(&mut store, a).unwrap();

        assert_eq!(lights.index_of(b), Some(0));
        assert_eq!(store.get(root, "pointLights.length"), Some(&Value::Int(1)));
        assert_eq!(
            store.get(root, "pointLights[0].position"),
            Some(&Value::Vec3([2.0, 0.0, 0.0]))
        );
        assert!(!store.has(root, "pointLights[1].position"));
        assert!(matches!(
            lights.remove_light(&mut store, a),
            Err(RenderError::LightNotFound(_))
        ));
    }

    #[test]
    fn test_light_limit() {
        let (mut store, mut lights, _) = manager();
        for _ in 0..MAX_DIRECTIONAL_LIGHTS {
            lights.add_light(&mut store, Light::directional([0.0, 0.0, -1.0])).unwrap();
        }
        assert_eq!(LightKind::Directional.max_lights(), MAX_DIRECTIONAL_LIGHTS);
        assert_eq!(
            lights.add_light(&mut store, Light::directional([0.0, 0.0, -1.0])),
            Err(RenderError::LightLimit {
                kind: LightKind::Directional,
                max: MAX_DIRECTIONAL_LIGHTS,
            })
        );
        assert_eq!(lights.count(LightKind::Directional), MAX_DIRECTIONAL_LIGHTS);
    }

    #[test]
    fn test_moving_to_another_root() {
        let (mut store, mut lights, root) = manager();
        lights.add_light(&mut store, Light::ambient(1.0)).unwrap();

        let other = store.create_container("other root");
        lights.attach(&mut store, other).unwrap();

        assert!(!store.has(root, "ambientLights.length"));
        assert!(store.has(other, "ambientLights.length"));
        assert_eq!(lights.root(), Some(other));
    }
}
