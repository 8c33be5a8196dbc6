//! Integration tests for surface draw-call compilation
//!
//! Drives surfaces through a `SurfaceSystem` so that property events are
//! dispatched exactly as they are at runtime:
//! - Listener reference counts
//! - Pass and technique fallback
//! - Blame and recovery
//! - Teardown

use std::sync::Arc;

use void_data::{ContainerHandle, ContainerProperty, PropertySignal, ProviderHandle};
use void_render::{
    ContextState, Geometry, Light, LightKind, LightManager, RenderConfig, SceneTarget, Surface, SurfaceEvent,
    SurfaceHandle, SurfaceSystem,
};
use void_shader::{Effect, MacroBinding, Pass, Technique};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct World {
    system: SurfaceSystem,
    node: ContainerHandle,
    root: ContainerHandle,
    renderer: ContainerHandle,
    material: ProviderHandle,
    globals: ProviderHandle,
}

impl World {
    fn new() -> Self {
        Self::with_config(RenderConfig::default())
    }

    fn with_config(config: RenderConfig) -> Self {
        init_logging();
        let mut system = SurfaceSystem::new(config);
        let node = system.create_container("node");
        let root = system.create_container("root");
        let renderer = system.create_container("renderer");
        let material = system.create_provider("material");
        let globals = system.create_provider("scene globals");
        system.add_provider(root, globals).unwrap();
        Self {
            system,
            node,
            root,
            renderer,
            material,
            globals,
        }
    }

    fn effect(&mut self, techniques: Vec<Technique>) -> Arc<Effect> {
        let data = self.system.create_provider("effect");
        techniques
            .into_iter()
            .fold(Effect::builder("test"), |builder, t| builder.technique(t))
            .build(data)
            .unwrap()
    }

    fn surface(&mut self, effect: Arc<Effect>, technique: &str) -> SurfaceHandle {
        let geometry = self
            .system
            .update(|store| Ok(Geometry::new(store, "mesh")))
            .unwrap();
        let surface = Surface::new("mesh", geometry, self.material, effect, technique).unwrap();
        let handle = self.system.add_surface(surface);
        self.system
            .attach(handle, SceneTarget::new(self.node, self.root))
            .unwrap();
        handle
    }

    fn surface_ref(&self, handle: SurfaceHandle) -> &Surface {
        self.system.surface(handle).unwrap()
    }

    fn reference_listeners(&self, container: ContainerHandle, name: &str) -> usize {
        self.system
            .signals()
            .connection_count(&PropertySignal::ReferenceChanged(container, name.to_string()))
    }

    fn added_events(&mut self) -> usize {
        self.system
            .drain_events()
            .iter()
            .filter(|(_, e)| matches!(e, SurfaceEvent::DrawCallAdded { .. }))
            .count()
    }
}

fn requires_two_lights() -> MacroBinding {
    MacroBinding::integer("numLights").range(2, 2)
}

#[test]
fn test_listener_count_matches_dependent_draw_calls() {
    let mut world = World::new();
    world.system.set_property(world.globals, "numLights", 1).unwrap();

    let second_renderer = world.system.create_container("second renderer");
    let camera = world.system.create_provider("camera");
    world.system.add_provider(second_renderer, camera).unwrap();

    let technique = Technique::new(
        "default",
        vec![
            Pass::builder("depth")
                .macro_binding("NUM_LIGHTS", MacroBinding::integer("numLights"))
                .build(),
            Pass::builder("color")
                .macro_binding("NUM_LIGHTS", MacroBinding::integer("numLights"))
                .build(),
        ],
    );
    let effect = world.effect(vec![technique]);
    let surface = world.surface(effect, "default");

    world.system.create_draw_calls(surface, world.renderer).unwrap();
    world.system.create_draw_calls(surface, second_renderer).unwrap();

    let at_root = ContainerProperty::new("numLights", world.root);
    let at_camera = ContainerProperty::new("numLights", second_renderer);
    assert_eq!(world.surface_ref(surface).macro_listener_count(&at_root), 4);
    assert_eq!(world.reference_listeners(world.root, "numLights"), 1);

    // Shadow the root value for the second renderer only
    world.system.set_property(camera, "numLights", 3).unwrap();
    assert_eq!(world.surface_ref(surface).macro_listener_count(&at_root), 2);
    assert_eq!(world.surface_ref(surface).macro_listener_count(&at_camera), 2);
    assert_eq!(world.reference_listeners(second_renderer, "numLights"), 1);

    world.system.unset_property(camera, "numLights").unwrap();
    assert_eq!(world.surface_ref(surface).macro_listener_count(&at_root), 4);
    assert_eq!(world.surface_ref(surface).macro_listener_count(&at_camera), 0);
    assert_eq!(world.reference_listeners(second_renderer, "numLights"), 0);

    world.system.delete_draw_calls(surface, world.renderer).unwrap();
    assert_eq!(world.surface_ref(surface).macro_listener_count(&at_root), 2);
    world.system.delete_draw_calls(surface, second_renderer).unwrap();
    assert_eq!(world.surface_ref(surface).macro_listener_count(&at_root), 0);
    assert_eq!(world.reference_listeners(world.root, "numLights"), 0);
}

#[test]
fn test_create_draw_calls_twice() {
    let mut world = World::new();
    world.system.set_property(world.globals, "numLights", 2).unwrap();
    let technique = Technique::new(
        "default",
        vec![Pass::builder("main").macro_binding("NUM_LIGHTS", requires_two_lights()).build()],
    );
    let effect = world.effect(vec![technique]);
    let surface = world.surface(effect, "default");

    let first = world.system.create_draw_calls(surface, world.renderer).unwrap();
    let describe = |world: &World, list: &[void_render::DrawCallHandle]| {
        list.iter()
            .map(|h| {
                let dc = world.surface_ref(surface).draw_call(*h).unwrap();
                (dc.pass().name().to_string(), dc.program().unwrap().id())
            })
            .collect::<Vec<_>>()
    };
    let first_description = describe(&world, &first);
    let connections = world.system.connection_count(surface);

    let second = world.system.create_draw_calls(surface, world.renderer).unwrap();
    assert_eq!(describe(&world, &second), first_description);
    assert_eq!(world.system.connection_count(surface), connections);
    assert_eq!(world.reference_listeners(world.root, "numLights"), 1);
}

#[test]
fn test_blamed_macro_recovers_fallen_back_technique() {
    let mut world = World::new();
    world.system.set_property(world.globals, "numLights", 0).unwrap();

    let effect = world.effect(vec![
        Technique::new(
            "lit",
            vec![Pass::builder("main").macro_binding("NUM_LIGHTS", requires_two_lights()).build()],
        )
        .with_fallback("unlit"),
        Technique::new("unlit", vec![Pass::builder("flat").build()]),
    ]);
    let surface = world.surface(effect, "lit");

    let draw_calls = world.system.create_draw_calls(surface, world.renderer).unwrap();
    assert_eq!(draw_calls.len(), 1);
    assert_eq!(world.surface_ref(surface).technique(), "unlit");

    let num_lights = ContainerProperty::new("numLights", world.root);
    assert!(world.surface_ref(surface).is_blamed(&num_lights));

    world.system.drain_events();
    world.system.set_property(world.globals, "numLights", 2).unwrap();

    let s = world.surface_ref(surface);
    assert_eq!(s.technique(), "lit");
    assert!(!s.is_blamed(&num_lights));
    assert_eq!(s.incorrect_macro_count(), 0);

    let draw_calls = s.draw_calls(world.renderer);
    assert_eq!(draw_calls.len(), 1);
    assert_eq!(s.draw_call(draw_calls[0]).unwrap().pass().name(), "main");

    let events = world.system.drain_events();
    assert!(matches!(
        &events[0].1,
        SurfaceEvent::TechniqueChanged { previous, technique } if previous == "unlit" && technique == "lit"
    ));
}

#[test]
fn test_blamed_macro_rebuilds_failed_context_in_place() {
    let mut world = World::new();
    world.system.set_property(world.globals, "numLights", 0).unwrap();

    let effect = world.effect(vec![Technique::new(
        "default",
        vec![Pass::builder("main").macro_binding("NUM_LIGHTS", requires_two_lights()).build()],
    )]);
    let surface = world.surface(effect, "default");

    assert!(world
        .system
        .create_draw_calls(surface, world.renderer)
        .unwrap()
        .is_empty());
    assert_eq!(
        world.surface_ref(surface).context_state(world.renderer),
        Some(&ContextState::Failed)
    );

    world.system.set_property(world.globals, "numLights", 2).unwrap();

    let s = world.surface_ref(surface);
    assert_eq!(s.draw_calls(world.renderer).len(), 1);
    assert_eq!(s.incorrect_macro_count(), 0);
}

#[test]
fn test_fallback_pass_makes_one_draw_call() {
    let mut world = World::new();
    world.system.set_property(world.globals, "numLights", 0).unwrap();

    let effect = world.effect(vec![Technique::new(
        "default",
        vec![
            Pass::builder("main")
                .macro_binding("NUM_LIGHTS", requires_two_lights())
                .fallback("low")
                .build(),
            Pass::builder("low").build(),
        ],
    )]);
    let surface = world.surface(effect, "default");
    world.system.drain_events();

    let draw_calls = world.system.create_draw_calls(surface, world.renderer).unwrap();
    assert_eq!(draw_calls.len(), 1);
    assert_eq!(world.added_events(), 1);

    let program = world
        .surface_ref(surface)
        .draw_call(draw_calls[0])
        .and_then(|dc| dc.program())
        .unwrap();
    assert_eq!(program.variant().name, "low");

    // Enough lights: the same draw call upgrades to the main pass
    world.system.set_property(world.globals, "numLights", 2).unwrap();
    let s = world.surface_ref(surface);
    let program = s.draw_call(draw_calls[0]).and_then(|dc| dc.program()).unwrap();
    assert_eq!(program.variant().name, "main");
    assert_eq!(program.variant().value_of("NUM_LIGHTS"), Some(2));
    assert_eq!(s.incorrect_macro_count(), 0);
}

#[test]
fn test_failure_without_fallback() {
    let mut world = World::new();
    world.system.set_property(world.globals, "numLights", 7).unwrap();

    let effect = world.effect(vec![Technique::new(
        "default",
        vec![
            Pass::builder("first").macro_binding("NUM_LIGHTS", requires_two_lights()).build(),
            Pass::builder("second").macro_binding("NUM_LIGHTS", requires_two_lights()).build(),
        ],
    )]);
    let surface = world.surface(effect, "default");
    world.system.drain_events();

    let draw_calls = world.system.create_draw_calls(surface, world.renderer).unwrap();
    assert!(draw_calls.is_empty());
    assert_eq!(world.added_events(), 0);
    assert_eq!(world.surface_ref(surface).technique(), "default");
    assert_eq!(world.surface_ref(surface).draw_call_count(), 0);
}

#[test]
fn test_node_removed_releases_everything() {
    let mut world = World::new();
    world.system.set_property(world.globals, "numLights", 0).unwrap();

    let effect = world.effect(vec![Technique::new(
        "default",
        vec![
            Pass::builder("main")
                .macro_binding("NUM_LIGHTS", requires_two_lights())
                .macro_binding("FOG", MacroBinding::boolean("fog"))
                .fallback("low")
                .build(),
            Pass::builder("low").build(),
        ],
    )]);
    let surface = world.surface(effect, "default");
    world.system.create_draw_calls(surface, world.renderer).unwrap();
    assert!(world.system.connection_count(surface) > 0);
    assert_eq!(world.surface_ref(surface).incorrect_macro_count(), 1);

    world.system.node_removed(surface).unwrap();

    let s = world.surface_ref(surface);
    assert_eq!(s.draw_call_count(), 0);
    assert_eq!(s.macro_listener_total(), 0);
    assert_eq!(s.incorrect_macro_count(), 0);
    assert_eq!(world.system.connection_count(surface), 0);

    // Later changes reach nothing
    world.system.set_property(world.globals, "numLights", 2).unwrap();
    assert_eq!(world.surface_ref(surface).draw_call_count(), 0);
}

#[test]
fn test_same_technique_is_a_no_op() {
    let mut world = World::new();
    let effect = world.effect(vec![
        Technique::new("default", vec![Pass::builder("main").build()]),
        Technique::new("other", vec![Pass::builder("main").build()]),
    ]);
    let surface = world.surface(effect, "default");
    let draw_calls = world.system.create_draw_calls(surface, world.renderer).unwrap();
    world.system.drain_events();

    world.system.set_technique(surface, "default").unwrap();
    assert!(world.system.drain_events().is_empty());
    assert_eq!(world.surface_ref(surface).draw_calls(world.renderer), &draw_calls[..]);

    assert!(world.system.set_technique(surface, "missing").is_err());

    world.system.set_technique(surface, "other").unwrap();
    let events = world.system.drain_events();
    assert!(matches!(events[0].1, SurfaceEvent::TechniqueChanged { .. }));
    assert!(matches!(events[1].1, SurfaceEvent::DrawCallRemoved { .. }));
    assert!(matches!(events[2].1, SurfaceEvent::DrawCallAdded { .. }));
}

#[test]
fn test_lights_drive_integer_macros() {
    let mut world = World::new();
    let effect = world.effect(vec![
        Technique::new(
            "lit",
            vec![Pass::builder("main")
                .macro_binding(
                    "NUM_DIRECTIONAL_LIGHTS",
                    MacroBinding::integer("directionalLights.length").range(1, 4),
                )
                .build()],
        )
        .with_fallback("unlit"),
        Technique::new("unlit", vec![Pass::builder("flat").build()]),
    ]);

    let root = world.root;
    let mut lights = world
        .system
        .update(|store| {
            let mut lights = LightManager::new(store);
            lights.attach(store, root)?;
            Ok(lights)
        })
        .unwrap();
    let sun = world
        .system
        .update(|store| lights.add_light(store, Light::directional([0.0, -1.0, 0.0])))
        .unwrap();

    let surface = world.surface(effect, "lit");
    let draw_calls = world.system.create_draw_calls(surface, world.renderer).unwrap();
    let program_defines = |world: &World| {
        let s = world.surface_ref(surface);
        s.draw_calls(world.renderer)
            .first()
            .and_then(|h| s.draw_call(*h))
            .and_then(|dc| dc.program())
            .map(|p| (p.variant().name.clone(), p.variant().value_of("NUM_DIRECTIONAL_LIGHTS")))
    };
    assert_eq!(draw_calls.len(), 1);
    assert_eq!(program_defines(&world), Some(("main".to_string(), Some(1))));

    world
        .system
        .update(|store| lights.add_light(store, Light::directional([1.0, 0.0, 0.0])))
        .unwrap();
    assert_eq!(program_defines(&world), Some(("main".to_string(), Some(2))));

    // No light left: the lit technique cannot be drawn
    let left = world
        .system
        .update(|store| {
            lights.remove_light(store, sun)?;
            Ok(lights.count(LightKind::Directional))
        })
        .unwrap();
    assert_eq!(left, 1);
    assert_eq!(program_defines(&world), Some(("main".to_string(), Some(1))));

    let remaining = lights.light_ids(LightKind::Directional);
    world
        .system
        .update(|store| {
            for id in remaining {
                lights.remove_light(store, id)?;
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(world.surface_ref(surface).technique(), "unlit");
    assert_eq!(program_defines(&world), Some(("flat".to_string(), None)));

    // A light comes back: the blamed macro brings the lit technique back
    world
        .system
        .update(|store| lights.add_light(store, Light::directional([0.0, 0.0, -1.0])))
        .unwrap();
    assert_eq!(world.surface_ref(surface).technique(), "lit");
    assert_eq!(program_defines(&world), Some(("main".to_string(), Some(1))));
}

#[test]
fn test_technique_switch_cascade_is_bounded() {
    let config = RenderConfig::from_json(r#"{ "max_technique_switches": 3 }"#).unwrap();
    let mut world = World::with_config(config);
    world.system.set_property(world.globals, "numLights", 0).unwrap();

    let failing = |name: &str, fallback: &str| {
        Technique::new(
            name,
            vec![Pass::builder("main").macro_binding("NUM_LIGHTS", requires_two_lights()).build()],
        )
        .with_fallback(fallback)
    };
    let effect = world.effect(vec![failing("a", "b"), failing("b", "a")]);
    let surface = world.surface(effect, "a");

    let draw_calls = world.system.create_draw_calls(surface, world.renderer).unwrap();
    assert!(draw_calls.is_empty());

    let switches = world
        .system
        .drain_events()
        .iter()
        .filter(|(_, e)| matches!(e, SurfaceEvent::TechniqueChanged { .. }))
        .count();
    assert_eq!(switches, 4);
}

#[test]
fn test_detach_unlayers_providers() {
    let mut world = World::new();
    let effect = world.effect(vec![Technique::new("default", vec![Pass::builder("main").build()])]);
    let surface = world.surface(effect, "default");
    let geometry = world.surface_ref(surface).geometry().data();
    world.system.create_draw_calls(surface, world.renderer).unwrap();

    world.system.detach(surface).unwrap();
    assert!(!world.system.store().is_layered(world.node, world.material));
    assert!(!world.system.store().is_layered(world.node, geometry));
    assert_eq!(world.system.connection_count(surface), 0);
    assert!(world.system.detach(surface).is_err());

    // Attach again, elsewhere
    let other = world.system.create_container("other node");
    world
        .system
        .attach(surface, SceneTarget::new(other, world.root))
        .unwrap();
    assert!(world.system.store().is_layered(other, world.material));
    assert_eq!(
        world.system.create_draw_calls(surface, world.renderer).unwrap().len(),
        1
    );
}

#[test]
fn test_failed_context_recovers_after_many_bad_values() {
    let mut world = World::new();
    world.system.set_property(world.globals, "numLights", 0).unwrap();

    let effect = world.effect(vec![Technique::new(
        "default",
        vec![Pass::builder("main").macro_binding("NUM_LIGHTS", requires_two_lights()).build()],
    )]);
    let surface = world.surface(effect, "default");
    assert!(world
        .system
        .create_draw_calls(surface, world.renderer)
        .unwrap()
        .is_empty());

    // More rejected values than the recovery limit, one change at a time
    for num_lights in 3..8 {
        world.system.set_property(world.globals, "numLights", num_lights).unwrap();
        let s = world.surface_ref(surface);
        assert_eq!(s.context_state(world.renderer), Some(&ContextState::Failed));
        assert_eq!(s.recovery_attempts(), 1);
    }

    world.system.set_property(world.globals, "numLights", 2).unwrap();
    let s = world.surface_ref(surface);
    assert_eq!(s.draw_calls(world.renderer).len(), 1);
    assert!(s.context_state(world.renderer).unwrap().is_complete());
    assert_eq!(s.incorrect_macro_count(), 0);
}

#[test]
fn test_macro_removed_from_every_layer() {
    let mut world = World::new();
    world.system.set_property(world.material, "numBones", 4).unwrap();

    let effect = world.effect(vec![Technique::new(
        "default",
        vec![Pass::builder("skinned")
            .macro_binding("NUM_BONES", MacroBinding::integer("numBones"))
            .build()],
    )]);
    let surface = world.surface(effect, "default");
    let draw_calls = world.system.create_draw_calls(surface, world.renderer).unwrap();
    assert_eq!(draw_calls.len(), 1);

    let num_bones = |world: &World| {
        world
            .surface_ref(surface)
            .draw_call(draw_calls[0])
            .and_then(|dc| dc.program())
            .map(|p| p.variant().value_of("NUM_BONES"))
    };
    assert_eq!(num_bones(&world), Some(Some(4)));
    assert_eq!(world.surface_ref(surface).macro_listener_total(), 1);
    assert_eq!(world.reference_listeners(world.node, "numBones"), 1);

    world.system.unset_property(world.material, "numBones").unwrap();
    assert_eq!(num_bones(&world), Some(None));
    assert_eq!(world.surface_ref(surface).macro_listener_total(), 0);
    assert_eq!(world.reference_listeners(world.node, "numBones"), 0);

    // Coming back re-attaches the listener to the same draw call
    world.system.set_property(world.material, "numBones", 8).unwrap();
    assert_eq!(num_bones(&world), Some(Some(8)));
    assert_eq!(world.surface_ref(surface).macro_listener_total(), 1);
    assert_eq!(world.reference_listeners(world.node, "numBones"), 1);
}
