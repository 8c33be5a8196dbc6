//! Passes and program selection
//!
//! A pass is immutable once built and shared by every surface using its
//! effect. Selecting a program evaluates each macro binding against the three
//! data layers of a draw call:
//!
//! - property absent: the macro is left undefined
//! - boolean macro: defined unless the value is `Bool(false)`
//! - integer macro: defined to the value, which must satisfy the binding's
//!   range; out-of-range values make the selection fail
//!
//! Every binding is evaluated even after a failure so the caller learns all
//! of the culprits at once.

use std::sync::Arc;

use void_core::{Id, IdGenerator};
use void_data::{ContainerProperty, DataLayers, PropertyStore, Value};

use crate::binding::{BindingMap, MacroBinding, MacroKind};
use crate::program::{Program, ProgramCache};
use crate::states::RenderStates;
use crate::variants::{ShaderDefine, ShaderVariant};

static PASS_IDS: IdGenerator = IdGenerator::new();

/// Identity of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(Id);

impl PassId {
    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0.raw()
    }
}

/// Outcome of [`Pass::select_program`]
#[derive(Debug, Default)]
pub struct ProgramSelection {
    /// Selected program, `None` when some integer macro mismatched
    pub program: Option<Arc<Program>>,
    /// Boolean macros that resolved
    pub boolean_macros: Vec<ContainerProperty>,
    /// Integer macros that resolved and satisfied their requirement
    pub integer_macros: Vec<ContainerProperty>,
    /// Integer macros whose value violated their requirement
    pub incorrect_integer_macros: Vec<ContainerProperty>,
}

impl ProgramSelection {
    /// Fold a later selection (a fallback pass) into this one
    ///
    /// Macro lists accumulate across a fallback chain; the program is the
    /// later one's.
    pub fn merge(&mut self, other: ProgramSelection) {
        self.program = other.program;
        self.boolean_macros.extend(other.boolean_macros);
        self.integer_macros.extend(other.integer_macros);
        self.incorrect_integer_macros
            .extend(other.incorrect_integer_macros);
    }
}

/// One shading-variant slot of a technique
#[derive(Debug)]
pub struct Pass {
    id: PassId,
    name: String,
    fallback: Option<String>,
    macro_bindings: Vec<(String, MacroBinding)>,
    attribute_bindings: BindingMap,
    uniform_bindings: BindingMap,
    state_bindings: BindingMap,
    states: RenderStates,
    programs: ProgramCache,
}

impl Pass {
    /// Start building a pass
    pub fn builder(name: impl Into<String>) -> PassBuilder {
        PassBuilder::new(name)
    }

    /// Pass identity
    pub fn id(&self) -> PassId {
        self.id
    }

    /// Pass name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the pass to try when this one has no matching variant
    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// Macro name → binding, in declaration order
    pub fn macro_bindings(&self) -> &[(String, MacroBinding)] {
        &self.macro_bindings
    }

    /// Properties the macros read
    pub fn macro_properties(&self) -> impl Iterator<Item = &str> {
        self.macro_bindings.iter().map(|(_, b)| b.property.as_str())
    }

    /// Vertex attribute bindings
    pub fn attribute_bindings(&self) -> &BindingMap {
        &self.attribute_bindings
    }

    /// Uniform bindings
    pub fn uniform_bindings(&self) -> &BindingMap {
        &self.uniform_bindings
    }

    /// Render state bindings
    pub fn state_bindings(&self) -> &BindingMap {
        &self.state_bindings
    }

    /// Static render states
    pub fn states(&self) -> &RenderStates {
        &self.states
    }

    /// Programs selected so far
    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    /// Evaluate the macros against the layers and pick a program
    pub fn select_program(&self, store: &PropertyStore, layers: &DataLayers) -> ProgramSelection {
        let mut selection = ProgramSelection::default();
        let mut variant = ShaderVariant::new(self.name.clone());
        let mut matched = true;

        for (macro_name, binding) in &self.macro_bindings {
            let property = ContainerProperty::resolve(binding.property.clone(), store, layers);
            let Some(value) = property.value(store) else {
                continue;
            };

            match binding.kind {
                MacroKind::Boolean => {
                    if value != &Value::Bool(false) {
                        variant.push(ShaderDefine::new(macro_name.clone()));
                    }
                    selection.boolean_macros.push(property);
                }
                MacroKind::Integer { .. } => {
                    let number = match value {
                        Value::Int(v) => Some(*v),
                        Value::Bool(b) => Some(*b as i64),
                        _ => None,
                    };

                    match number {
                        Some(number) if binding.accepts(number) => {
                            variant.push(ShaderDefine::with_value(macro_name.clone(), number));
                            selection.integer_macros.push(property);
                        }
                        _ => {
                            log::debug!(
                                "Pass '{}': macro {} rejects {:?}",
                                self.name,
                                macro_name,
                                value
                            );
                            matched = false;
                            selection.incorrect_integer_macros.push(property);
                        }
                    }
                }
            }
        }

        if matched {
            selection.program = Some(self.programs.get_or_create(variant));
        }
        selection
    }
}

/// Builder for [`Pass`]
#[derive(Debug)]
pub struct PassBuilder {
    name: String,
    fallback: Option<String>,
    macro_bindings: Vec<(String, MacroBinding)>,
    attribute_bindings: BindingMap,
    uniform_bindings: BindingMap,
    state_bindings: BindingMap,
    states: RenderStates,
}

impl PassBuilder {
    /// Create a new builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fallback: None,
            macro_bindings: Vec::new(),
            attribute_bindings: BindingMap::new(),
            uniform_bindings: BindingMap::new(),
            state_bindings: BindingMap::new(),
            states: RenderStates::default(),
        }
    }

    /// Pass to try when this one has no matching variant
    pub fn fallback(mut self, pass: impl Into<String>) -> Self {
        self.fallback = Some(pass.into());
        self
    }

    /// Add a macro; redeclaring a macro replaces its binding
    pub fn macro_binding(mut self, name: impl Into<String>, binding: MacroBinding) -> Self {
        let name = name.into();
        self.macro_bindings.retain(|(n, _)| *n != name);
        self.macro_bindings.push((name, binding));
        self
    }

    /// Bind a vertex attribute to a property
    pub fn attribute(mut self, name: impl Into<String>, property: impl Into<String>) -> Self {
        self.attribute_bindings.insert(name.into(), property.into());
        self
    }

    /// Bind a uniform to a property
    pub fn uniform(mut self, name: impl Into<String>, property: impl Into<String>) -> Self {
        self.uniform_bindings.insert(name.into(), property.into());
        self
    }

    /// Bind a render state to a property
    pub fn state(mut self, name: impl Into<String>, property: impl Into<String>) -> Self {
        self.state_bindings.insert(name.into(), property.into());
        self
    }

    /// Static render states
    pub fn states(mut self, states: RenderStates) -> Self {
        self.states = states;
        self
    }

    /// Finish the pass
    pub fn build(self) -> Arc<Pass> {
        Arc::new(Pass {
            id: PassId(PASS_IDS.next()),
            name: self.name,
            fallback: self.fallback,
            macro_bindings: self.macro_bindings,
            attribute_bindings: self.attribute_bindings,
            uniform_bindings: self.uniform_bindings,
            state_bindings: self.state_bindings,
            states: self.states,
            programs: ProgramCache::new(),
        })
    }
}
