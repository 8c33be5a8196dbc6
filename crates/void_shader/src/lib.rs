//! # Void Shader
//!
//! Effect model and shader-variant selection for Void Engine:
//! - Macro, attribute, uniform and state bindings
//! - Static render state blocks
//! - Passes with program selection and fallback pass names
//! - Techniques and effects with fallback techniques
//! - Per-pass program cache keyed by shader variant
//!
//! ## Architecture
//!
//! ```text
//! Effect ──► Technique ──► Pass ──select_program(layers)──► ShaderVariant ──► ProgramCache ──► Program
//!                            │
//!                            └─► fallback pass (by name, within the technique)
//! ```
//!
//! Source compilation is left to the GPU backend; a `Program` is the identity
//! of one selected variant.

pub mod binding;
pub mod effect;
pub mod pass;
pub mod program;
pub mod states;
pub mod variants;

pub use binding::{BindingMap, MacroBinding, MacroKind};
pub use effect::{Effect, EffectBuilder, Technique};
pub use pass::{Pass, PassBuilder, PassId, ProgramSelection};
pub use program::{Program, ProgramCache, ProgramId};
pub use states::{BlendMode, CompareMode, CullMode, RenderStates};
pub use variants::{ShaderDefine, ShaderVariant};

use thiserror::Error;

/// Errors from effect construction and lookup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectError {
    #[error("The technique '{0}' does not exist")]
    TechniqueNotFound(String),

    #[error("Effect '{0}' declares no technique")]
    NoTechniques(String),

    #[error("Technique '{0}' is declared twice")]
    DuplicateTechnique(String),

    #[error("Technique '{technique}' falls back to unknown technique '{fallback}'")]
    UnknownFallback { technique: String, fallback: String },
}

/// Result alias for effect operations
pub type Result<T> = std::result::Result<T, EffectError>;

/// Prelude
pub mod prelude {
    pub use crate::{
        Effect, EffectError, MacroBinding, Pass, Program, ProgramSelection, RenderStates,
        Technique,
    };
}
