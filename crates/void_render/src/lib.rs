//! # Void Render - Surface Draw Calls
//!
//! Turns a surface (geometry + material + effect) into draw calls for each
//! renderer context and keeps them valid while properties change:
//!
//! - `Surface`: per-context draw-call lists, macro listeners, technique and
//!   pass fallback, blame/forgive bookkeeping for failed integer macros
//! - `DrawCall`: selected program plus bindings, bound to three data layers
//! - `LightManager`: light arrays written as root-level properties
//! - `SurfaceSystem`: owns the property store and dispatches its events to
//!   the surfaces that listen to them
//!
//! ## Dispatch
//!
//! ```text
//! PropertyStore ──events──► SurfaceSystem ──Listener{surface, slot}──► Surface
//!                                ▲                                      │
//!                                └──────── SurfaceEvent (outbox) ◄──────┘
//! ```
//!
//! Surfaces never call back into the system. They connect and disconnect
//! listeners through [`SurfaceLinks`] and queue [`SurfaceEvent`]s, which the
//! system drains after each handler returns.

pub mod config;
pub mod draw_call;
pub mod geometry;
pub mod light;
pub mod macro_tracking;
pub mod signals;
pub mod surface;
pub mod system;

pub use config::RenderConfig;
pub use draw_call::{DrawCall, DrawCallHandle};
pub use geometry::Geometry;
pub use light::{Light, LightId, LightKind, LightManager};
pub use macro_tracking::{IncorrectMacros, MacroDrawCalls, MacroListeners, TechniquePass};
pub use signals::{Listener, Slot, SurfaceConnection, SurfaceLinks, SurfaceSignals};
pub use surface::{ContextState, SceneTarget, Surface, SurfaceEvent, SurfaceHandle};
pub use system::SurfaceSystem;

use thiserror::Error;
use void_data::DataError;
use void_shader::EffectError;

/// Errors from surfaces, lights and the surface system
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("The technique '{0}' does not exist")]
    TechniqueNotFound(String),

    #[error("Surface is already attached to a target")]
    AlreadyAttached,

    #[error("Surface is not attached to a target")]
    NotAttached,

    #[error("Surface not found: {0:?}")]
    SurfaceNotFound(SurfaceHandle),

    #[error("Too many {kind:?} lights (max {max})")]
    LightLimit { kind: LightKind, max: usize },

    #[error("Light not found: {0:?}")]
    LightNotFound(LightId),

    #[error("Invalid render config: {0}")]
    Config(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Effect(#[from] EffectError),
}

/// Result alias for render operations
pub type Result<T> = std::result::Result<T, RenderError>;

/// Prelude
pub mod prelude {
    pub use crate::{
        ContextState, DrawCall, DrawCallHandle, Geometry, Light, LightManager, RenderConfig,
        RenderError, SceneTarget, Surface, SurfaceEvent, SurfaceHandle, SurfaceSystem,
    };
}
