//! Static render states carried by a pass

use serde::{Deserialize, Serialize};

/// Face culling mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull back faces (default)
    #[default]
    Back,
    /// Cull front faces (used for shadow mapping)
    Front,
}

/// Blend mode for transparent rendering
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    /// Standard alpha blending
    Alpha,
    /// Additive blending
    Additive,
    /// Multiplicative blending
    Multiply,
    /// Premultiplied alpha
    Premultiplied,
}

/// Depth comparison function
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareMode {
    Always,
    Never,
    Equal,
    Greater,
    GreaterEqual,
    #[default]
    Less,
    LessEqual,
    NotEqual,
}

/// Fixed-function state block of a draw call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderStates {
    /// Draw order within a renderer (lower = earlier)
    pub priority: f32,
    /// Sort back to front by depth
    pub z_sorted: bool,
    /// Blend mode (None = opaque)
    pub blend_mode: Option<BlendMode>,
    /// Enable depth testing
    pub depth_test: bool,
    /// Enable depth writing
    pub depth_write: bool,
    /// Depth comparison
    pub depth_func: CompareMode,
    /// Face culling mode
    pub cull_mode: CullMode,
}

impl RenderStates {
    /// Opaque geometry, depth tested and written
    pub fn opaque() -> Self {
        Self {
            priority: 0.0,
            z_sorted: false,
            blend_mode: None,
            depth_test: true,
            depth_write: true,
            depth_func: CompareMode::Less,
            cull_mode: CullMode::Back,
        }
    }

    /// Alpha-blended geometry drawn after opaque, sorted back to front
    pub fn transparent() -> Self {
        Self {
            priority: 10.0,
            z_sorted: true,
            blend_mode: Some(BlendMode::Alpha),
            depth_test: true,
            depth_write: false,
            depth_func: CompareMode::Less,
            cull_mode: CullMode::None,
        }
    }

    /// Check if blending is enabled
    pub fn is_transparent(&self) -> bool {
        self.blend_mode.is_some()
    }
}

impl Default for RenderStates {
    fn default() -> Self {
        Self::opaque()
    }
}
