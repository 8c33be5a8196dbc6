//! Pass bindings
//!
//! Every binding maps a shader-side name to the property that feeds it.
//! Macro bindings additionally decide how the property turns into a define.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Shader input name → property name
pub type BindingMap = BTreeMap<String, String>;

/// How a macro property becomes a define
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MacroKind {
    /// Defined whenever the property exists and is not `false`
    Boolean,
    /// Defined to the property's integer value, which must lie in
    /// `[min, max]` for the pass to have a matching variant
    Integer { min: Option<i64>, max: Option<i64> },
}

/// A macro of a pass
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacroBinding {
    /// Property the macro is driven by
    pub property: String,
    pub kind: MacroKind,
}

impl MacroBinding {
    /// Boolean macro driven by `property`
    pub fn boolean(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            kind: MacroKind::Boolean,
        }
    }

    /// Unbounded integer macro driven by `property`
    pub fn integer(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            kind: MacroKind::Integer { min: None, max: None },
        }
    }

    /// Require the integer value to lie in `[min, max]`
    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.kind = MacroKind::Integer {
            min: Some(min),
            max: Some(max),
        };
        self
    }

    /// Require the integer value to be at least `min`
    pub fn at_least(mut self, min: i64) -> Self {
        let max = match self.kind {
            MacroKind::Integer { max, .. } => max,
            MacroKind::Boolean => None,
        };
        self.kind = MacroKind::Integer { min: Some(min), max };
        self
    }

    /// Require the integer value to be at most `max`
    pub fn at_most(mut self, max: i64) -> Self {
        let min = match self.kind {
            MacroKind::Integer { min, .. } => min,
            MacroKind::Boolean => None,
        };
        self.kind = MacroKind::Integer { min, max: Some(max) };
        self
    }

    /// Check if this is an integer macro
    pub fn is_integer(&self) -> bool {
        matches!(self.kind, MacroKind::Integer { .. })
    }

    /// Check an integer value against the requirement
    pub fn accepts(&self, value: i64) -> bool {
        match self.kind {
            MacroKind::Boolean => true,
            MacroKind::Integer { min, max } => {
                min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
            }
        }
    }
}
