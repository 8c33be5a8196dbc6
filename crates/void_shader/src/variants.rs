//! Shader variants
//!
//! A variant is the set of preprocessor defines a pass's macro bindings
//! produced for one combination of property values. Two selections producing
//! the same variant share one program.

/// Shader preprocessor define
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderDefine {
    /// Define name
    pub name: String,
    /// Optional value (None = just defined, Some = value)
    pub value: Option<i64>,
}

impl ShaderDefine {
    /// Create a simple define (no value)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Create a define with an integer value
    pub fn with_value(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }

    /// Convert to preprocessor directive
    pub fn to_directive(&self) -> String {
        if let Some(value) = self.value {
            format!("#define {} {}", self.name, value)
        } else {
            format!("#define {}", self.name)
        }
    }
}

/// The defines selected for one pass
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShaderVariant {
    /// Name of the pass the variant belongs to
    pub name: String,
    /// Defines, in macro binding order
    pub defines: Vec<ShaderDefine>,
}

impl ShaderVariant {
    /// Create a variant with no defines
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defines: Vec::new(),
        }
    }

    /// Add a define
    pub fn with_define(mut self, define: ShaderDefine) -> Self {
        self.defines.push(define);
        self
    }

    /// Add a define in place
    pub fn push(&mut self, define: ShaderDefine) {
        self.defines.push(define);
    }

    /// Check if a define is present
    pub fn is_defined(&self, name: &str) -> bool {
        self.defines.iter().any(|d| d.name == name)
    }

    /// Value of a define, if it carries one
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.defines.iter().find(|d| d.name == name)?.value
    }

    /// One-line `NAME=value` summary for logs
    pub fn summary(&self) -> String {
        self.defines
            .iter()
            .map(|d| match d.value {
                Some(v) => format!("{}={}", d.name, v),
                None => d.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Generate preprocessor header
    pub fn generate_header(&self) -> String {
        let mut header = String::new();
        for define in &self.defines {
            header.push_str(&define.to_directive());
            header.push('\n');
        }
        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_define() {
        let define = ShaderDefine::new("DIFFUSE_MAP");
        assert_eq!(define.to_directive(), "#define DIFFUSE_MAP");

        let define = ShaderDefine::with_value("NUM_LIGHTS", 4);
        assert_eq!(define.to_directive(), "#define NUM_LIGHTS 4");
    }

    #[test]
    fn test_variant_header_and_lookup() {
        let variant = ShaderVariant::new("phong")
            .with_define(ShaderDefine::new("DIFFUSE_MAP"))
            .with_define(ShaderDefine::with_value("NUM_LIGHTS", 4));

        let header = variant.generate_header();
        assert_eq!(header, "#define DIFFUSE_MAP\n#define NUM_LIGHTS 4\n");
        assert!(variant.is_defined("DIFFUSE_MAP"));
        assert_eq!(variant.value_of("NUM_LIGHTS"), Some(4));
        assert_eq!(variant.value_of("DIFFUSE_MAP"), None);
    }
}
