//! Shader catalog: shader names, sources, and declared uniform schemas.
//!
//! The catalog is an injected, read-only capability. The program manager asks
//! it for a [`ShaderDescriptor`] by [`ShaderName`] and never caches sources
//! itself, so tests can hand in a catalog with broken or missing entries.

mod builtin;

pub use builtin::BuiltinCatalog;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key into the shader catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderName {
    Basic,
    Shine,
    Grayscale,
    Blur,
    Passthrough,
}

impl ShaderName {
    pub const ALL: [ShaderName; 5] = [
        ShaderName::Basic,
        ShaderName::Shine,
        ShaderName::Grayscale,
        ShaderName::Blur,
        ShaderName::Passthrough,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShaderName::Basic => "basic",
            ShaderName::Shine => "shine",
            ShaderName::Grayscale => "grayscale",
            ShaderName::Blur => "blur",
            ShaderName::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for ShaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GLSL type of a declared uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    /// Texture inputs. Always bound by the compositor, never written by value.
    Sampler2D,
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UniformType::Float => "float",
            UniformType::Vec2 => "vec2",
            UniformType::Vec3 => "vec3",
            UniformType::Vec4 => "vec4",
            UniformType::Sampler2D => "sampler2D",
        };
        f.write_str(name)
    }
}

/// A concrete uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
        }
    }

    /// Component floats in declaration order.
    pub fn components(&self) -> &[f32] {
        match self {
            UniformValue::Float(v) => std::slice::from_ref(v),
            UniformValue::Vec2(v) => v,
            UniformValue::Vec3(v) => v,
            UniformValue::Vec4(v) => v,
        }
    }
}

impl fmt::Display for UniformValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformValue::Float(v) => write!(f, "{v}"),
            other => write!(f, "{:?}", other.components()),
        }
    }
}

/// One entry of a shader's uniform schema.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformDecl {
    pub name: String,
    pub ty: UniformType,
    /// `None` for uniforms that have no sensible default (start-time markers, samplers).
    pub default: Option<UniformValue>,
}

impl UniformDecl {
    pub fn new(name: impl Into<String>, ty: UniformType, default: Option<UniformValue>) -> Self {
        Self {
            name: name.into(),
            ty,
            default,
        }
    }
}

/// Catalog entry: GLSL sources plus the declared uniform schema.
#[derive(Debug, Clone)]
pub struct ShaderDescriptor {
    pub vertex_source: String,
    pub fragment_source: String,
    pub uniforms: Vec<UniformDecl>,
    pub description: String,
}

impl ShaderDescriptor {
    /// Looks up a declared uniform by name.
    pub fn uniform(&self, name: &str) -> Option<&UniformDecl> {
        self.uniforms.iter().find(|decl| decl.name == name)
    }
}

/// Read-only source of shader descriptors.
pub trait ShaderCatalog: Send + Sync {
    /// Returns the descriptor registered under `name`, if any.
    fn lookup(&self, name: ShaderName) -> Option<&ShaderDescriptor>;

    /// Names of every entry, in a stable order.
    fn names(&self) -> Vec<ShaderName>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_names_round_trip_through_yaml_tags() {
        for name in ShaderName::ALL {
            let yaml = serde_yaml::to_string(&name).unwrap();
            assert_eq!(yaml.trim(), name.as_str());
        }
    }

    #[test]
    fn uniform_value_components_match_type() {
        assert_eq!(UniformValue::Float(0.5).components(), &[0.5]);
        assert_eq!(UniformValue::Vec2([1.0, 2.0]).ty(), UniformType::Vec2);
        assert_eq!(UniformValue::Vec4([0.0; 4]).components().len(), 4);
    }
}
