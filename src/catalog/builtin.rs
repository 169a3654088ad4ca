//! Built-in shader library.
//!
//! All fragment shaders share one interface: the input frame at
//! `set = 0, binding = 0/1` (texture + sampler) and an optional `std140`
//! parameter block at `set = 0, binding = 2`.

use super::{ShaderCatalog, ShaderDescriptor, ShaderName, UniformDecl, UniformType, UniformValue};
use std::collections::BTreeMap;

/// Shared full-screen quad vertex shader.
pub const VERTEX_SHADER: &str = r#"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 1) in vec2 a_texCoord;

layout(location = 0) out vec2 v_texCoord;
layout(location = 1) out vec2 v_position;

void main() {
    v_texCoord = a_texCoord;
    v_position = a_position;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
"#;

const FRAGMENT_PRELUDE: &str = r#"#version 450
layout(location = 0) in vec2 v_texCoord;
layout(location = 0) out vec4 o_color;

layout(set = 0, binding = 0) uniform texture2D u_texture;
layout(set = 0, binding = 1) uniform sampler u_sampler;
"#;

const PASSTHROUGH_BODY: &str = r#"
void main() {
    o_color = texture(sampler2D(u_texture, u_sampler), v_texCoord);
}
"#;

const BASIC_BODY: &str = r#"
layout(set = 0, binding = 2) uniform EffectParams {
    float u_time;
    float u_brightness;
    float u_contrast;
    float u_saturation;
    float u_sepia;
} params;

void main() {
    vec4 tex = texture(sampler2D(u_texture, u_sampler), v_texCoord);
    vec3 color = tex.rgb * params.u_brightness;
    color = (color - vec3(0.5)) * params.u_contrast + vec3(0.5);

    float gray = dot(color, vec3(0.299, 0.587, 0.114));
    color = mix(vec3(gray), color, params.u_saturation);

    vec3 sepia = vec3(
        dot(color, vec3(0.393, 0.769, 0.189)),
        dot(color, vec3(0.349, 0.686, 0.168)),
        dot(color, vec3(0.272, 0.534, 0.131))
    );
    color = mix(color, sepia, params.u_sepia);

    o_color = vec4(color, tex.a);
}
"#;

const SHINE_BODY: &str = r#"
layout(location = 1) in vec2 v_position;

layout(set = 0, binding = 2) uniform EffectParams {
    float u_time;
    float u_startTime;
    vec2 u_center;
    float u_radius;
    float u_intensity;
} params;

void main() {
    vec4 color = texture(sampler2D(u_texture, u_sampler), v_texCoord);
    float dist = distance(v_position, params.u_center);

    // burst lasts 0.1s from the effect's start
    float elapsed = params.u_time - params.u_startTime;
    float progress = clamp(elapsed / 0.1, 0.0, 1.0);
    float shine = params.u_intensity * (1.0 - progress)
        * smoothstep(params.u_radius * progress, 0.0, dist);

    o_color = vec4(color.rgb + vec3(shine), color.a);
}
"#;

const GRAYSCALE_BODY: &str = r#"
layout(set = 0, binding = 2) uniform EffectParams {
    float u_intensity;
} params;

void main() {
    vec4 tex = texture(sampler2D(u_texture, u_sampler), v_texCoord);
    float gray = dot(tex.rgb, vec3(0.299, 0.587, 0.114));
    o_color = vec4(mix(tex.rgb, vec3(gray), params.u_intensity), tex.a);
}
"#;

const BLUR_BODY: &str = r#"
layout(set = 0, binding = 2) uniform EffectParams {
    vec2 u_resolution;
    float u_radius;
} params;

vec4 tap(vec2 offset, vec2 texel) {
    return texture(sampler2D(u_texture, u_sampler), v_texCoord + offset * texel);
}

void main() {
    vec2 texel = vec2(params.u_radius) / max(params.u_resolution, vec2(1.0));
    vec4 sum = tap(vec2(-1.0, -1.0), texel) + tap(vec2(0.0, -1.0), texel) + tap(vec2(1.0, -1.0), texel)
        + tap(vec2(-1.0, 0.0), texel) + tap(vec2(0.0, 0.0), texel) + tap(vec2(1.0, 0.0), texel)
        + tap(vec2(-1.0, 1.0), texel) + tap(vec2(0.0, 1.0), texel) + tap(vec2(1.0, 1.0), texel);
    o_color = sum / 9.0;
}
"#;

fn descriptor(body: &str, uniforms: Vec<UniformDecl>, description: &str) -> ShaderDescriptor {
    ShaderDescriptor {
        vertex_source: VERTEX_SHADER.to_string(),
        fragment_source: format!("{FRAGMENT_PRELUDE}{body}"),
        uniforms,
        description: description.to_string(),
    }
}

fn texture_decl() -> UniformDecl {
    UniformDecl::new("u_texture", UniformType::Sampler2D, None)
}

fn float(name: &str, default: f32) -> UniformDecl {
    UniformDecl::new(name, UniformType::Float, Some(UniformValue::Float(default)))
}

/// The shaders shipped with the crate.
pub struct BuiltinCatalog {
    entries: BTreeMap<ShaderName, ShaderDescriptor>,
}

impl BuiltinCatalog {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();

        entries.insert(
            ShaderName::Passthrough,
            descriptor(PASSTHROUGH_BODY, vec![texture_decl()], "Copies the input frame unchanged"),
        );

        entries.insert(
            ShaderName::Basic,
            descriptor(
                BASIC_BODY,
                vec![
                    texture_decl(),
                    float("u_brightness", 1.0),
                    float("u_contrast", 1.0),
                    float("u_saturation", 1.0),
                    float("u_sepia", 0.0),
                ],
                "Brightness, contrast, saturation and sepia adjustments",
            ),
        );

        entries.insert(
            ShaderName::Shine,
            descriptor(
                SHINE_BODY,
                vec![
                    texture_decl(),
                    UniformDecl::new("u_startTime", UniformType::Float, None),
                    UniformDecl::new("u_center", UniformType::Vec2, Some(UniformValue::Vec2([0.0, 0.0]))),
                    float("u_radius", 0.5),
                    float("u_intensity", 1.0),
                ],
                "Short radial flash around a center point, fading out after the effect starts",
            ),
        );

        entries.insert(
            ShaderName::Grayscale,
            descriptor(
                GRAYSCALE_BODY,
                vec![texture_decl(), float("u_intensity", 1.0)],
                "Blends the frame towards its luminance",
            ),
        );

        entries.insert(
            ShaderName::Blur,
            descriptor(
                BLUR_BODY,
                vec![texture_decl(), float("u_radius", 2.0)],
                "3x3 box blur with a configurable tap distance in pixels",
            ),
        );

        Self { entries }
    }
}

impl Default for BuiltinCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderCatalog for BuiltinCatalog {
    fn lookup(&self, name: ShaderName) -> Option<&ShaderDescriptor> {
        self.entries.get(&name)
    }

    fn names(&self) -> Vec<ShaderName> {
        self.entries.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_shader_name_has_an_entry() {
        let catalog = BuiltinCatalog::new();
        for name in ShaderName::ALL {
            assert!(catalog.lookup(name).is_some(), "missing {name}");
        }
        assert_eq!(catalog.names().len(), ShaderName::ALL.len());
    }

    #[test]
    fn shine_start_time_has_no_default() {
        let catalog = BuiltinCatalog::new();
        let shine = catalog.lookup(ShaderName::Shine).unwrap();
        assert_eq!(shine.uniform("u_startTime").unwrap().default, None);
        assert_eq!(
            shine.uniform("u_radius").unwrap().default,
            Some(UniformValue::Float(0.5))
        );
    }
}
