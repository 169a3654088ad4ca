//! Uniform values: resolution against the catalog schema and std140 staging.

use super::{UniformLayout, UniformSlot};
use crate::catalog::{ShaderCatalog, ShaderName, UniformType, UniformValue};
use crate::effect::EffectKind;
use std::sync::Arc;
use tracing::{debug, warn};

pub const TIME_UNIFORM: &str = "u_time";
pub const START_TIME_UNIFORM: &str = "u_startTime";
pub const RESOLUTION_UNIFORM: &str = "u_resolution";
pub const SEED_UNIFORM: &str = "u_seed";

/// Uniforms written by the binder itself rather than from the schema.
pub const FRAME_UNIFORMS: [&str; 4] = [TIME_UNIFORM, START_TIME_UNIFORM, RESOLUTION_UNIFORM, SEED_UNIFORM];

/// Smallest uniform buffer a program gets, even without a block.
pub const MIN_BLOCK_SIZE: u32 = 16;

/// CPU copy of one program's uniform block, uploaded once per draw.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlock {
    bytes: Vec<u8>,
    written: Vec<String>,
}

impl UniformBlock {
    /// Buffer size for a reflected block of `size` bytes.
    pub fn buffer_size(size: u32) -> u32 {
        size.max(MIN_BLOCK_SIZE).next_multiple_of(16)
    }

    pub fn zeroed(size: u32) -> Self {
        Self {
            bytes: vec![0; Self::buffer_size(size) as usize],
            written: Vec::new(),
        }
    }

    /// Writes `value` at the slot's offset. Type mismatches are skipped.
    pub fn write(&mut self, name: &str, slot: UniformSlot, value: UniformValue) -> bool {
        if value.ty() != slot.ty {
            warn!(
                "Uniform '{}' is declared as {} but got a {} value, skipping",
                name,
                slot.ty,
                value.ty()
            );
            return false;
        }

        let data: &[u8] = bytemuck::cast_slice(value.components());
        let start = slot.offset as usize;
        let Some(dst) = self.bytes.get_mut(start..start + data.len()) else {
            warn!("Uniform '{}' at offset {} lies outside the block, skipping", name, slot.offset);
            return false;
        };
        dst.copy_from_slice(data);

        if !self.is_set(name) {
            self.written.push(name.to_string());
        }
        true
    }

    /// Reads back the value stored in a slot.
    pub fn read(&self, slot: UniformSlot) -> Option<UniformValue> {
        let count = match slot.ty {
            UniformType::Float => 1,
            UniformType::Vec2 => 2,
            UniformType::Vec3 => 3,
            UniformType::Vec4 => 4,
            UniformType::Sampler2D => return None,
        };
        let start = slot.offset as usize;
        let bytes = self.bytes.get(start..start + count * 4)?;
        let mut f = [0.0f32; 4];
        for (dst, chunk) in f.iter_mut().zip(bytes.chunks_exact(4)) {
            *dst = bytemuck::pod_read_unaligned(chunk);
        }
        Some(match slot.ty {
            UniformType::Float => UniformValue::Float(f[0]),
            UniformType::Vec2 => UniformValue::Vec2([f[0], f[1]]),
            UniformType::Vec3 => UniformValue::Vec3([f[0], f[1], f[2]]),
            _ => UniformValue::Vec4(f),
        })
    }

    /// Whether a value was written for `name` this frame.
    pub fn is_set(&self, name: &str) -> bool {
        self.written.iter().any(|n| n == name)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Per-frame values shared by every stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    /// Driving time in seconds.
    pub time: f32,
    /// Output size in pixels.
    pub resolution: [f32; 2],
    pub seed: f32,
}

/// Resolves uniform values for a stage from its effect and the catalog schema.
pub struct UniformBinder {
    catalog: Arc<dyn ShaderCatalog>,
}

impl UniformBinder {
    pub fn new(catalog: Arc<dyn ShaderCatalog>) -> Self {
        Self { catalog }
    }

    pub fn bind(
        &self,
        shader: ShaderName,
        layout: &UniformLayout,
        kind: &EffectKind,
        start_time: f64,
        frame: &FrameUniforms,
    ) -> UniformBlock {
        let mut block = UniformBlock::zeroed(layout.size);
        let overrides = kind.uniform_overrides();

        if let Some(descriptor) = self.catalog.lookup(shader) {
            for decl in &descriptor.uniforms {
                if decl.ty == UniformType::Sampler2D {
                    continue;
                }
                let Some(slot) = layout.slot(&decl.name) else {
                    continue;
                };

                let explicit = overrides.iter().find(|(n, _)| *n == decl.name).map(|(_, v)| *v);
                match explicit.or(decl.default) {
                    Some(value) => {
                        block.write(&decl.name, slot, value);
                    }
                    None => debug!("Uniform '{}' of {} has no value, leaving unset", decl.name, shader),
                }
            }
        }

        let globals = [
            (TIME_UNIFORM, UniformValue::Float(frame.time)),
            (START_TIME_UNIFORM, UniformValue::Float(start_time as f32)),
            (RESOLUTION_UNIFORM, UniformValue::Vec2(frame.resolution)),
            (SEED_UNIFORM, UniformValue::Float(frame.seed)),
        ];
        for (name, value) in globals {
            if let Some(slot) = layout.slot(name) {
                block.write(name, slot, value);
            }
        }

        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BuiltinCatalog, ShaderDescriptor, UniformDecl};
    use crate::effect::{BasicParams, ShineParams};
    use crate::shader::{compile_stage, link_interface, ShaderStage};

    fn layout_for(name: ShaderName) -> UniformLayout {
        let catalog = BuiltinCatalog::new();
        let descriptor = catalog.lookup(name).unwrap();
        let vertex = compile_stage(ShaderStage::Vertex, &descriptor.vertex_source).unwrap();
        let fragment = compile_stage(ShaderStage::Fragment, &descriptor.fragment_source).unwrap();
        link_interface(&vertex, &fragment).unwrap().uniforms
    }

    fn frame() -> FrameUniforms {
        FrameUniforms {
            time: 3.5,
            resolution: [640.0, 480.0],
            seed: 0.25,
        }
    }

    #[test]
    fn explicit_values_override_defaults() {
        let binder = UniformBinder::new(Arc::new(BuiltinCatalog::new()));
        let layout = layout_for(ShaderName::Basic);
        let kind = EffectKind::Basic(BasicParams {
            brightness: Some(1.5),
            ..Default::default()
        });

        let block = binder.bind(ShaderName::Basic, &layout, &kind, 0.0, &frame());
        assert_eq!(
            block.read(layout.slot("u_brightness").unwrap()),
            Some(UniformValue::Float(1.5))
        );
        assert_eq!(
            block.read(layout.slot("u_contrast").unwrap()),
            Some(UniformValue::Float(1.0))
        );
        assert_eq!(block.read(layout.slot("u_time").unwrap()), Some(UniformValue::Float(3.5)));
    }

    #[test]
    fn start_time_is_always_written() {
        let binder = UniformBinder::new(Arc::new(BuiltinCatalog::new()));
        let layout = layout_for(ShaderName::Shine);
        let kind = EffectKind::Shine(ShineParams {
            center: Some([0.5, 0.5]),
            ..Default::default()
        });

        let block = binder.bind(ShaderName::Shine, &layout, &kind, 2.0, &frame());
        assert!(block.is_set("u_startTime"));
        assert_eq!(
            block.read(layout.slot("u_startTime").unwrap()),
            Some(UniformValue::Float(2.0))
        );
        assert_eq!(
            block.read(layout.slot("u_center").unwrap()),
            Some(UniformValue::Vec2([0.5, 0.5]))
        );
    }

    #[test]
    fn blur_receives_frame_resolution() {
        let binder = UniformBinder::new(Arc::new(BuiltinCatalog::new()));
        let layout = layout_for(ShaderName::Blur);
        let block = binder.bind(
            ShaderName::Blur,
            &layout,
            &EffectKind::Blur(Default::default()),
            0.0,
            &frame(),
        );
        assert_eq!(
            block.read(layout.slot("u_resolution").unwrap()),
            Some(UniformValue::Vec2([640.0, 480.0]))
        );
        assert_eq!(block.read(layout.slot("u_radius").unwrap()), Some(UniformValue::Float(2.0)));
    }

    struct NoDefaultCatalog {
        descriptor: ShaderDescriptor,
    }

    impl ShaderCatalog for NoDefaultCatalog {
        fn lookup(&self, name: ShaderName) -> Option<&ShaderDescriptor> {
            (name == ShaderName::Grayscale).then_some(&self.descriptor)
        }

        fn names(&self) -> Vec<ShaderName> {
            vec![ShaderName::Grayscale]
        }
    }

    #[test]
    fn uniform_without_value_or_default_is_left_unset() {
        let builtin = BuiltinCatalog::new();
        let mut descriptor = builtin.lookup(ShaderName::Grayscale).unwrap().clone();
        descriptor.uniforms = vec![UniformDecl::new("u_intensity", UniformType::Float, None)];
        let binder = UniformBinder::new(Arc::new(NoDefaultCatalog { descriptor }));

        let layout = layout_for(ShaderName::Grayscale);
        let block = binder.bind(
            ShaderName::Grayscale,
            &layout,
            &EffectKind::Grayscale(Default::default()),
            0.0,
            &frame(),
        );
        assert!(!block.is_set("u_intensity"));
        assert_eq!(
            block.read(layout.slot("u_intensity").unwrap()),
            Some(UniformValue::Float(0.0))
        );
    }

    #[test]
    fn mismatched_type_is_skipped() {
        let mut block = UniformBlock::zeroed(16);
        let slot = UniformSlot {
            offset: 0,
            ty: UniformType::Vec2,
        };
        assert!(!block.write("u_center", slot, UniformValue::Float(1.0)));
        assert!(!block.is_set("u_center"));
    }

    #[test]
    fn empty_block_still_gets_a_buffer() {
        assert_eq!(UniformBlock::zeroed(0).as_bytes().len(), 16);
        assert_eq!(UniformBlock::buffer_size(20), 32);
    }
}
