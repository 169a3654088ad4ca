//! GLSL compilation and program reflection with naga.
//!
//! Linking is checked here on the CPU: the fragment inputs must be written by
//! the vertex stage, resources must fit the fixed bind group layout, and the
//! vertex stage must consume the quad position. The GPU backend only has to
//! turn an accepted pair into a pipeline.

use super::ShaderStage;
use crate::catalog::UniformType;
use crate::error::{Error, Result};
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Bind group slot of the input texture.
pub const TEXTURE_BINDING: u32 = 0;
/// Bind group slot of the input sampler.
pub const SAMPLER_BINDING: u32 = 1;
/// Bind group slot of the per-program uniform block.
pub const UNIFORM_BINDING: u32 = 2;

/// Name the quad position attribute is matched by before falling back to location 0.
const POSITION_ATTRIBUTE: &str = "a_position";
const TEX_COORD_ATTRIBUTE: &str = "a_texCoord";
const POSITION_FALLBACK_LOCATION: u32 = 0;
const TEX_COORD_FALLBACK_LOCATION: u32 = 1;

/// A parsed and validated shader stage.
#[derive(Debug)]
pub struct CompiledStage {
    pub stage: ShaderStage,
    pub module: naga::Module,
    pub info: ModuleInfo,
}

impl CompiledStage {
    /// Name of the entry point for this stage.
    pub fn entry_point(&self) -> Option<&str> {
        self.entry().map(|ep| ep.name.as_str())
    }

    /// Writes the module out as WGSL for the GPU backend.
    pub fn to_wgsl(&self) -> Result<String> {
        naga::back::wgsl::write_string(&self.module, &self.info, naga::back::wgsl::WriterFlags::empty()).map_err(
            |e| Error::ProgramLink {
                log: format!("{} stage WGSL generation error: {:?}", self.stage, e),
            },
        )
    }

    fn entry(&self) -> Option<&naga::EntryPoint> {
        let wanted = self.stage.naga();
        self.module.entry_points.iter().find(|ep| ep.stage == wanted)
    }
}

/// Parses and validates one GLSL stage.
pub fn compile_stage(stage: ShaderStage, source: &str) -> Result<CompiledStage> {
    let mut frontend = Frontend::default();
    let options = Options::from(stage.naga());
    let module = frontend.parse(&options, source).map_err(|e| Error::ShaderCompile {
        stage,
        log: format!("GLSL parse error: {:?}", e),
    })?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let info = validator.validate(&module).map_err(|e| Error::ShaderCompile {
        stage,
        log: format!("validation error: {:?}", e),
    })?;

    Ok(CompiledStage { stage, module, info })
}

/// Vertex attribute locations of the shared quad geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeLocations {
    pub position: u32,
    /// `None` when the vertex stage ignores texture coordinates.
    pub tex_coord: Option<u32>,
}

/// Byte offset and type of one member of the uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub offset: u32,
    pub ty: UniformType,
}

/// Reflected layout of the fragment stage's uniform block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformLayout {
    /// Size of the block in bytes; zero when the program declares no block.
    pub size: u32,
    slots: HashMap<String, UniformSlot>,
}

impl UniformLayout {
    pub fn slot(&self, name: &str) -> Option<UniformSlot> {
        self.slots.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Keeps only the members `keep` accepts.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.slots.retain(|name, _| keep(name));
    }
}

/// Everything a backend needs to know to link a program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramInterface {
    pub attributes: AttributeLocations,
    pub uniforms: UniformLayout,
}

/// Checks that two stages form a program and reflects its interface.
pub fn link_interface(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<ProgramInterface> {
    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err(link_error(format!(
            "expected vertex and fragment stages, got {} and {}",
            vertex.stage, fragment.stage
        )));
    }

    check_resources(vertex)?;
    check_resources(fragment)?;
    check_varyings(vertex, fragment)?;

    let attributes = resolve_attributes(vertex)?;
    let uniforms = reflect_uniform_block(fragment);
    debug!(
        "Linked interface: position@{} texCoord@{:?}, {} uniform(s) in {} bytes",
        attributes.position,
        attributes.tex_coord,
        uniforms.len(),
        uniforms.size
    );

    Ok(ProgramInterface { attributes, uniforms })
}

fn link_error(log: String) -> Error {
    Error::ProgramLink { log }
}

fn entry_of(stage: &CompiledStage) -> Result<&naga::EntryPoint> {
    stage
        .entry()
        .ok_or_else(|| link_error(format!("{} stage has no entry point", stage.stage)))
}

/// Resolves the quad attributes by name, falling back to the fixed locations.
pub fn resolve_attributes(vertex: &CompiledStage) -> Result<AttributeLocations> {
    let entry = entry_of(vertex)?;
    let inputs: Vec<(Option<&str>, u32)> = entry
        .function
        .arguments
        .iter()
        .filter_map(|arg| match arg.binding {
            Some(naga::Binding::Location { location, .. }) => Some((arg.name.as_deref(), location)),
            _ => None,
        })
        .collect();

    let find = |name: &str, fallback: u32| {
        inputs
            .iter()
            .find(|(n, _)| *n == Some(name))
            .or_else(|| inputs.iter().find(|(_, location)| *location == fallback))
            .map(|(_, location)| *location)
    };

    let position = find(POSITION_ATTRIBUTE, POSITION_FALLBACK_LOCATION).ok_or_else(|| {
        link_error(format!(
            "vertex stage has no {POSITION_ATTRIBUTE} attribute (location {POSITION_FALLBACK_LOCATION})"
        ))
    })?;
    let tex_coord = find(TEX_COORD_ATTRIBUTE, TEX_COORD_FALLBACK_LOCATION).filter(|location| *location != position);

    if let Some((name, location)) = inputs
        .iter()
        .find(|(_, location)| *location != position && Some(*location) != tex_coord)
    {
        return Err(link_error(format!(
            "vertex input {} at location {location} is not provided by the quad geometry",
            name.unwrap_or("<unnamed>")
        )));
    }

    Ok(AttributeLocations { position, tex_coord })
}

/// Collects user locations from a binding, descending into IO structs.
fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut BTreeSet<u32>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            out.insert(*location);
        }
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn check_varyings(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<()> {
    let mut outputs = BTreeSet::new();
    if let Some(result) = &entry_of(vertex)?.function.result {
        collect_locations(&vertex.module, result.ty, result.binding.as_ref(), &mut outputs);
    }

    let mut inputs = BTreeSet::new();
    for arg in &entry_of(fragment)?.function.arguments {
        collect_locations(&fragment.module, arg.ty, arg.binding.as_ref(), &mut inputs);
    }

    match inputs.difference(&outputs).next() {
        Some(location) => Err(link_error(format!(
            "fragment input at location {location} is not written by the vertex stage"
        ))),
        None => Ok(()),
    }
}

/// Rejects resources the fixed bind group layout cannot serve.
fn check_resources(stage: &CompiledStage) -> Result<()> {
    for (_, var) in stage.module.global_variables.iter() {
        let Some(rb) = &var.binding else {
            continue;
        };
        let name = var.name.as_deref().unwrap_or("<unnamed>");

        if stage.stage == ShaderStage::Vertex {
            return Err(link_error(format!(
                "vertex stage binds '{name}' at set {} binding {}; only the fragment stage may bind resources",
                rb.group, rb.binding
            )));
        }
        if rb.group != 0 {
            return Err(link_error(format!("'{name}' uses set {}; only set 0 is available", rb.group)));
        }

        let inner = &stage.module.types[var.ty].inner;
        let fits = match rb.binding {
            TEXTURE_BINDING => matches!(
                inner,
                naga::TypeInner::Image {
                    dim: naga::ImageDimension::D2,
                    arrayed: false,
                    class: naga::ImageClass::Sampled { multi: false, .. },
                }
            ),
            SAMPLER_BINDING => matches!(inner, naga::TypeInner::Sampler { comparison: false }),
            UNIFORM_BINDING => {
                var.space == naga::AddressSpace::Uniform && matches!(inner, naga::TypeInner::Struct { .. })
            }
            _ => false,
        };
        if !fits {
            return Err(link_error(format!(
                "'{name}' at binding {} does not match the input layout \
                 (0: texture2D, 1: sampler, 2: uniform block)",
                rb.binding
            )));
        }
    }
    Ok(())
}

fn uniform_type(inner: &naga::TypeInner) -> Option<UniformType> {
    match *inner {
        naga::TypeInner::Scalar(naga::Scalar::F32) => Some(UniformType::Float),
        naga::TypeInner::Vector {
            size,
            scalar: naga::Scalar::F32,
        } => Some(match size {
            naga::VectorSize::Bi => UniformType::Vec2,
            naga::VectorSize::Tri => UniformType::Vec3,
            naga::VectorSize::Quad => UniformType::Vec4,
        }),
        _ => None,
    }
}

/// Reads member offsets of the block at `set = 0, binding = 2`.
pub fn reflect_uniform_block(fragment: &CompiledStage) -> UniformLayout {
    let module = &fragment.module;
    let block = module.global_variables.iter().find(|(_, var)| {
        var.space == naga::AddressSpace::Uniform
            && matches!(var.binding, Some(naga::ResourceBinding { group: 0, binding: UNIFORM_BINDING }))
    });

    let Some((_, var)) = block else {
        return UniformLayout::default();
    };
    let naga::TypeInner::Struct { members, span } = &module.types[var.ty].inner else {
        return UniformLayout::default();
    };

    let mut slots = HashMap::new();
    for member in members {
        let Some(name) = &member.name else {
            continue;
        };
        match uniform_type(&module.types[member.ty].inner) {
            Some(ty) => {
                slots.insert(name.clone(), UniformSlot { offset: member.offset, ty });
            }
            None => debug!("Uniform member '{}' has an unsupported type, not bindable", name),
        }
    }

    UniformLayout { size: *span, slots }
}
