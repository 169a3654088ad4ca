//! Compiled program instances keyed by effect identifier.

use super::uniforms::FRAME_UNIFORMS;
use super::{compile_stage, link_interface, AttributeLocations, GraphicsContext, ShaderStage, UniformLayout};
use crate::catalog::{ShaderCatalog, ShaderName};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A linked program together with the locations resolved for it.
#[derive(Debug)]
pub struct CompiledProgram<P> {
    pub handle: P,
    pub shader: ShaderName,
    pub attributes: AttributeLocations,
    /// Schema-declared and frame-global uniforms the program actually has.
    pub uniforms: UniformLayout,
}

/// Owns one compiled program per registered effect.
pub struct ProgramManager<P> {
    catalog: Arc<dyn ShaderCatalog>,
    programs: HashMap<String, CompiledProgram<P>>,
}

impl<P> ProgramManager<P> {
    pub fn new(catalog: Arc<dyn ShaderCatalog>) -> Self {
        Self {
            catalog,
            programs: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn ShaderCatalog> {
        &self.catalog
    }

    /// Compiles and links `shader` and stores it under `identifier`.
    pub fn create<G>(&mut self, gfx: &mut G, identifier: &str, shader: ShaderName) -> Result<()>
    where
        G: GraphicsContext<Program = P>,
    {
        let program = self.build(gfx, identifier, shader)?;
        if let Some(previous) = self.programs.insert(identifier.to_string(), program) {
            warn!("Replacing existing program for '{}'", identifier);
            gfx.release_program(previous.handle);
        }
        Ok(())
    }

    /// Compiles and links a program without registering it.
    pub fn build<G>(&self, gfx: &mut G, label: &str, shader: ShaderName) -> Result<CompiledProgram<P>>
    where
        G: GraphicsContext<Program = P>,
    {
        let descriptor = self.catalog.lookup(shader).ok_or(Error::UnknownShader { name: shader })?;

        let vertex = compile_stage(ShaderStage::Vertex, &descriptor.vertex_source)?;
        let fragment = compile_stage(ShaderStage::Fragment, &descriptor.fragment_source)?;
        let mut interface = link_interface(&vertex, &fragment)?;

        // Block members nobody feeds stay zeroed; only resolvable names keep a location.
        interface
            .uniforms
            .retain(|name| descriptor.uniform(name).is_some() || FRAME_UNIFORMS.contains(&name));

        let handle = gfx.link_program(label, &vertex, &fragment, &interface)?;
        info!(
            "Compiled program '{}' ({}, {} uniform location(s))",
            label,
            shader,
            interface.uniforms.len()
        );

        Ok(CompiledProgram {
            handle,
            shader,
            attributes: interface.attributes,
            uniforms: interface.uniforms,
        })
    }

    /// Releases the program for `identifier`. Unknown identifiers are a no-op.
    pub fn destroy<G>(&mut self, gfx: &mut G, identifier: &str) -> bool
    where
        G: GraphicsContext<Program = P>,
    {
        match self.programs.remove(identifier) {
            Some(program) => {
                gfx.release_program(program.handle);
                info!("Destroyed program '{}'", identifier);
                true
            }
            None => {
                warn!("No program registered for '{}', nothing to destroy", identifier);
                false
            }
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&CompiledProgram<P>> {
        self.programs.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.programs.contains_key(identifier)
    }

    /// Identifiers with a live program, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.programs.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}
