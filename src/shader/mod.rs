//! GPU programs, render targets, and uniform binding.
//!
//! Everything here goes through [`GraphicsContext`], so the managers and the
//! binder can be driven by the wgpu backend or by an in-memory fake.

mod compile;
mod gpu_context;
mod programs;
mod targets;
mod uniforms;

#[cfg(test)]
pub(crate) mod testing;

pub use compile::{
    compile_stage, link_interface, AttributeLocations, CompiledStage, ProgramInterface, UniformLayout, UniformSlot,
};
pub use gpu_context::WgpuContext;
pub use programs::{CompiledProgram, ProgramManager};
pub use targets::RenderTargetManager;
pub use uniforms::{FrameUniforms, UniformBinder, UniformBlock};

use crate::error::Result;
use crate::frame::{Resolution, VideoFrame};
use std::fmt;

/// Programmable pipeline stage a GLSL source targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Texture a stage samples from.
#[derive(Debug)]
pub enum StageInput<'a, T> {
    /// The uploaded video frame.
    Source,
    /// A previous stage's render target.
    Target(&'a T),
}

/// Where a stage draws.
#[derive(Debug)]
pub enum StageOutput<'a, T> {
    /// The visible surface.
    Surface,
    Target(&'a T),
}

/// One fully resolved draw in the multi-pass chain.
pub struct StagePass<'a, P, T> {
    pub label: &'a str,
    pub program: &'a P,
    pub input: StageInput<'a, T>,
    pub output: StageOutput<'a, T>,
    pub uniforms: UniformBlock,
}

/// Capability surface for linking programs, allocating targets, and drawing.
///
/// Implementations own no domain state: which programs and targets exist is
/// decided by [`ProgramManager`] and [`RenderTargetManager`].
pub trait GraphicsContext {
    type Program;
    type Target;

    /// Links two compiled stages into a drawable program.
    fn link_program(
        &mut self,
        label: &str,
        vertex: &CompiledStage,
        fragment: &CompiledStage,
        interface: &ProgramInterface,
    ) -> Result<Self::Program>;

    fn release_program(&mut self, program: Self::Program);

    /// Allocates an off-screen color target of the given size.
    fn create_target(&mut self, label: &str, size: Resolution) -> Result<Self::Target>;

    fn release_target(&mut self, target: Self::Target);

    /// Uploads the frame that stage 0 samples.
    fn upload_source(&mut self, frame: &VideoFrame) -> Result<()>;

    /// Reconfigures the visible surface.
    fn resize_surface(&mut self, size: Resolution);

    /// Encodes every pass in order and presents the surface.
    fn submit(&mut self, passes: &[StagePass<'_, Self::Program, Self::Target>]) -> Result<()>;
}
