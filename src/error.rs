//! Error types for the effect pipeline.

use crate::catalog::ShaderName;
use crate::shader::ShaderStage;
use thiserror::Error;

/// Errors raised by the scheduler, the resource managers, and the compositor.
#[derive(Debug, Error)]
pub enum Error {
    /// An effect with this identifier is already future, running, or past.
    #[error("effect '{id}' is already registered")]
    DuplicateIdentifier { id: String },

    /// The catalog has no entry for the requested shader.
    #[error("shader '{name}' is not in the catalog")]
    UnknownShader { name: ShaderName },

    /// A shader stage failed to parse or validate.
    #[error("{stage} shader failed to compile: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    /// Compiled stages could not be linked into a drawable program.
    #[error("program link failed: {log}")]
    ProgramLink { log: String },

    /// A render target, texture, or buffer could not be created.
    #[error("failed to allocate {what}: {reason}")]
    ResourceAllocationFailure { what: String, reason: String },

    /// `advance` was called with a time earlier than the last one it saw.
    #[error("driving time went backwards from {previous}s to {current}s")]
    NonMonotonicTime { previous: f64, current: f64 },

    /// Start time or duration is not usable.
    #[error("effect '{id}' has invalid timing: {reason}")]
    InvalidTiming { id: String, reason: String },

    /// The display surface could not provide a texture for this frame.
    #[error("surface unavailable: {0}")]
    Surface(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
