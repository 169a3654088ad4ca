//! In-memory graphics context for tests.

use super::{CompiledStage, GraphicsContext, ProgramInterface, StageInput, StageOutput, StagePass, UniformBlock};
use crate::error::{Error, Result};
use crate::frame::{Resolution, VideoFrame};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct FakeProgram {
    pub handle: u32,
    pub label: String,
    pub interface: ProgramInterface,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeTarget {
    pub handle: u32,
    pub label: String,
    pub size: Resolution,
}

/// One submitted draw, with handles replaced by labels.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPass {
    pub program: String,
    /// `None` for the source frame.
    pub input: Option<String>,
    /// `None` for the surface.
    pub output: Option<String>,
    pub uniforms: UniformBlock,
}

#[derive(Debug, Default)]
pub struct RecordingContext {
    pub next_handle: u32,
    pub live_programs: BTreeSet<u32>,
    pub live_targets: BTreeSet<u32>,
    pub fail_link: bool,
    pub fail_targets: bool,
    pub uploads: Vec<Resolution>,
    pub surface_size: Option<Resolution>,
    pub submissions: Vec<Vec<RecordedPass>>,
}

impl RecordingContext {
    fn handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    pub fn last_submission(&self) -> Option<&[RecordedPass]> {
        self.submissions.last().map(Vec::as_slice)
    }
}

impl GraphicsContext for RecordingContext {
    type Program = FakeProgram;
    type Target = FakeTarget;

    fn link_program(
        &mut self,
        label: &str,
        _vertex: &CompiledStage,
        _fragment: &CompiledStage,
        interface: &ProgramInterface,
    ) -> Result<FakeProgram> {
        if self.fail_link {
            return Err(Error::ProgramLink {
                log: format!("link of '{label}' refused"),
            });
        }
        let handle = self.handle();
        self.live_programs.insert(handle);
        Ok(FakeProgram {
            handle,
            label: label.to_string(),
            interface: interface.clone(),
        })
    }

    fn release_program(&mut self, program: FakeProgram) {
        assert!(self.live_programs.remove(&program.handle), "double release of program");
    }

    fn create_target(&mut self, label: &str, size: Resolution) -> Result<FakeTarget> {
        if self.fail_targets {
            return Err(Error::ResourceAllocationFailure {
                what: format!("render target '{label}'"),
                reason: "out of memory".to_string(),
            });
        }
        let handle = self.handle();
        self.live_targets.insert(handle);
        Ok(FakeTarget {
            handle,
            label: label.to_string(),
            size,
        })
    }

    fn release_target(&mut self, target: FakeTarget) {
        assert!(self.live_targets.remove(&target.handle), "double release of target");
    }

    fn upload_source(&mut self, frame: &VideoFrame) -> Result<()> {
        self.uploads.push(frame.resolution());
        Ok(())
    }

    fn resize_surface(&mut self, size: Resolution) {
        self.surface_size = Some(size);
    }

    fn submit(&mut self, passes: &[StagePass<'_, FakeProgram, FakeTarget>]) -> Result<()> {
        let recorded = passes
            .iter()
            .map(|pass| RecordedPass {
                program: pass.program.label.clone(),
                input: match pass.input {
                    StageInput::Source => None,
                    StageInput::Target(t) => Some(t.label.clone()),
                },
                output: match pass.output {
                    StageOutput::Surface => None,
                    StageOutput::Target(t) => Some(t.label.clone()),
                },
                uniforms: pass.uniforms.clone(),
            })
            .collect();
        self.submissions.push(recorded);
        Ok(())
    }
}
