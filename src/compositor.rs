//! Multi-pass chain: one draw per running effect, in activation order.

use crate::catalog::ShaderName;
use crate::effect::EffectKind;
use crate::error::{Error, Result};
use crate::frame::VideoFrame;
use crate::scheduler::RunningEffect;
use crate::shader::{
    CompiledProgram, FrameUniforms, GraphicsContext, ProgramManager, RenderTargetManager, StageInput, StageOutput,
    StagePass, UniformBinder,
};
use tracing::trace;

/// Label of the pipeline-internal program used when nothing is running.
pub const PASSTHROUGH_LABEL: &str = "kinescope:passthrough";

pub struct Compositor<P> {
    binder: UniformBinder,
    passthrough: CompiledProgram<P>,
}

impl<P> Compositor<P> {
    pub fn new(binder: UniformBinder, passthrough: CompiledProgram<P>) -> Self {
        Self { binder, passthrough }
    }

    pub fn binder(&self) -> &UniformBinder {
        &self.binder
    }

    /// Resolves every stage of the chain.
    ///
    /// Stage 0 samples the source frame and stage i samples the target of
    /// stage i-1. The last stage draws to the surface. Fails without a partial
    /// plan if any program or target is missing.
    pub fn plan<'a, T>(
        &'a self,
        running: &'a [RunningEffect],
        programs: &'a ProgramManager<P>,
        targets: &'a RenderTargetManager<T>,
        frame: &FrameUniforms,
    ) -> Result<Vec<StagePass<'a, P, T>>> {
        if running.is_empty() {
            let uniforms = self.binder.bind(
                ShaderName::Passthrough,
                &self.passthrough.uniforms,
                &EffectKind::Passthrough,
                0.0,
                frame,
            );
            return Ok(vec![StagePass {
                label: PASSTHROUGH_LABEL,
                program: &self.passthrough.handle,
                input: StageInput::Source,
                output: StageOutput::Surface,
                uniforms,
            }]);
        }

        let last = running.len() - 1;
        let mut previous: Option<&'a T> = None;
        let mut passes = Vec::with_capacity(running.len());

        for (index, entry) in running.iter().enumerate() {
            let identifier = entry.identifier();
            let program = programs.get(identifier).ok_or_else(|| missing("program", identifier))?;

            let input = match previous {
                None => StageInput::Source,
                Some(target) => StageInput::Target(target),
            };
            let output = if index == last {
                StageOutput::Surface
            } else {
                let target = targets
                    .get(identifier)
                    .ok_or_else(|| missing("render target", identifier))?;
                previous = Some(target);
                StageOutput::Target(target)
            };

            let uniforms = self.binder.bind(
                program.shader,
                &program.uniforms,
                &entry.effect.kind,
                entry.effect.start_time,
                frame,
            );
            passes.push(StagePass {
                label: identifier,
                program: &program.handle,
                input,
                output,
                uniforms,
            });
        }

        Ok(passes)
    }

    /// Uploads the frame and draws the whole chain.
    pub fn render<G>(
        &self,
        gfx: &mut G,
        source: &VideoFrame,
        running: &[RunningEffect],
        programs: &ProgramManager<P>,
        targets: &RenderTargetManager<G::Target>,
        frame: &FrameUniforms,
    ) -> Result<()>
    where
        G: GraphicsContext<Program = P>,
    {
        let passes = self.plan(running, programs, targets, frame)?;
        trace!("Submitting {} pass(es)", passes.len());
        gfx.upload_source(source)?;
        gfx.submit(&passes)
    }

    pub fn release<G>(self, gfx: &mut G)
    where
        G: GraphicsContext<Program = P>,
    {
        gfx.release_program(self.passthrough.handle);
    }
}

fn missing(what: &str, identifier: &str) -> Error {
    Error::ResourceAllocationFailure {
        what: format!("{what} for stage '{identifier}'"),
        reason: "not allocated".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuiltinCatalog;
    use crate::effect::Effect;
    use crate::frame::Resolution;
    use crate::shader::testing::{FakeProgram, FakeTarget, RecordingContext};
    use std::sync::Arc;

    struct Fixture {
        gfx: RecordingContext,
        programs: ProgramManager<FakeProgram>,
        targets: RenderTargetManager<FakeTarget>,
        compositor: Compositor<FakeProgram>,
        running: Vec<RunningEffect>,
    }

    fn fixture(ids: &[&str]) -> Fixture {
        let catalog = Arc::new(BuiltinCatalog::new());
        let mut gfx = RecordingContext::default();
        let mut programs = ProgramManager::new(catalog.clone());
        let passthrough = programs
            .build(&mut gfx, PASSTHROUGH_LABEL, ShaderName::Passthrough)
            .unwrap();
        let running: Vec<RunningEffect> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| RunningEffect {
                effect: Effect::new(*id, EffectKind::Grayscale(Default::default()), 0.0),
                activation: i as u64,
            })
            .collect();
        for id in ids {
            programs.create(&mut gfx, id, ShaderName::Grayscale).unwrap();
        }
        let mut targets = RenderTargetManager::new(Resolution::new(32, 32));
        targets.rebuild(&mut gfx, ids).unwrap();

        Fixture {
            gfx,
            programs,
            targets,
            compositor: Compositor::new(UniformBinder::new(catalog), passthrough),
            running,
        }
    }

    fn frame_uniforms() -> FrameUniforms {
        FrameUniforms {
            time: 1.0,
            resolution: [32.0, 32.0],
            seed: 0.5,
        }
    }

    fn render(f: &mut Fixture) -> Result<()> {
        let source = VideoFrame::new(32, 32, crate::frame::PixelFormat::Rgba);
        f.compositor.render(
            &mut f.gfx,
            &source,
            &f.running,
            &f.programs,
            &f.targets,
            &frame_uniforms(),
        )
    }

    fn hop(program: &str, input: Option<&str>, output: Option<&str>) -> (String, Option<String>, Option<String>) {
        (program.to_string(), input.map(str::to_string), output.map(str::to_string))
    }

    #[test]
    fn three_stages_chain_through_targets() {
        let mut f = fixture(&["A", "B", "C"]);
        render(&mut f).unwrap();

        let passes: Vec<_> = f
            .gfx
            .last_submission()
            .unwrap()
            .iter()
            .map(|p| (p.program.clone(), p.input.clone(), p.output.clone()))
            .collect();
        assert_eq!(
            passes,
            vec![
                hop("A", None, Some("A")),
                hop("B", Some("A"), Some("B")),
                hop("C", Some("B"), None),
            ]
        );
    }

    #[test]
    fn single_stage_draws_source_to_surface() {
        let mut f = fixture(&["solo"]);
        render(&mut f).unwrap();
        let passes = f.gfx.last_submission().unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].input, None);
        assert_eq!(passes[0].output, None);
    }

    #[test]
    fn empty_chain_uses_passthrough() {
        let mut f = fixture(&[]);
        render(&mut f).unwrap();
        let passes = f.gfx.last_submission().unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].program, PASSTHROUGH_LABEL);
        assert_eq!(f.gfx.uploads, vec![Resolution::new(32, 32)]);
    }

    #[test]
    fn missing_target_submits_nothing() {
        let mut f = fixture(&["A", "B"]);
        f.targets.rebuild(&mut f.gfx, &["B"]).unwrap();

        let err = render(&mut f).unwrap_err();
        assert!(matches!(err, Error::ResourceAllocationFailure { .. }));
        assert!(f.gfx.submissions.is_empty());
        assert!(f.gfx.uploads.is_empty());
    }

    #[test]
    fn missing_program_submits_nothing() {
        let mut f = fixture(&["A"]);
        f.programs.destroy(&mut f.gfx, "A");
        assert!(render(&mut f).is_err());
        assert!(f.gfx.submissions.is_empty());
    }
}
