//! The effect pipeline: scheduler, resource managers, and compositor together.

use crate::catalog::{ShaderCatalog, ShaderName};
use crate::compositor::{Compositor, PASSTHROUGH_LABEL};
use crate::effect::Effect;
use crate::error::{Error, Result};
use crate::frame::{Resolution, VideoFrame};
use crate::scheduler::{EffectScheduler, RunningEffect, TransitionHooks, Transitions};
use crate::shader::{FrameUniforms, GraphicsContext, ProgramManager, RenderTargetManager, UniformBinder};
use std::sync::Arc;
use tracing::{debug, info};

/// GPU-side state the scheduler's transitions act on.
struct Resources<G: GraphicsContext> {
    gfx: G,
    programs: ProgramManager<G::Program>,
    targets: RenderTargetManager<G::Target>,
}

impl<G: GraphicsContext> TransitionHooks for Resources<G> {
    fn register(&mut self, effect: &Effect) -> Result<()> {
        self.programs
            .create(&mut self.gfx, &effect.identifier, effect.shader_name())
    }

    fn release(&mut self, identifier: &str) {
        self.programs.destroy(&mut self.gfx, identifier);
    }

    fn running_changed(&mut self, running: &[RunningEffect]) -> Result<()> {
        let order: Vec<&str> = running.iter().map(RunningEffect::identifier).collect();
        debug!("Running set is now {:?}", order);
        self.targets.rebuild(&mut self.gfx, &order)
    }
}

/// Applies a timeline of shader effects to a stream of frames.
///
/// Call [`advance`](Self::advance) then [`render_frame`](Self::render_frame)
/// once per frame.
pub struct EffectPipeline<G: GraphicsContext> {
    scheduler: EffectScheduler,
    resources: Resources<G>,
    compositor: Compositor<G::Program>,
    time: f64,
}

impl<G: GraphicsContext> EffectPipeline<G> {
    pub fn new(mut gfx: G, catalog: Arc<dyn ShaderCatalog>, size: Resolution) -> Result<Self> {
        let programs = ProgramManager::new(catalog.clone());
        let passthrough = programs.build(&mut gfx, PASSTHROUGH_LABEL, ShaderName::Passthrough)?;
        gfx.resize_surface(size);
        info!("Effect pipeline ready at {}x{}", size.width, size.height);

        Ok(Self {
            scheduler: EffectScheduler::new(),
            resources: Resources {
                gfx,
                programs,
                targets: RenderTargetManager::new(size),
            },
            compositor: Compositor::new(UniformBinder::new(catalog), passthrough),
            time: 0.0,
        })
    }

    /// Registers an effect, compiling its program now.
    pub fn add_effect(&mut self, effect: Effect) -> Result<()> {
        self.scheduler.add_effect(effect, &mut self.resources)
    }

    pub fn remove_effect(&mut self, identifier: &str) -> Result<bool> {
        self.scheduler.remove_effect(identifier, &mut self.resources)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.scheduler.clear(&mut self.resources)
    }

    /// Re-registers future and running effects and restarts the clock.
    pub fn reset(&mut self) -> Result<()> {
        self.time = 0.0;
        self.scheduler.reset(&mut self.resources)
    }

    pub fn running_effects(&self) -> Vec<&Effect> {
        self.scheduler.running_effects()
    }

    /// Advances the driving clock; `time` is also the frame time uniform.
    ///
    /// A failing transition hook still leaves the clock at `time`; only a
    /// rejected time keeps the previous one.
    pub fn advance(&mut self, time: f64) -> Result<Transitions> {
        let result = self.scheduler.advance(time, &mut self.resources);
        if !matches!(result, Err(Error::NonMonotonicTime { .. })) {
            self.time = time;
        }
        result
    }

    /// Frame time uniform of the next rendered frame.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Draws `source` through every running effect onto the surface.
    pub fn render_frame(&mut self, source: &VideoFrame) -> Result<()> {
        let frame = FrameUniforms {
            time: self.time as f32,
            resolution: self.resources.targets.size().as_vec2(),
            seed: rand::random::<f32>(),
        };
        let Resources { gfx, programs, targets } = &mut self.resources;
        targets.ensure_complete(gfx)?;
        self.compositor
            .render(gfx, source, self.scheduler.running(), programs, targets, &frame)
    }

    /// Resizes the surface and reallocates render targets. Zero sizes are ignored.
    pub fn resize(&mut self, size: Resolution) -> Result<()> {
        if size.is_empty() {
            return Ok(());
        }
        let Resources { gfx, targets, .. } = &mut self.resources;
        gfx.resize_surface(size);
        targets.resize(gfx, size)
    }

    pub fn size(&self) -> Resolution {
        self.resources.targets.size()
    }

    pub fn scheduler(&self) -> &EffectScheduler {
        &self.scheduler
    }

    pub fn programs(&self) -> &ProgramManager<G::Program> {
        &self.resources.programs
    }

    pub fn targets(&self) -> &RenderTargetManager<G::Target> {
        &self.resources.targets
    }

    pub fn catalog(&self) -> &Arc<dyn ShaderCatalog> {
        self.resources.programs.catalog()
    }

    pub fn graphics(&self) -> &G {
        &self.resources.gfx
    }

    pub fn graphics_mut(&mut self) -> &mut G {
        &mut self.resources.gfx
    }

    /// Releases every GPU resource and hands back the graphics context.
    pub fn into_graphics(mut self) -> G {
        let _ = self.scheduler.clear(&mut self.resources);
        let Resources { mut gfx, mut targets, .. } = self.resources;
        targets.release_all(&mut gfx);
        self.compositor.release(&mut gfx);
        gfx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BuiltinCatalog, ShaderDescriptor};
    use crate::effect::{BlurParams, EffectKind, ShineParams};
    use crate::scheduler::EffectState;
    use crate::shader::testing::RecordingContext;

    fn pipeline() -> EffectPipeline<RecordingContext> {
        EffectPipeline::new(
            RecordingContext::default(),
            Arc::new(BuiltinCatalog::new()),
            Resolution::new(320, 240),
        )
        .unwrap()
    }

    fn gray(id: &str, start: f64) -> Effect {
        Effect::new(id, EffectKind::Grayscale(Default::default()), start)
    }

    /// Programs exist for future ∪ running; targets for running minus the last.
    fn assert_resource_invariants(p: &EffectPipeline<RecordingContext>) {
        let scheduler = p.scheduler();
        let mut expected: Vec<&str> = scheduler
            .future_effects()
            .into_iter()
            .chain(scheduler.running_effects())
            .map(|e| e.identifier.as_str())
            .collect();
        expected.sort_unstable();
        assert_eq!(p.programs().identifiers(), expected);

        let running = scheduler.running_effects();
        let mut chained: Vec<&str> = running
            .iter()
            .take(running.len().saturating_sub(1))
            .map(|e| e.identifier.as_str())
            .collect();
        chained.sort_unstable();
        assert_eq!(p.targets().identifiers(), chained);

        // one extra live program: the internal passthrough
        assert_eq!(p.graphics().live_programs.len(), p.programs().len() + 1);
        assert_eq!(p.graphics().live_targets.len(), p.targets().len());
    }

    #[test]
    fn resources_follow_the_lifecycle() {
        let mut p = pipeline();
        p.add_effect(gray("a", 0.0)).unwrap();
        p.add_effect(gray("b", 1.0).with_duration(2.0)).unwrap();
        p.add_effect(gray("c", 2.0)).unwrap();
        p.add_effect(gray("later", 100.0)).unwrap();
        assert_resource_invariants(&p);

        for t in [0.0, 1.0, 2.0, 3.0, 4.0] {
            p.advance(t).unwrap();
            assert_resource_invariants(&p);
        }
        assert_eq!(p.scheduler().state_of("b"), Some(EffectState::Past));

        assert!(p.remove_effect("later").unwrap());
        assert_resource_invariants(&p);
        assert!(p.remove_effect("a").unwrap());
        assert_resource_invariants(&p);

        p.clear().unwrap();
        assert_resource_invariants(&p);
        assert!(p.programs().is_empty());
    }

    #[test]
    fn reset_rebuilds_resources() {
        let mut p = pipeline();
        p.add_effect(gray("a", 0.0)).unwrap();
        p.add_effect(gray("b", 0.5)).unwrap();
        p.add_effect(gray("c", 10.0)).unwrap();
        p.advance(1.0).unwrap();

        p.reset().unwrap();
        assert_resource_invariants(&p);
        assert!(p.running_effects().is_empty());
        assert_eq!(p.programs().len(), 3);

        p.advance(0.0).unwrap();
        assert_eq!(p.running_effects().len(), 1);
        assert_resource_invariants(&p);
    }

    #[test]
    fn frames_render_through_the_running_chain() {
        let mut p = pipeline();
        p.add_effect(gray("first", 0.0)).unwrap();
        p.add_effect(Effect::new("second", EffectKind::Blur(BlurParams { radius: Some(4.0) }), 0.0))
            .unwrap();
        p.advance(0.0).unwrap();

        let source = VideoFrame::new(320, 240, crate::frame::PixelFormat::Rgb);
        p.render_frame(&source).unwrap();

        let passes = p.graphics().last_submission().unwrap();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].program, "first");
        assert_eq!(passes[0].output.as_deref(), Some("first"));
        assert_eq!(passes[1].input.as_deref(), Some("first"));
        assert_eq!(passes[1].output, None);
        assert!(passes[1].uniforms.is_set("u_resolution"));
    }

    #[test]
    fn shine_start_time_reaches_its_stage() {
        let mut p = pipeline();
        let shine = Effect::new("flash", EffectKind::Shine(ShineParams::default()), 2.0).with_duration(1.0);
        p.add_effect(shine).unwrap();
        p.advance(2.5).unwrap();
        p.render_frame(&VideoFrame::new(8, 8, crate::frame::PixelFormat::Rgba))
            .unwrap();

        let layout = &p.programs().get("flash").unwrap().uniforms;
        let pass = &p.graphics().last_submission().unwrap()[0];
        assert_eq!(
            pass.uniforms.read(layout.slot("u_startTime").unwrap()),
            Some(crate::catalog::UniformValue::Float(2.0))
        );
        assert_eq!(
            pass.uniforms.read(layout.slot("u_time").unwrap()),
            Some(crate::catalog::UniformValue::Float(2.5))
        );
    }

    #[test]
    fn nothing_running_renders_passthrough() {
        let mut p = pipeline();
        p.render_frame(&VideoFrame::new(4, 4, crate::frame::PixelFormat::Rgba))
            .unwrap();
        let passes = p.graphics().last_submission().unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].program, PASSTHROUGH_LABEL);
    }

    #[test]
    fn resize_reallocates_targets() {
        let mut p = pipeline();
        p.add_effect(gray("a", 0.0)).unwrap();
        p.add_effect(gray("b", 0.0)).unwrap();
        p.advance(0.0).unwrap();

        p.resize(Resolution::new(640, 480)).unwrap();
        assert_eq!(p.size(), Resolution::new(640, 480));
        assert_eq!(p.graphics().surface_size, Some(Resolution::new(640, 480)));
        assert_resource_invariants(&p);

        p.resize(Resolution::new(0, 480)).unwrap();
        assert_eq!(p.size(), Resolution::new(640, 480));
    }

    struct BrokenBlurCatalog {
        inner: BuiltinCatalog,
        broken: ShaderDescriptor,
    }

    impl ShaderCatalog for BrokenBlurCatalog {
        fn lookup(&self, name: ShaderName) -> Option<&ShaderDescriptor> {
            match name {
                ShaderName::Blur => Some(&self.broken),
                ShaderName::Basic => None,
                other => self.inner.lookup(other),
            }
        }

        fn names(&self) -> Vec<ShaderName> {
            self.inner.names()
        }
    }

    fn broken_pipeline() -> EffectPipeline<RecordingContext> {
        let inner = BuiltinCatalog::new();
        let mut broken = inner.lookup(ShaderName::Blur).unwrap().clone();
        broken.fragment_source = "#version 450\nvoid main() { undefined_call(); }".to_string();
        EffectPipeline::new(
            RecordingContext::default(),
            Arc::new(BrokenBlurCatalog { inner, broken }),
            Resolution::new(64, 64),
        )
        .unwrap()
    }

    #[test]
    fn registration_failures_leave_the_scheduler_unchanged() {
        let mut p = broken_pipeline();
        p.add_effect(gray("ok", 0.0)).unwrap();

        let err = p
            .add_effect(Effect::new("blurry", EffectKind::Blur(Default::default()), 0.0))
            .unwrap_err();
        assert!(matches!(err, Error::ShaderCompile { .. }));

        let err = p
            .add_effect(Effect::new("basic", EffectKind::Basic(Default::default()), 0.0))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownShader { name: ShaderName::Basic }));

        assert_eq!(p.scheduler().len(), 1);
        assert_resource_invariants(&p);
    }

    #[test]
    fn failed_target_allocation_aborts_the_frame() {
        let mut p = pipeline();
        p.add_effect(gray("a", 0.0)).unwrap();
        p.add_effect(gray("b", 0.0)).unwrap();
        p.graphics_mut().fail_targets = true;

        assert!(p.advance(0.0).is_err());
        assert_eq!(p.running_effects().len(), 2);

        let err = p
            .render_frame(&VideoFrame::new(4, 4, crate::frame::PixelFormat::Rgba))
            .unwrap_err();
        assert!(matches!(err, Error::ResourceAllocationFailure { .. }));
        assert!(p.graphics().submissions.is_empty());
    }

    #[test]
    fn target_pool_recovers_after_allocation_failure() {
        let mut p = pipeline();
        p.add_effect(gray("a", 0.0)).unwrap();
        p.add_effect(gray("b", 0.0)).unwrap();
        p.graphics_mut().fail_targets = true;
        assert!(p.advance(0.0).is_err());
        assert!(p.targets().is_empty());

        p.graphics_mut().fail_targets = false;
        for t in [0.1, 0.2, 5.0] {
            p.advance(t).unwrap();
            p.render_frame(&VideoFrame::new(4, 4, crate::frame::PixelFormat::Rgba))
                .unwrap();
            assert_eq!(p.targets().identifiers(), vec!["a"]);
            assert_resource_invariants(&p);
        }
        assert_eq!(p.graphics().last_submission().unwrap().len(), 2);
    }

    #[test]
    fn hook_failures_still_move_the_frame_clock() {
        let mut p = pipeline();
        p.add_effect(gray("a", 0.0)).unwrap();
        p.add_effect(Effect::new("b", EffectKind::Shine(ShineParams::default()), 1.0))
            .unwrap();
        p.advance(0.5).unwrap();

        p.graphics_mut().fail_targets = true;
        assert!(p.advance(1.5).is_err());
        assert_eq!(p.time(), 1.5);

        let err = p.advance(1.0).unwrap_err();
        assert!(matches!(err, Error::NonMonotonicTime { .. }));
        assert_eq!(p.time(), 1.5);

        p.graphics_mut().fail_targets = false;
        p.render_frame(&VideoFrame::new(4, 4, crate::frame::PixelFormat::Rgba))
            .unwrap();
        let layout = &p.programs().get("b").unwrap().uniforms;
        let passes = p.graphics().last_submission().unwrap();
        assert_eq!(
            passes[1].uniforms.read(layout.slot("u_time").unwrap()),
            Some(crate::catalog::UniformValue::Float(1.5))
        );
    }

    #[test]
    fn into_graphics_releases_everything() {
        let mut p = pipeline();
        p.add_effect(gray("a", 0.0)).unwrap();
        p.add_effect(gray("b", 0.0)).unwrap();
        p.advance(0.0).unwrap();

        let gfx = p.into_graphics();
        assert!(gfx.live_programs.is_empty());
        assert!(gfx.live_targets.is_empty());
    }
}
