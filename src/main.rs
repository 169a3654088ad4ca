//! Kinescope: plays a video or image through a timeline of shader effects.

use anyhow::Result;
use clap::Parser;
use kinescope::config::{Timeline, TimelineWatcher};
use kinescope::shader::WgpuContext;
use kinescope::source::{self, FrameSource};
use kinescope::utils::FpsCounter;
use kinescope::{BuiltinCatalog, EffectPipeline, Error, Resolution, ShaderCatalog};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

/// Timed GPU shader effects over video.
#[derive(Parser, Debug)]
#[command(name = "kinescope")]
#[command(about = "Apply a timeline of GPU shader effects to a video or image")]
struct Args {
    /// Video file (decoded with ffmpeg) or still image
    #[arg(short, long, required_unless_present = "list_shaders")]
    input: Option<PathBuf>,

    /// Timeline YAML listing the effects to schedule
    #[arg(short, long)]
    timeline: Option<PathBuf>,

    /// Window width
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Window height
    #[arg(long, default_value = "720")]
    height: u32,

    /// Target frames per second
    #[arg(long, default_value = "30")]
    fps: u32,

    /// Reload the timeline whenever the file changes
    #[arg(long, requires = "timeline")]
    watch: bool,

    /// Restart the clock of still-image sources after this many seconds
    #[arg(long)]
    loop_after: Option<f64>,

    /// List the built-in shaders and their uniforms, then exit
    #[arg(long)]
    list_shaders: bool,
}

/// Application state for the event loop.
struct KinescopeApp {
    args: Args,
    window: Option<Arc<Window>>,
    pipeline: Option<EffectPipeline<WgpuContext>>,
    source: Option<Box<dyn FrameSource>>,
    watcher: Option<TimelineWatcher>,
    last_frame_time: Instant,
    frame_duration: Duration,
    fps: FpsCounter,
}

impl KinescopeApp {
    fn new(args: Args) -> Self {
        let frame_duration = Duration::from_secs_f64(1.0 / args.fps.max(1) as f64);
        Self {
            args,
            window: None,
            pipeline: None,
            source: None,
            watcher: None,
            last_frame_time: Instant::now(),
            frame_duration,
            fps: FpsCounter::new(),
        }
    }

    fn initialize(&mut self, window: Arc<Window>) -> Result<()> {
        let size = window.inner_size();
        let gfx = WgpuContext::new(window)?;
        let catalog: Arc<dyn ShaderCatalog> = Arc::new(BuiltinCatalog::new());
        let mut pipeline = EffectPipeline::new(gfx, catalog, Resolution::new(size.width, size.height))?;
        info!("Effect pipeline initialized");

        if let Some(path) = &self.args.timeline {
            let timeline = Timeline::load(path)?;
            info!("Loaded {} effects from {:?}", timeline.effects.len(), path);
            apply_timeline(&mut pipeline, timeline);
            if self.args.watch {
                self.watcher = Some(TimelineWatcher::new(path)?);
            }
        } else {
            info!("No timeline given, showing the source unchanged");
        }

        if let Some(input) = &self.args.input {
            let source = source::open(input, self.args.loop_after)?;
            let res = source.resolution();
            info!("Source opened at {}x{}", res.width, res.height);
            self.source = Some(source);
        }

        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn process_frame(&mut self) {
        let Some(pipeline) = &mut self.pipeline else {
            return;
        };
        let Some(source) = &mut self.source else {
            return;
        };

        if let Some(timeline) = self.watcher.as_mut().and_then(TimelineWatcher::poll) {
            info!("Applying reloaded timeline with {} effects", timeline.effects.len());
            if let Err(e) = pipeline.clear() {
                error!("Failed to clear effects: {}", e);
            }
            apply_timeline(pipeline, timeline);
        }

        let Some(sample) = source.next_frame() else {
            return;
        };

        if let Some(fps) = self.fps.update() {
            let size = pipeline.size();
            debug!(
                "[Perf] Rendering at {:.2} FPS ({}x{}, {} effects running)",
                fps,
                size.width,
                size.height,
                pipeline.running_effects().len()
            );
        }

        // The source restarted; replay the timeline from the top
        if pipeline.scheduler().last_time().is_some_and(|last| sample.time < last) {
            info!("Source clock went back to {:.2}s, resetting effects", sample.time);
            if let Err(e) = pipeline.reset() {
                error!("Failed to reset effects: {}", e);
            }
        }

        match pipeline.advance(sample.time) {
            Ok(transitions) => {
                for id in &transitions.activated {
                    info!("Effect '{}' started at {:.2}s", id, sample.time);
                }
                for id in &transitions.expired {
                    info!("Effect '{}' finished at {:.2}s", id, sample.time);
                }
            }
            Err(e) => {
                error!("Failed to advance effects: {}", e);
                return;
            }
        }

        match pipeline.render_frame(sample.frame) {
            Ok(()) => {}
            Err(Error::Surface(reason)) => {
                warn!("Surface lost ({}), reconfiguring", reason);
                pipeline.graphics_mut().reconfigure();
            }
            Err(e) => error!("Render error: {}", e),
        }
    }
}

/// Registers every timeline effect, skipping the ones that fail to compile.
fn apply_timeline(pipeline: &mut EffectPipeline<WgpuContext>, timeline: Timeline) {
    for effect in timeline.effects {
        let id = effect.identifier.clone();
        if let Err(e) = pipeline.add_effect(effect) {
            error!("Skipping effect '{}': {}", id, e);
        }
    }
}

impl ApplicationHandler for KinescopeApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default()
            .with_title("Kinescope")
            .with_inner_size(PhysicalSize::new(self.args.width, self.args.height));

        match event_loop.create_window(window_attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                info!("Window created successfully");

                if let Err(e) = self.initialize(window) {
                    error!("Initialization error: {:#}", e);
                    event_loop.exit();
                }
            }
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Window closed");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(pipeline) = &mut self.pipeline {
                    if let Err(e) = pipeline.resize(Resolution::new(size.width, size.height)) {
                        error!("Resize failed: {}", e);
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                if now.duration_since(self.last_frame_time) >= self.frame_duration {
                    self.process_frame();
                    self.last_frame_time = now;
                }

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn list_shaders() {
    let catalog = BuiltinCatalog::new();
    println!("Available shaders:");
    for name in catalog.names() {
        let Some(descriptor) = catalog.lookup(name) else {
            continue;
        };
        println!("  {} - {}", name, descriptor.description);
        for decl in &descriptor.uniforms {
            match &decl.default {
                Some(default) => println!("      {} {} = {}", decl.ty, decl.name, default),
                None => println!("      {} {}", decl.ty, decl.name),
            }
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if args.list_shaders {
        list_shaders();
        return Ok(());
    }

    info!("Starting Kinescope...");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = KinescopeApp::new(args);
    event_loop.run_app(&mut app)?;

    Ok(())
}
