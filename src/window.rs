//! Window application: owns the winit window and drives one frame per redraw.

use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize, Size};
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};

use crate::config::SimConfig;
use crate::error::{Error, SetupError};
use crate::frame::{FrameInput, FrameOrchestrator, SimulationState};
use crate::gpu::render::RenderSources;
use crate::gpu::{self, program, Gpu, ParticleRenderer, WgpuCompute};
use crate::input::KeyboardState;
use crate::schema::{PARTICLE_SCHEMA, PARTICLE_STRIDE};
use crate::seed::SeedSource;
use crate::textures::TextureConfig;

/// Everything that exists once the window is up.
struct Runtime {
    window: Arc<Window>,
    renderer: ParticleRenderer,
    orchestrator: FrameOrchestrator<WgpuCompute>,
}

pub struct App {
    config: SimConfig,
    runtime: Option<Runtime>,
    keys: KeyboardState,
    error: Option<Error>,
}

impl App {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            runtime: None,
            keys: KeyboardState::new(),
            error: None,
        }
    }

    /// The fatal error that stopped the event loop, if any.
    pub fn into_result(self) -> Result<(), Error> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        tracing::error!("{}", error);
        self.error = Some(error);
        event_loop.exit();
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Runtime, Error> {
        let config = &self.config;
        let attrs = Window::default_attributes()
            .with_title(config.window.title.clone())
            .with_inner_size(initial_size(event_loop, config.window.monitor_fraction));
        let window = Arc::new(event_loop.create_window(attrs).map_err(SetupError::from)?);

        let instance = gpu::create_instance();
        let surface = instance.create_surface(window.clone()).map_err(SetupError::from)?;
        let gpu = Arc::new(pollster::block_on(Gpu::request(&instance, Some(&surface)))?);

        PARTICLE_SCHEMA.validate()?;
        let capability = gpu.negotiate(config.capacity, PARTICLE_STRIDE)?;

        let kernels = program::load_source(&config.shader_path("particle.wgsl"))?;
        let vertex = program::load_source(&config.shader_path("particle.vert.wgsl"))?;
        let fragment = program::load_source(&config.shader_path("particle.frag.wgsl"))?;
        let texture = TextureConfig::from_file(&config.assets.texture)?;

        let size = window.inner_size();
        let renderer = ParticleRenderer::new(
            gpu.clone(),
            surface,
            (size.width, size.height),
            RenderSources {
                vertex: &vertex,
                fragment: &fragment,
            },
            &texture,
            config.emitter.particle_size,
        )?;
        let compute = WgpuCompute::new(gpu, &kernels, &config.emitter)?;

        let state = SimulationState::new(
            config,
            SeedSource::from_config(config.seed),
            (size.width, size.height),
            Instant::now(),
        );
        let orchestrator = FrameOrchestrator::new(state, compute, &capability)?;
        tracing::info!(
            "simulating {} particles at {} spawns/s",
            config.capacity,
            config.spawn_rate
        );

        Ok(Runtime {
            window,
            renderer,
            orchestrator,
        })
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };

        if self.keys.quit_requested() {
            runtime.orchestrator.request_quit();
        }
        let input = FrameInput {
            now: Instant::now(),
            motion: self.keys.camera_motion(),
        };
        self.keys.begin_frame();

        match runtime.orchestrator.frame(&input, &mut runtime.renderer) {
            Ok(Some(report)) => {
                runtime.window.set_title(&report.title());
                runtime.window.request_redraw();
            }
            Ok(None) => event_loop.exit(),
            Err(e) => self.fail(event_loop, e.into()),
        }
    }
}

/// A fraction of the primary monitor, or 1280x720 when there is none.
fn initial_size(event_loop: &ActiveEventLoop, fraction: f32) -> Size {
    let fraction = fraction.clamp(0.1, 1.0) as f64;
    match event_loop.primary_monitor() {
        Some(monitor) => {
            let full = monitor.size();
            PhysicalSize::new(
                (full.width as f64 * fraction) as u32,
                (full.height as f64 * fraction) as u32,
            )
            .into()
        }
        None => LogicalSize::new(1280.0, 720.0).into(),
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.runtime.is_some() || self.error.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(runtime) => {
                runtime.window.request_redraw();
                self.runtime = Some(runtime);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => match self.runtime.as_mut() {
                Some(runtime) => {
                    runtime.orchestrator.request_quit();
                    runtime.window.request_redraw();
                }
                None => event_loop.exit(),
            },
            WindowEvent::Resized(size) => {
                if let Some(runtime) = self.runtime.as_mut() {
                    runtime.renderer.resize(size.width, size.height);
                    if runtime.orchestrator.resize(size.width, size.height) {
                        tracing::debug!("resized to {}x{}", size.width, size.height);
                    }
                }
            }
            WindowEvent::Focused(false) => self.keys.clear(),
            WindowEvent::KeyboardInput { .. } => self.keys.handle_event(&event),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }
}
