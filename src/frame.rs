//! Per-frame control loop.
//!
//! [`FrameOrchestrator`] drives one iteration at a time:
//!
//! ```text
//! Init ─▶ PollInput ─▶ UpdateCamera ─▶ Acquire ─▶ Spawn? ─▶ Update ─▶ DeathCheck
//!            ▲                                                          │
//!            └──── Present ◀── Render ◀── Release ◀─────────────────────┘
//!
//! quit request (at the iteration boundary) or any error ─▶ Shutdown
//! ```
//!
//! It is generic over the compute domain and the render target, so the same
//! loop runs against `wgpu` in the window and against the host kernels in
//! tests.

use std::time::Instant;

use crate::camera::{CameraMotion, CameraState, Projection, ViewTransforms};
use crate::compute::{ComputePipeline, SpawnBudget};
use crate::config::SimConfig;
use crate::error::{DispatchError, Error};
use crate::interop::{ComputeDomain, InteropCapability, RenderSource, SharedBuffer};
use crate::seed::SeedSource;
use crate::time::{FrameClock, FrameTick};

/// Where the orchestrator is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    PollInput,
    UpdateCamera,
    Acquire,
    Spawn,
    Update,
    DeathCheck,
    Release,
    Render,
    Present,
    Shutdown,
}

/// Something that can draw the shared buffer.
pub trait RenderTarget<M> {
    /// Record and submit a draw of every slot in `source`.
    fn draw(&mut self, source: RenderSource<'_, M>, view: &ViewTransforms) -> Result<(), DispatchError>;

    /// Show the frame drawn by the last [`draw`](Self::draw).
    fn present(&mut self) -> Result<(), DispatchError>;
}

/// Input snapshot for one iteration.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput {
    pub now: Instant,
    pub motion: CameraMotion,
}

/// Mutable loop state, owned by the orchestrator.
#[derive(Debug)]
pub struct SimulationState {
    pub camera: CameraState,
    pub projection: Projection,
    pub clock: FrameClock,
    pub seeds: SeedSource,
    /// Particles per second.
    pub spawn_rate: f32,
}

impl SimulationState {
    pub fn new(config: &SimConfig, seeds: SeedSource, size: (u32, u32), start: Instant) -> Self {
        Self {
            camera: CameraState::from_params(&config.camera),
            projection: Projection::new(&config.camera, size.0, size.1),
            clock: FrameClock::new(start),
            seeds,
            spawn_rate: config.spawn_rate.max(0.0),
        }
    }

    pub fn view_transforms(&self) -> ViewTransforms {
        ViewTransforms::new(&self.camera, &self.projection)
    }
}

/// What happened in one completed iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub tick: FrameTick,
    pub budget: SpawnBudget,
    /// Whether the spawn stage was dispatched.
    pub spawned: bool,
    pub fps: Option<f32>,
    pub average_fps: f32,
}

impl FrameReport {
    /// Window title for this frame.
    pub fn title(&self) -> String {
        format!("{:.1} fps", self.fps.unwrap_or(0.0))
    }
}

/// Runs the simulation loop one iteration at a time.
pub struct FrameOrchestrator<D: ComputeDomain> {
    state: SimulationState,
    domain: D,
    buffer: SharedBuffer<D::Memory>,
    pipeline: ComputePipeline,
    phase: Phase,
    quit_requested: bool,
}

impl<D: ComputeDomain> FrameOrchestrator<D> {
    /// Create the shared buffer and run the initialize stage to completion.
    pub fn new(state: SimulationState, mut domain: D, capability: &InteropCapability) -> Result<Self, Error> {
        let mut buffer = SharedBuffer::create(&mut domain, capability)?;
        let pipeline = ComputePipeline::new(buffer.capacity());
        pipeline.initialize(&mut domain, &mut buffer)?;

        Ok(Self {
            state,
            domain,
            buffer,
            pipeline,
            phase: Phase::PollInput,
            quit_requested: false,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase != Phase::Shutdown
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SimulationState {
        &mut self.state
    }

    pub fn buffer(&self) -> &SharedBuffer<D::Memory> {
        &self.buffer
    }

    pub fn domain(&self) -> &D {
        &self.domain
    }

    /// Stop before the next iteration starts. A frame in progress completes.
    pub fn request_quit(&mut self) {
        self.quit_requested = true;
    }

    /// Track a new surface size; the next frame uses the new projection.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        self.state.projection.resize(width, height)
    }

    /// Run one full iteration.
    ///
    /// Returns `Ok(None)` once shut down. Any error shuts the loop down.
    pub fn frame<R>(&mut self, input: &FrameInput, target: &mut R) -> Result<Option<FrameReport>, DispatchError>
    where
        R: RenderTarget<D::Memory>,
    {
        if self.phase == Phase::Shutdown {
            return Ok(None);
        }
        if self.quit_requested {
            tracing::info!("quit requested, shutting down after {} frames", self.state.clock.frame());
            self.phase = Phase::Shutdown;
            return Ok(None);
        }

        match self.run(input, target) {
            Ok(report) => {
                self.phase = Phase::PollInput;
                Ok(Some(report))
            }
            Err(e) => {
                tracing::error!("frame failed during {:?}: {}", self.phase, e);
                self.phase = Phase::Shutdown;
                Err(e)
            }
        }
    }

    fn run<R>(&mut self, input: &FrameInput, target: &mut R) -> Result<FrameReport, DispatchError>
    where
        R: RenderTarget<D::Memory>,
    {
        self.phase = Phase::PollInput;
        let tick = self.state.clock.tick(input.now);

        self.phase = Phase::UpdateCamera;
        self.state.camera.apply(input.motion, tick.delta);

        let budget = SpawnBudget::for_frame(self.state.spawn_rate, tick.delta, self.buffer.capacity());
        let pipeline = self.pipeline;

        self.phase = Phase::Acquire;
        let mut access = self.buffer.acquire(&mut self.domain)?;

        self.phase = Phase::Spawn;
        let spawned = pipeline.spawn(&mut access, budget, &mut self.state.seeds, tick.now)?;

        self.phase = Phase::Update;
        pipeline.update(&mut access, &mut self.state.seeds, tick.delta)?;

        self.phase = Phase::DeathCheck;
        pipeline.death_check(&mut access, tick.now)?;

        self.phase = Phase::Release;
        access.release()?;

        self.phase = Phase::Render;
        let view = self.state.view_transforms();
        target.draw(self.buffer.as_render_source(), &view)?;

        self.phase = Phase::Present;
        target.present()?;

        Ok(FrameReport {
            tick,
            budget,
            spawned,
            fps: self.state.clock.instant_fps(),
            average_fps: self.state.clock.average_fps(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_formats_fps() {
        let report = FrameReport {
            tick: FrameTick {
                now: 1.0,
                delta: 0.016,
                frame: 2,
            },
            budget: SpawnBudget::default(),
            spawned: false,
            fps: Some(62.5),
            average_fps: 60.0,
        };
        assert_eq!(report.title(), "62.5 fps");
        assert_eq!(FrameReport { fps: None, ..report }.title(), "0.0 fps");
    }
}
