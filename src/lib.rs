//! # sparkfield
//!
//! A million-particle fountain simulated by GPU compute kernels and drawn
//! straight out of the same GPU buffer, with no CPU round-trip in between.
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────── FrameOrchestrator ────────────────┐
//!  clock ──▶ │ camera ─▶ spawn budget ─▶ acquire ─▶ spawn?       │
//!  input ──▶ │                          update ─▶ death-check    │
//!            │                          release ─▶ draw ─▶ present│
//!            └───────────────────────────────────────────────────┘
//!                       │ ComputeDomain              │ RenderTarget
//!                       ▼                            ▼
//!                 SharedBuffer (one allocation, two views)
//! ```
//!
//! - [`interop`]: the shared buffer, capability negotiation and the scoped
//!   acquire/release guard that keeps compute and render apart.
//! - [`compute`]: the four kernel stages, their arguments and the spawn
//!   budget, plus a CPU reference implementation ([`compute::host`]).
//! - [`frame`]: the per-frame state machine.
//! - [`gpu`]: the `wgpu` compute domain and renderer.
//! - [`schema`]: the particle record layout shared by both domains.
//!
//! ## Running headless
//!
//! The orchestrator is generic over its compute domain and render target, so
//! the full frame sequence runs on the CPU:
//!
//! ```
//! use std::time::{Duration, Instant};
//!
//! use sparkfield::compute::host::HostDomain;
//! use sparkfield::config::SimConfig;
//! use sparkfield::frame::{FrameInput, FrameOrchestrator, RenderTarget, SimulationState};
//! use sparkfield::interop::{InteropCapability, RenderSource};
//! use sparkfield::camera::{CameraMotion, ViewTransforms};
//! use sparkfield::error::DispatchError;
//! use sparkfield::schema::{ParticleState, PARTICLE_STRIDE};
//! use sparkfield::seed::SeedSource;
//!
//! struct Count(usize);
//!
//! impl RenderTarget<Vec<ParticleState>> for Count {
//!     fn draw(&mut self, source: RenderSource<'_, Vec<ParticleState>>, _: &ViewTransforms) -> Result<(), DispatchError> {
//!         self.0 = source.memory().iter().filter(|p| p.is_alive()).count();
//!         Ok(())
//!     }
//!     fn present(&mut self) -> Result<(), DispatchError> {
//!         Ok(())
//!     }
//! }
//!
//! let config = SimConfig { capacity: 1000, spawn_rate: 100.0, ..SimConfig::default() };
//! let start = Instant::now();
//! let state = SimulationState::new(&config, SeedSource::from_seed(1), (800, 600), start);
//! let capability = InteropCapability::negotiate(&HostDomain::limits(), config.capacity, PARTICLE_STRIDE)?;
//! let mut sim = FrameOrchestrator::new(state, HostDomain::new(&config.emitter), &capability)?;
//!
//! let mut target = Count(0);
//! for frame in 0..3 {
//!     let input = FrameInput { now: start + Duration::from_millis(100 * frame), motion: CameraMotion::default() };
//!     sim.frame(&input, &mut target)?;
//! }
//! assert_eq!(target.0, 20);
//! # Ok::<(), sparkfield::error::Error>(())
//! ```

pub mod camera;
pub mod compute;
pub mod config;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod input;
pub mod interop;
pub mod schema;
pub mod seed;
pub mod textures;
pub mod time;
pub mod window;

pub use error::Error;
