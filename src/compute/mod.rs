//! Compute stages and their arguments.
//!
//! The kernel program has four entry points that all run over the full
//! particle capacity:
//!
//! | Stage | Entry point | Per-frame arguments |
//! |-------|-------------|---------------------|
//! | [`Stage::Initialize`] | `init_particles` | none (runs once) |
//! | [`Stage::Spawn`] | `spawn_particles` | count, seed, time |
//! | [`Stage::Update`] | `update_particles` | seed, delta time |
//! | [`Stage::DeathCheck`] | `check_particle_death` | time |
//!
//! Each stage has its own [`KernelParams`] uniform that is rewritten right
//! before its dispatch. The shared particle buffer and the [`EmitterUniform`]
//! are bound once at startup.

pub mod host;

use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::config::EmitterParams;
use crate::error::DispatchError;
use crate::interop::{ComputeAccess, ComputeDomain, SharedBuffer};
use crate::seed::SeedSource;

/// Invocations per workgroup; must match `@workgroup_size` in the kernel source.
pub const WORKGROUP_SIZE: u32 = 256;

/// One of the four kernel entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Initialize,
    Spawn,
    Update,
    DeathCheck,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Initialize, Stage::Spawn, Stage::Update, Stage::DeathCheck];

    /// Name of the entry point in the kernel source.
    pub const fn entry_point(self) -> &'static str {
        match self {
            Stage::Initialize => "init_particles",
            Stage::Spawn => "spawn_particles",
            Stage::Update => "update_particles",
            Stage::DeathCheck => "check_particle_death",
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Stage::Initialize => 0,
            Stage::Spawn => 1,
            Stage::Update => 2,
            Stage::DeathCheck => 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Initialize => "initialize",
            Stage::Spawn => "spawn",
            Stage::Update => "update",
            Stage::DeathCheck => "death-check",
        })
    }
}

/// A stage together with its per-dispatch arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArgs {
    Initialize,
    Spawn { count: u32, seed: u32, now: f32 },
    Update { seed: u32, delta_time: f32 },
    DeathCheck { now: f32 },
}

impl KernelArgs {
    pub fn stage(&self) -> Stage {
        match self {
            KernelArgs::Initialize => Stage::Initialize,
            KernelArgs::Spawn { .. } => Stage::Spawn,
            KernelArgs::Update { .. } => Stage::Update,
            KernelArgs::DeathCheck { .. } => Stage::DeathCheck,
        }
    }

    /// Uniform block for this dispatch.
    pub fn params(&self, capacity: u32) -> KernelParams {
        let mut params = KernelParams {
            capacity,
            ..KernelParams::zeroed()
        };
        match *self {
            KernelArgs::Initialize => {}
            KernelArgs::Spawn { count, seed, now } => {
                params.count = count;
                params.seed = seed;
                params.time = now;
            }
            KernelArgs::Update { seed, delta_time } => {
                params.seed = seed;
                params.delta_time = delta_time;
            }
            KernelArgs::DeathCheck { now } => params.time = now,
        }
        params
    }
}

/// Per-dispatch uniform. Matches `KernelArgs` in the kernel source.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct KernelParams {
    pub seed: u32,
    pub count: u32,
    pub time: f32,
    pub delta_time: f32,
    pub capacity: u32,
    pub _pad: [u32; 3],
}

/// Emitter constants. Matches `Emitter` in the kernel source.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct EmitterUniform {
    pub origin: [f32; 3],
    pub jitter: f32,
    /// Unit vector.
    pub direction: [f32; 3],
    /// Cone half-angle in radians.
    pub spread: f32,
    pub speed: f32,
    pub lifetime_min: f32,
    pub lifetime_max: f32,
    pub gravity: f32,
    pub turbulence: f32,
    pub _pad: [f32; 3],
}

impl From<&EmitterParams> for EmitterUniform {
    fn from(params: &EmitterParams) -> Self {
        let direction = Vec3::from_array(params.direction).try_normalize().unwrap_or(Vec3::Y);
        let lifetime_min = params.lifetime_min.max(0.0);
        Self {
            origin: params.origin,
            jitter: params.jitter.max(0.0),
            direction: direction.to_array(),
            spread: params.spread_deg.clamp(0.0, 180.0).to_radians(),
            speed: params.speed,
            lifetime_min,
            lifetime_max: params.lifetime_max.max(lifetime_min),
            gravity: params.gravity,
            turbulence: params.turbulence.max(0.0),
            _pad: [0.0; 3],
        }
    }
}

/// Number of particles to spawn this frame: `ceil(rate * delta)`.
///
/// Never negative; zero, negative and non-finite products give an empty
/// budget, and the budget never exceeds the capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SpawnBudget(u32);

impl SpawnBudget {
    pub fn for_frame(rate: f32, delta: f32, capacity: u32) -> Self {
        let wanted = rate * delta;
        if !wanted.is_finite() || wanted <= 0.0 {
            return Self(0);
        }
        Self(wanted.ceil().min(capacity as f32) as u32)
    }

    #[inline]
    pub fn count(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Binds per-frame arguments to the four stages and dispatches them.
#[derive(Debug, Clone, Copy)]
pub struct ComputePipeline {
    capacity: u32,
}

impl ComputePipeline {
    pub fn new(capacity: u32) -> Self {
        Self { capacity }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Run the initialize stage inside its own acquire/release bracket.
    ///
    /// Returns once the stage has completed on the device.
    pub fn initialize<D: ComputeDomain>(
        &self,
        domain: &mut D,
        buffer: &mut SharedBuffer<D::Memory>,
    ) -> Result<(), DispatchError> {
        let mut access = buffer.acquire(domain)?;
        access.dispatch(&KernelArgs::Initialize)?;
        access.release()?;
        tracing::debug!("initialized {} particle slots", self.capacity);
        Ok(())
    }

    /// Dispatch the spawn stage if the budget is non-empty.
    ///
    /// A seed is drawn only when a dispatch is issued. Returns whether one was.
    pub fn spawn<D: ComputeDomain>(
        &self,
        access: &mut ComputeAccess<'_, D>,
        budget: SpawnBudget,
        seeds: &mut SeedSource,
        now: f32,
    ) -> Result<bool, DispatchError> {
        if budget.is_empty() {
            return Ok(false);
        }
        let seed = seeds.next_seed();
        tracing::trace!(count = budget.count(), seed, now, "spawn");
        access.dispatch(&KernelArgs::Spawn {
            count: budget.count(),
            seed,
            now,
        })?;
        Ok(true)
    }

    pub fn update<D: ComputeDomain>(
        &self,
        access: &mut ComputeAccess<'_, D>,
        seeds: &mut SeedSource,
        delta_time: f32,
    ) -> Result<(), DispatchError> {
        let seed = seeds.next_seed();
        tracing::trace!(seed, delta_time, "update");
        access.dispatch(&KernelArgs::Update { seed, delta_time })
    }

    pub fn death_check<D: ComputeDomain>(
        &self,
        access: &mut ComputeAccess<'_, D>,
        now: f32,
    ) -> Result<(), DispatchError> {
        tracing::trace!(now, "death check");
        access.dispatch(&KernelArgs::DeathCheck { now })
    }
}

/// Workgroups needed to cover `capacity` invocations.
pub fn workgroup_count(capacity: u32) -> u32 {
    capacity.div_ceil(WORKGROUP_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_budget_example() {
        assert_eq!(SpawnBudget::for_frame(5.0, 1.0, 10).count(), 5);
    }

    #[test]
    fn test_spawn_budget_rounds_up() {
        assert_eq!(SpawnBudget::for_frame(200_000.0, 1.0 / 60.0, 1_000_000).count(), 3334);
        assert_eq!(SpawnBudget::for_frame(1.0, 0.001, 10).count(), 1);
    }

    #[test]
    fn test_spawn_budget_empty_cases() {
        assert!(SpawnBudget::for_frame(5.0, 0.0, 10).is_empty());
        assert!(SpawnBudget::for_frame(5.0, -1.0, 10).is_empty());
        assert!(SpawnBudget::for_frame(0.0, 1.0, 10).is_empty());
        assert!(SpawnBudget::for_frame(f32::NAN, 1.0, 10).is_empty());
        assert!(SpawnBudget::for_frame(f32::INFINITY, 1.0, 10).is_empty());
    }

    #[test]
    fn test_spawn_budget_capped_at_capacity() {
        assert_eq!(SpawnBudget::for_frame(1_000.0, 5.0, 64).count(), 64);
    }

    #[test]
    fn test_spawn_budget_frame_rate_independent() {
        // 2 seconds at 60 fps vs. 30 fps with the rate halved per frame-time doubling
        let fine: u32 = (0..120).map(|_| SpawnBudget::for_frame(600.0, 1.0 / 60.0, 1 << 20).count()).sum();
        let coarse: u32 = (0..60).map(|_| SpawnBudget::for_frame(300.0, 2.0 / 60.0, 1 << 20).count()).sum();
        let total = 600.0 * 2.0;
        assert!((fine as f32 - total).abs() <= 120.0);
        assert!((coarse as f32 - total / 2.0).abs() <= 60.0);
        // doubling delta while halving rate yields the same per-frame budget
        assert_eq!(
            SpawnBudget::for_frame(600.0, 1.0 / 60.0, 1 << 20),
            SpawnBudget::for_frame(300.0, 2.0 / 60.0, 1 << 20)
        );
    }

    #[test]
    fn test_kernel_params_per_stage() {
        let spawn = KernelArgs::Spawn {
            count: 12,
            seed: 99,
            now: 3.5,
        }
        .params(1000);
        assert_eq!((spawn.count, spawn.seed, spawn.time, spawn.capacity), (12, 99, 3.5, 1000));
        assert_eq!(spawn.delta_time, 0.0);

        let update = KernelArgs::Update {
            seed: 7,
            delta_time: 0.016,
        }
        .params(1000);
        assert_eq!((update.seed, update.delta_time, update.count), (7, 0.016, 0));

        let death = KernelArgs::DeathCheck { now: 9.0 }.params(1000);
        assert_eq!(death.time, 9.0);
        assert_eq!(KernelArgs::Initialize.params(1000).capacity, 1000);
    }

    #[test]
    fn test_uniform_sizes_match_wgsl() {
        assert_eq!(std::mem::size_of::<KernelParams>(), 32);
        assert_eq!(std::mem::size_of::<EmitterUniform>(), 64);
    }

    #[test]
    fn test_emitter_uniform_sanitizes() {
        let params = EmitterParams {
            direction: [0.0, 0.0, 0.0],
            lifetime_min: 4.0,
            lifetime_max: 1.0,
            spread_deg: 90.0,
            ..EmitterParams::default()
        };
        let uniform = EmitterUniform::from(&params);
        assert_eq!(uniform.direction, [0.0, 1.0, 0.0]);
        assert_eq!(uniform.lifetime_max, 4.0);
        assert!((uniform.spread - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_entry_points_are_distinct() {
        let names: std::collections::HashSet<_> = Stage::ALL.iter().map(|s| s.entry_point()).collect();
        assert_eq!(names.len(), 4);
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
    }

    #[test]
    fn test_workgroup_count() {
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(256), 1);
        assert_eq!(workgroup_count(257), 2);
        assert_eq!(workgroup_count(1_000_000), 3907);
    }
}
