//! CPU implementation of the particle kernels.
//!
//! [`HostDomain`] runs the same per-slot algorithms as `shaders/particle.wgsl`
//! over a `Vec<ParticleState>`, one loop iteration per invocation. It backs
//! the orchestration tests and the benchmark, and doubles as the reference
//! the WGSL kernels are written against.

use glam::Vec3;

use super::{EmitterUniform, KernelArgs};
use crate::config::EmitterParams;
use crate::error::{DispatchError, SetupError};
use crate::interop::{ComputeDomain, DomainLimits};
use crate::schema::{ParticleState, PARTICLE_STRIDE};

/// Integer hash used for every random draw. Same constants as the kernels.
#[inline]
pub fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Uniform float in `[0, 1)` from the top 24 bits of a hash.
#[inline]
pub fn rand01(hash: u32) -> f32 {
    (hash >> 8) as f32 / 16_777_216.0
}

#[inline]
fn draw(h: u32, n: u32) -> f32 {
    rand01(pcg_hash(h.wrapping_add(n)))
}

#[inline]
fn signed3(h: u32, at: u32) -> Vec3 {
    Vec3::new(draw(h, at), draw(h, at + 1), draw(h, at + 2)) * 2.0 - Vec3::ONE
}

/// `(start + i) % capacity` for `start, i < capacity`, without overflow.
#[inline]
fn scan_index(start: u32, i: u32, capacity: u32) -> u32 {
    let head = capacity - start;
    if i >= head {
        i - head
    } else {
        start + i
    }
}

/// Reset every slot to the zero record, which is dead.
pub fn initialize(particles: &mut [ParticleState]) {
    particles.fill(ParticleState::default());
}

/// Revive up to `count` dead slots, scanning from a seed-dependent offset.
///
/// Alive slots are skipped without using up the budget, so exactly
/// `min(count, dead)` slots are revived. Returns how many were.
pub fn spawn(particles: &mut [ParticleState], emitter: &EmitterUniform, count: u32, seed: u32, now: f32) -> u32 {
    let capacity = particles.len() as u32;
    if capacity == 0 || count == 0 {
        return 0;
    }
    let start = pcg_hash(seed) % capacity;
    let mut tickets = 0u32;

    for i in 0..capacity {
        let index = scan_index(start, i, capacity);
        let slot = &mut particles[index as usize];
        if slot.is_alive() {
            continue;
        }
        let ticket = tickets;
        tickets += 1;
        if ticket >= count {
            break;
        }
        *slot = emit(emitter, pcg_hash(seed ^ pcg_hash(index)), now);
    }

    tickets.min(count)
}

/// Fresh particle drawn from the emitter's distribution.
pub fn emit(emitter: &EmitterUniform, h: u32, now: f32) -> ParticleState {
    let base = Vec3::from_array(emitter.direction);
    let up = if base.y.abs() > 0.9 { Vec3::X } else { Vec3::Y };
    let right = up.cross(base).normalize();
    let forward = base.cross(right);

    let theta = draw(h, 0) * std::f32::consts::TAU;
    let cos_phi = 1.0 - draw(h, 1) * (1.0 - emitter.spread.cos());
    let sin_phi = (1.0 - cos_phi * cos_phi).max(0.0).sqrt();
    let direction = (right * (sin_phi * theta.cos()) + forward * (sin_phi * theta.sin()) + base * cos_phi).normalize();

    let speed = emitter.speed * (0.75 + 0.5 * draw(h, 2));
    let offset = signed3(h, 3) * emitter.jitter;
    let lifetime = emitter.lifetime_min + (emitter.lifetime_max - emitter.lifetime_min) * draw(h, 6);
    let acceleration = signed3(h, 7) * emitter.turbulence * 0.25;

    ParticleState {
        position: (Vec3::from_array(emitter.origin) + offset).to_array(),
        spawn_time: now,
        alive: 1,
        lifetime,
        seed: h,
        velocity: (direction * speed).to_array(),
        acceleration: acceleration.to_array(),
        ..ParticleState::default()
    }
}

/// Integrate alive particles by `delta_time`.
pub fn update(particles: &mut [ParticleState], emitter: &EmitterUniform, seed: u32, delta_time: f32) {
    let gravity = Vec3::new(0.0, -emitter.gravity, 0.0);
    for p in particles.iter_mut().filter(|p| p.is_alive()) {
        let h = pcg_hash(seed ^ p.seed);
        let jitter = signed3(h, 0) * emitter.turbulence;
        let velocity = p.velocity() + (Vec3::from_array(p.acceleration) + gravity + jitter) * delta_time;
        p.velocity = velocity.to_array();
        p.position = (p.position() + velocity * delta_time).to_array();
    }
}

/// Kill alive particles whose lifetime has run out at `now`.
///
/// Only `alive` is written; everything else keeps its last value.
pub fn check_death(particles: &mut [ParticleState], now: f32) {
    for p in particles.iter_mut().filter(|p| p.is_alive()) {
        if now - p.spawn_time >= p.lifetime {
            p.alive = 0;
        }
    }
}

/// Compute domain that runs the kernels on the CPU.
#[derive(Debug, Clone)]
pub struct HostDomain {
    emitter: EmitterUniform,
    bound: Option<u32>,
    acquired: bool,
    spawned: u64,
}

impl HostDomain {
    pub fn new(emitter: &EmitterParams) -> Self {
        Self {
            emitter: EmitterUniform::from(emitter),
            bound: None,
            acquired: false,
            spawned: 0,
        }
    }

    /// Effectively unbounded; only the record stride is checked.
    pub fn limits() -> DomainLimits {
        DomainLimits {
            compute_shaders: true,
            max_buffer_size: u64::MAX,
            max_storage_buffer_binding_size: u64::MAX,
            max_vertex_buffer_array_stride: PARTICLE_STRIDE,
            max_compute_workgroups_per_dimension: u32::MAX,
            max_compute_invocations_per_workgroup: u32::MAX,
        }
    }

    pub fn emitter(&self) -> &EmitterUniform {
        &self.emitter
    }

    /// Particles revived since creation.
    pub fn total_spawned(&self) -> u64 {
        self.spawned
    }
}

impl ComputeDomain for HostDomain {
    type Memory = Vec<ParticleState>;

    fn allocate(&mut self, capacity: u32, stride: u32) -> Result<Self::Memory, SetupError> {
        if stride != PARTICLE_STRIDE {
            return Err(SetupError::Schema(format!(
                "host domain stores {PARTICLE_STRIDE}-byte records, asked for {stride}"
            )));
        }
        Ok(vec![ParticleState::default(); capacity as usize])
    }

    fn bind(&mut self, memory: &Self::Memory) -> Result<(), SetupError> {
        self.bound = Some(memory.len() as u32);
        Ok(())
    }

    fn acquire(&mut self, _memory: &mut Self::Memory) -> Result<(), DispatchError> {
        if self.acquired {
            return Err(DispatchError::Sync("shared buffer acquired twice".into()));
        }
        self.acquired = true;
        Ok(())
    }

    fn dispatch(&mut self, memory: &mut Self::Memory, args: &KernelArgs) -> Result<(), DispatchError> {
        let stage = args.stage();
        let fail = |message: &str| {
            Err(DispatchError::Stage {
                stage,
                message: message.into(),
            })
        };
        if !self.acquired {
            return fail("shared buffer is owned by render");
        }
        if self.bound != Some(memory.len() as u32) {
            return fail("no buffer bound");
        }

        match *args {
            KernelArgs::Initialize => initialize(memory),
            KernelArgs::Spawn { count, seed, now } => {
                self.spawned += spawn(memory, &self.emitter, count, seed, now) as u64;
            }
            KernelArgs::Update { seed, delta_time } => update(memory, &self.emitter, seed, delta_time),
            KernelArgs::DeathCheck { now } => check_death(memory, now),
        }
        Ok(())
    }

    fn release(&mut self, _memory: &mut Self::Memory) -> Result<(), DispatchError> {
        self.acquired = false;
        Ok(())
    }
}
