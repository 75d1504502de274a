use std::sync::Arc;

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use super::{program, Gpu};
use crate::compute::{workgroup_count, EmitterUniform, KernelArgs, KernelParams, Stage};
use crate::config::EmitterParams;
use crate::error::{BuildError, DispatchError, SetupError};
use crate::interop::{ComputeDomain, RenderSource};
use crate::schema::{ParticleState, PARTICLE_SCHEMA, PARTICLE_STRIDE};

const PROGRAM: &str = "compute program";

/// The four particle kernels compiled for the device.
///
/// Every stage gets its own pipeline, its own [`KernelParams`] uniform and
/// its own bind group. The bind groups are created once, in
/// [`bind`](ComputeDomain::bind); per-frame arguments only rewrite the
/// uniforms.
pub struct WgpuCompute {
    gpu: Arc<Gpu>,
    layout: wgpu::BindGroupLayout,
    pipelines: [wgpu::ComputePipeline; 4],
    params: [wgpu::Buffer; 4],
    emitter: wgpu::Buffer,
    spawn_counter: wgpu::Buffer,
    bind_groups: Option<[wgpu::BindGroup; 4]>,
    capacity: u32,
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuCompute {
    /// Compile `kernels` (without the `Particle` struct) and create the
    /// per-stage pipelines.
    pub fn new(gpu: Arc<Gpu>, kernels: &str, emitter: &EmitterParams) -> Result<Self, BuildError> {
        let device = &gpu.device;
        let source = program::compute_source(&PARTICLE_SCHEMA, kernels);
        let module = program::build(device, PROGRAM, &source)?;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("compute bind group layout"),
            entries: &[
                storage_entry(0, std::mem::size_of::<ParticleState>() as u64),
                uniform_entry(1, std::mem::size_of::<KernelParams>() as u64),
                uniform_entry(2, std::mem::size_of::<EmitterUniform>() as u64),
                storage_entry(3, 4),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("compute pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipelines = program::validated(device, PROGRAM, || {
            Stage::ALL.map(|stage| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(stage.entry_point()),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: Some(stage.entry_point()),
                    compilation_options: Default::default(),
                    cache: None,
                })
            })
        })?;

        let params = Stage::ALL.map(|stage| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{stage} params")),
                size: std::mem::size_of::<KernelParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        let emitter = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("emitter"),
            contents: bytemuck::bytes_of(&EmitterUniform::from(emitter)),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let spawn_counter = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("spawn counter"),
            size: 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        tracing::info!("compute stages ready: {}", Stage::ALL.map(|s| s.entry_point()).join(", "));

        Ok(Self {
            gpu,
            layout,
            pipelines,
            params,
            emitter,
            spawn_counter,
            bind_groups: None,
            capacity: 0,
            encoder: None,
        })
    }
}

fn storage_entry(binding: u32, min_size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(min_size),
        },
        count: None,
    }
}

fn uniform_entry(binding: u32, size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size),
        },
        count: None,
    }
}

impl ComputeDomain for WgpuCompute {
    type Memory = wgpu::Buffer;

    fn allocate(&mut self, capacity: u32, stride: u32) -> Result<wgpu::Buffer, SetupError> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shared particle buffer"),
            size: capacity as u64 * stride as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());

        match validation.or(oom) {
            None => Ok(buffer),
            Some(error) => Err(SetupError::Interop {
                reason: format!("could not allocate shared buffer: {error}"),
            }),
        }
    }

    fn bind(&mut self, memory: &wgpu::Buffer) -> Result<(), SetupError> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_groups = Stage::ALL.map(|stage| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{stage} bind group")),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: memory.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: self.params[stage.index()].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.emitter.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: self.spawn_counter.as_entire_binding(),
                    },
                ],
            })
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(SetupError::Interop {
                reason: format!("shared buffer cannot be bound as compute storage: {error}"),
            });
        }

        self.bind_groups = Some(bind_groups);
        self.capacity = (memory.size() / PARTICLE_STRIDE as u64) as u32;
        Ok(())
    }

    fn acquire(&mut self, _memory: &mut wgpu::Buffer) -> Result<(), DispatchError> {
        if self.encoder.is_some() {
            return Err(DispatchError::Sync("shared buffer acquired twice".into()));
        }
        // Barrier against the render domain: every submitted draw has finished.
        let _ = self.gpu.device.poll(wgpu::Maintain::Wait);

        self.gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.encoder = Some(self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("compute encoder"),
        }));
        Ok(())
    }

    fn dispatch(&mut self, _memory: &mut wgpu::Buffer, args: &KernelArgs) -> Result<(), DispatchError> {
        let stage = args.stage();
        let fail = |message: &str| {
            Err(DispatchError::Stage {
                stage,
                message: message.into(),
            })
        };
        let Some(encoder) = self.encoder.as_mut() else {
            return fail("shared buffer is owned by render");
        };
        let Some(bind_groups) = self.bind_groups.as_ref() else {
            return fail("no buffer bound");
        };

        let index = stage.index();
        self.gpu
            .queue
            .write_buffer(&self.params[index], 0, bytemuck::bytes_of(&args.params(self.capacity)));

        if stage == Stage::Spawn {
            encoder.clear_buffer(&self.spawn_counter, 0, None);
        }

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(stage.entry_point()),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipelines[index]);
        pass.set_bind_group(0, &bind_groups[index], &[]);
        pass.dispatch_workgroups(workgroup_count(self.capacity), 1, 1);
        Ok(())
    }

    fn release(&mut self, _memory: &mut wgpu::Buffer) -> Result<(), DispatchError> {
        let device = &self.gpu.device;
        let Some(encoder) = self.encoder.take() else {
            return Err(DispatchError::Sync("shared buffer released without acquire".into()));
        };

        let submission = self.gpu.queue.submit(std::iter::once(encoder.finish()));
        let _ = device.poll(wgpu::Maintain::WaitForSubmissionIndex(submission));

        match pollster::block_on(device.pop_error_scope()) {
            None => Ok(()),
            Some(error) => Err(DispatchError::Sync(format!("compute batch rejected: {error}"))),
        }
    }
}

/// Copy the shared buffer back to the host. Blocks until the copy is done.
pub fn read_back(gpu: &Gpu, source: RenderSource<'_, wgpu::Buffer>) -> Result<Vec<ParticleState>, DispatchError> {
    let size = source.memory().size();
    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_buffer_to_buffer(source.memory(), 0, &staging, 0, size);
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = gpu.device.poll(wgpu::Maintain::Wait);

    rx.recv()
        .map_err(|e| DispatchError::Readback(e.to_string()))?
        .map_err(|e| DispatchError::Readback(e.to_string()))?;

    let particles = {
        let data = slice.get_mapped_range();
        let mut particles = vec![ParticleState::zeroed(); source.capacity() as usize];
        bytemuck::cast_slice_mut::<ParticleState, u8>(&mut particles).copy_from_slice(&data);
        particles
    };
    staging.unmap();
    Ok(particles)
}
