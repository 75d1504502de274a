//! `wgpu` backends for the compute and render domains.
//!
//! Both domains run on one [`Gpu`] device. [`WgpuCompute`] implements
//! [`ComputeDomain`](crate::interop::ComputeDomain) over a `wgpu::Buffer`;
//! [`ParticleRenderer`] draws that same buffer as an instanced vertex stream.

pub mod compute;
pub mod program;
pub mod render;

pub use compute::{read_back, WgpuCompute};
pub use render::{ParticleRenderer, ViewUniforms};

use crate::error::SetupError;
use crate::interop::{DomainLimits, InteropCapability};

/// Adapter, device and queue shared by both domains.
pub struct Gpu {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub info: wgpu::AdapterInfo,
    limits: DomainLimits,
}

/// Instance over the primary native backends (Vulkan, Metal, DX12).
pub fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    })
}

impl Gpu {
    /// Pick a high-performance adapter able to present to `surface` (if
    /// given) and open a device with the adapter's full limits.
    pub async fn request(instance: &wgpu::Instance, surface: Option<&wgpu::Surface<'_>>) -> Result<Self, SetupError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(SetupError::NoAdapter)?;

        let info = adapter.get_info();
        tracing::info!("adapter: {} ({:?}, {:?})", info.name, info.device_type, info.backend);
        tracing::info!("vendor {:#06x}, driver: {} {}", info.vendor, info.driver, info.driver_info);

        let adapter_limits = adapter.limits();
        let downlevel = adapter.get_downlevel_capabilities();
        let limits = DomainLimits {
            compute_shaders: downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS),
            max_buffer_size: adapter_limits.max_buffer_size,
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size as u64,
            max_vertex_buffer_array_stride: adapter_limits.max_vertex_buffer_array_stride,
            max_compute_workgroups_per_dimension: adapter_limits.max_compute_workgroups_per_dimension,
            max_compute_invocations_per_workgroup: adapter_limits.max_compute_invocations_per_workgroup,
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("sparkfield device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter_limits,
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!("uncaptured GPU error: {}", error);
        }));

        Ok(Self {
            adapter,
            device,
            queue,
            info,
            limits,
        })
    }

    pub fn limits(&self) -> &DomainLimits {
        &self.limits
    }

    /// Check that this device can share a `capacity x stride` buffer between
    /// compute and render.
    pub fn negotiate(&self, capacity: u32, stride: u32) -> Result<InteropCapability, SetupError> {
        let capability = InteropCapability::negotiate(&self.limits, capacity, stride)?;
        tracing::info!(
            "compute/render interop available for {} particles ({} MiB)",
            capacity,
            (capacity as u64 * stride as u64) >> 20
        );
        Ok(capability)
    }
}
