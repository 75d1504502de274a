use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::{program, Gpu};
use crate::camera::ViewTransforms;
use crate::error::{DispatchError, Error};
use crate::frame::RenderTarget;
use crate::interop::RenderSource;
use crate::schema::{PARTICLE_SCHEMA, PARTICLE_STRIDE};
use crate::textures::TextureConfig;

const PROGRAM: &str = "render program";

/// Optional uniforms the render sources are expected to declare.
const VERTEX_SYMBOLS: &[&str] = &["projection", "model_view"];
const FRAGMENT_SYMBOLS: &[&str] = &["particle_texture"];

/// Vertices per particle quad.
const QUAD_VERTICES: u32 = 6;

/// Whole-pipeline transforms, `@group(0) @binding(0)` in the vertex stage.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ViewUniforms {
    pub projection: [[f32; 4]; 4],
    pub model_view: [[f32; 4]; 4],
    pub particle_size: f32,
    pub _pad: [f32; 3],
}

impl ViewUniforms {
    pub fn new(view: &ViewTransforms, particle_size: f32) -> Self {
        Self {
            projection: view.projection.to_cols_array_2d(),
            model_view: view.model_view.to_cols_array_2d(),
            particle_size,
            _pad: [0.0; 3],
        }
    }
}

/// Source text of the two render stages.
pub struct RenderSources<'a> {
    pub vertex: &'a str,
    pub fragment: &'a str,
}

/// Draws the shared buffer to the window surface as textured point sprites.
pub struct ParticleRenderer {
    gpu: Arc<Gpu>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    view_buffer: wgpu::Buffer,
    view_bind_group: wgpu::BindGroup,
    texture_bind_group: wgpu::BindGroup,
    particle_size: f32,
    frame: Option<wgpu::SurfaceTexture>,
}

impl ParticleRenderer {
    pub fn new(
        gpu: Arc<Gpu>,
        surface: wgpu::Surface<'static>,
        size: (u32, u32),
        sources: RenderSources<'_>,
        texture: &TextureConfig,
        particle_size: f32,
    ) -> Result<Self, Error> {
        let device = &gpu.device;

        let caps = surface.get_capabilities(&gpu.adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or(crate::error::SetupError::SurfaceFormat)?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.0.max(1),
            height: size.1.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(device, &config);

        program::warn_missing_symbols("vertex stage", sources.vertex, VERTEX_SYMBOLS);
        program::warn_missing_symbols("fragment stage", sources.fragment, FRAGMENT_SYMBOLS);
        let vertex = program::build(device, "vertex stage", sources.vertex)?;
        let fragment = program::build(device, "fragment stage", sources.fragment)?;

        let view_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("view bind group layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let view_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("view uniforms"),
            contents: bytemuck::bytes_of(&ViewUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let view_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("view bind group"),
            layout: &view_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: view_buffer.as_entire_binding(),
            }],
        });

        let sprite = texture.upload(device, &gpu.queue);
        let texture_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("texture bind group"),
            layout: &texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&sprite.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sprite.sampler),
                },
            ],
        });

        let attributes = PARTICLE_SCHEMA.vertex_attributes(&[("position", 0), ("alive", 1)])?;
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("render pipeline layout"),
            bind_group_layouts: &[&view_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = program::validated(device, PROGRAM, || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(PROGRAM),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: PARTICLE_STRIDE as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &attributes,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        tracing::info!("render pipeline ready ({:?}, {}x{})", format, config.width, config.height);

        Ok(Self {
            gpu,
            surface,
            config,
            pipeline,
            view_buffer,
            view_bind_group,
            texture_bind_group,
            particle_size,
            frame: None,
        })
    }

    /// Reconfigure the surface. Zero-sized (minimized) windows are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.gpu.device, &self.config);
    }

    /// Next surface texture, or `None` if this frame has to be skipped.
    fn next_frame(&mut self) -> Result<Option<wgpu::SurfaceTexture>, DispatchError> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::warn!("surface lost or outdated, reconfiguring");
                self.surface.configure(&self.gpu.device, &self.config);
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("timed out waiting for a surface texture, skipping frame");
                Ok(None)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(DispatchError::Present("out of memory".into())),
            Err(e) => Err(DispatchError::Present(e.to_string())),
        }
    }
}

impl RenderTarget<wgpu::Buffer> for ParticleRenderer {
    fn draw(&mut self, source: RenderSource<'_, wgpu::Buffer>, view: &ViewTransforms) -> Result<(), DispatchError> {
        self.gpu.queue.write_buffer(
            &self.view_buffer,
            0,
            bytemuck::bytes_of(&ViewUniforms::new(view, self.particle_size)),
        );

        let Some(frame) = self.next_frame()? else {
            return Ok(());
        };
        let target = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("render encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("particle pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.view_bind_group, &[]);
            pass.set_bind_group(1, &self.texture_bind_group, &[]);
            pass.set_vertex_buffer(0, source.memory().slice(..));
            pass.draw(0..QUAD_VERTICES, 0..source.capacity());
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        self.frame = Some(frame);
        Ok(())
    }

    fn present(&mut self) -> Result<(), DispatchError> {
        if let Some(frame) = self.frame.take() {
            frame.present();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    #[test]
    fn test_view_uniforms_layout() {
        assert_eq!(std::mem::size_of::<ViewUniforms>(), 144);
    }

    #[test]
    fn test_view_uniforms_carry_transforms() {
        let view = ViewTransforms {
            projection: Mat4::from_scale(glam::Vec3::splat(2.0)),
            model_view: Mat4::IDENTITY,
        };
        let uniforms = ViewUniforms::new(&view, 0.25);
        assert_eq!(uniforms.projection[0][0], 2.0);
        assert_eq!(uniforms.model_view, Mat4::IDENTITY.to_cols_array_2d());
        assert_eq!(uniforms.particle_size, 0.25);
    }
}
