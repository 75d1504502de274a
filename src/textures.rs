//! Sprite texture loading.
//!
//! The particle sprite is decoded from an image file into RGBA8 and uploaded
//! once at startup. The fragment stage samples it as `particle_texture` with
//! `particle_sampler` at `@group(1)`.
//!
//! # Supported Formats
//!
//! - PNG (recommended)
//! - JPEG

use std::path::Path;

use crate::error::AssetError;

/// Decoded pixels plus sampling state.
#[derive(Debug, Clone)]
pub struct TextureConfig {
    /// Raw RGBA pixel data (width * height * 4 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Filter used when the texture is minified.
    pub min_filter: wgpu::FilterMode,
    /// Filter used when the texture is magnified.
    pub mag_filter: wgpu::FilterMode,
    pub address_mode: wgpu::AddressMode,
}

impl TextureConfig {
    /// Load a texture from an image file.
    ///
    /// ```ignore
    /// let tex = TextureConfig::from_file("assets/particle.png")?;
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let img = image::load_from_memory(&bytes)
            .map_err(|source| AssetError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .into_rgba8();
        let (width, height) = img.dimensions();
        tracing::debug!("decoded {} ({}x{})", path.display(), width, height);

        Ok(Self {
            data: img.into_raw(),
            width,
            height,
            min_filter: wgpu::FilterMode::Linear,
            mag_filter: wgpu::FilterMode::Nearest,
            address_mode: wgpu::AddressMode::Repeat,
        })
    }

    /// Upload to the device and build a matching sampler.
    pub fn upload(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> GpuTexture {
        let size = wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("particle texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.width),
                rows_per_image: Some(self.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let address_mode = self.address_mode;
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("particle sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: self.mag_filter,
            min_filter: self.min_filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        GpuTexture {
            _texture: texture,
            view,
            sampler,
        }
    }
}

/// A texture living on the device.
pub struct GpuTexture {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_io_error() {
        let err = TextureConfig::from_file("no/such/sprite.png").unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
    }

    #[test]
    fn test_undecodable_file_is_image_error() {
        let path = std::env::temp_dir().join(format!("sparkfield-not-an-image-{}.png", std::process::id()));
        std::fs::write(&path, b"definitely not a png").unwrap();
        let err = TextureConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, AssetError::Image { .. }));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_bundled_sprite_decodes() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/particle.png");
        let tex = TextureConfig::from_file(path).unwrap();
        assert_eq!(tex.data.len(), (tex.width * tex.height * 4) as usize);
        assert_eq!(tex.min_filter, wgpu::FilterMode::Linear);
        assert_eq!(tex.mag_filter, wgpu::FilterMode::Nearest);
        assert_eq!(tex.address_mode, wgpu::AddressMode::Repeat);
    }
}
