//! Simulation parameters.
//!
//! Everything has a built-in default; `particles.toml` in the working
//! directory may override any subset of it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SetupError;

/// File looked up in the working directory at startup.
pub const CONFIG_FILE: &str = "particles.toml";

/// Parameters that define a run. These don't change at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of particle slots in the shared buffer.
    pub capacity: u32,
    /// Particles spawned per second.
    pub spawn_rate: f32,
    /// Fixed seed for the per-frame kernel seeds. Wall-clock when unset.
    pub seed: Option<u64>,
    pub window: WindowParams,
    pub camera: CameraParams,
    pub emitter: EmitterParams,
    pub assets: AssetParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowParams {
    pub title: String,
    /// Initial window size as a fraction of the primary monitor.
    pub monitor_fraction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    pub position: [f32; 3],
    /// Initial pitch in degrees; negative looks down.
    pub elevation_deg: f32,
    /// Translation speed in units per second.
    pub speed: f32,
    /// Pitch speed in degrees per second.
    pub rotation_speed_deg: f32,
    /// Vertical field of view in degrees.
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

/// Kernel constants, bound once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterParams {
    pub origin: [f32; 3],
    /// Half-extent of the random spawn offset around `origin`.
    pub jitter: f32,
    pub direction: [f32; 3],
    /// Cone half-angle in degrees.
    pub spread_deg: f32,
    pub speed: f32,
    pub lifetime_min: f32,
    pub lifetime_max: f32,
    /// Downward acceleration.
    pub gravity: f32,
    /// Magnitude of the per-frame random acceleration.
    pub turbulence: f32,
    /// Sprite half-size in view-space units.
    pub particle_size: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetParams {
    /// Directory holding `particle.wgsl`, `particle.vert.wgsl` and `particle.frag.wgsl`.
    pub shader_dir: PathBuf,
    pub texture: PathBuf,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000_000,
            spawn_rate: 200_000.0,
            seed: None,
            window: WindowParams::default(),
            camera: CameraParams::default(),
            emitter: EmitterParams::default(),
            assets: AssetParams::default(),
        }
    }
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            title: "sparkfield".into(),
            monitor_fraction: 0.75,
        }
    }
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            position: [0.0, 20.0, -23.0],
            elevation_deg: -45.0,
            speed: 50.0,
            rotation_speed_deg: 45.0,
            fov_deg: 75.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Default for EmitterParams {
    fn default() -> Self {
        Self {
            origin: [0.0, 0.0, 0.0],
            jitter: 0.5,
            direction: [0.0, 1.0, 0.0],
            spread_deg: 25.0,
            speed: 20.0,
            lifetime_min: 2.0,
            lifetime_max: 5.0,
            gravity: 9.8,
            turbulence: 2.0,
            particle_size: 0.1,
        }
    }
}

impl Default for AssetParams {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders"),
            texture: PathBuf::from("assets/particle.png"),
        }
    }
}

impl std::str::FromStr for SimConfig {
    type Err = toml::de::Error;

    fn from_str(serialized: &str) -> Result<Self, Self::Err> {
        toml::from_str(serialized)
    }
}

impl SimConfig {
    /// Load `path` if it exists, otherwise return the defaults.
    ///
    /// Any other read failure is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, SetupError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no {} found, using built-in defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SetupError::ConfigIo {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Self = text.parse().map_err(|source| SetupError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn shader_path(&self, file: &str) -> PathBuf {
        self.assets.shader_dir.join(file)
    }
}
