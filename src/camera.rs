//! Free-flying camera and perspective projection.

use glam::{Mat4, Vec3};

use crate::config::CameraParams;

/// Highest pitch magnitude; `look_at` degenerates when looking straight up or down.
const MAX_ELEVATION: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Camera movement requested for one frame, each axis in `-1.0..=1.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraMotion {
    pub translate: Vec3,
    pub pitch: f32,
}

/// Camera position and pitch. Mutated by input each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    /// Pitch in radians; negative looks down.
    pub elevation: f32,
    /// Units per second.
    pub speed: f32,
    /// Radians per second.
    pub rotation_speed: f32,
}

impl CameraState {
    pub fn from_params(params: &CameraParams) -> Self {
        Self {
            position: Vec3::from_array(params.position),
            elevation: params.elevation_deg.to_radians().clamp(-MAX_ELEVATION, MAX_ELEVATION),
            speed: params.speed,
            rotation_speed: params.rotation_speed_deg.to_radians(),
        }
    }

    /// Apply `motion` scaled by `delta` seconds.
    pub fn apply(&mut self, motion: CameraMotion, delta: f32) {
        if delta <= 0.0 {
            return;
        }
        self.position += motion.translate * self.speed * delta;
        self.elevation = (self.elevation + motion.pitch * self.rotation_speed * delta)
            .clamp(-MAX_ELEVATION, MAX_ELEVATION);
    }

    /// Viewing direction. The camera always faces +z, tilted by `elevation`.
    pub fn forward(&self) -> Vec3 {
        Vec3::new(0.0, self.elevation.sin(), self.elevation.cos())
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y)
    }
}

impl Default for CameraState {
    fn default() -> Self {
        Self::from_params(&CameraParams::default())
    }
}

/// Perspective projection tied to the output surface size.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    fov_y: f32,
    near: f32,
    far: f32,
    width: u32,
    height: u32,
}

impl Projection {
    pub fn new(params: &CameraParams, width: u32, height: u32) -> Self {
        Self {
            fov_y: params.fov_deg.to_radians(),
            near: params.near,
            far: params.far,
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Track a new surface size. Zero-sized (minimized) surfaces are ignored.
    ///
    /// Returns `true` when the size changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 || (width, height) == (self.width, self.height) {
            return false;
        }
        self.width = width;
        self.height = height;
        true
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect(), self.near, self.far)
    }
}

/// Whole-pipeline transforms consumed by the render stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransforms {
    pub projection: Mat4,
    pub model_view: Mat4,
}

impl ViewTransforms {
    pub fn new(camera: &CameraState, projection: &Projection) -> Self {
        Self {
            projection: projection.matrix(),
            model_view: camera.view_matrix(),
        }
    }
}
