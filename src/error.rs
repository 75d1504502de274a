//! Error types for sparkfield.
//!
//! Errors fall into four groups that match the lifecycle of the program:
//! setup (window, device, capability negotiation), program builds, per-frame
//! dispatches, and asset loading. Every one of them is fatal; the top-level
//! [`Error`] only exists so that `main` has a single type to report.

use std::path::PathBuf;

use thiserror::Error;

use crate::compute::Stage;

/// Failures while bringing up the window, device or shared buffer.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Failed to create the event loop.
    #[error("failed to create event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    /// Failed to create the window.
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    /// Failed to create a surface for the window.
    #[error("failed to create GPU surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    /// No adapter compatible with the window surface.
    #[error("no compatible GPU adapter found; a Vulkan, Metal or DX12 capable GPU is required")]
    NoAdapter,
    /// The adapter refused to create a device.
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    /// The compute and render domains cannot share the particle buffer.
    #[error("compute/render interop not available: {reason}")]
    Interop { reason: String },
    /// The configuration file exists but could not be parsed.
    #[error("invalid configuration in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// The configuration file exists but could not be read.
    #[error("failed to read configuration {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The surface offers no texture format to render into.
    #[error("window surface reports no supported texture formats")]
    SurfaceFormat,
    /// The particle record layout disagrees between its declarations.
    #[error("particle record schema mismatch: {0}")]
    Schema(String),
}

/// A shader program failed to compile or link.
#[derive(Debug, Error)]
#[error("failed to build {program}:\n{log}")]
pub struct BuildError {
    /// Which program failed (for example `compute program`).
    pub program: String,
    /// Compiler diagnostics.
    pub log: String,
}

/// Failures of the compute domain or the present step while the loop runs.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A stage dispatch was rejected by the device.
    #[error("{stage} dispatch failed: {message}")]
    Stage { stage: Stage, message: String },
    /// Waiting on a domain barrier reported an error.
    #[error("synchronization failed: {0}")]
    Sync(String),
    /// The surface could not be acquired or presented.
    #[error("present failed: {0}")]
    Present(String),
    /// Copying the shared buffer back to the host failed.
    #[error("readback failed: {0}")]
    Readback(String),
}

/// A file the program needs could not be read or decoded.
#[derive(Debug, Error)]
pub enum AssetError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The image could not be decoded.
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Any fatal error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}
