//! Deferred Renderer - deferred vs forward shading over a small static scene
//!
//! The renderer draws one textured mesh lit by a handful of point and
//! directional lights in one of three modes:
//! - **Textured quad**: a single texture on a fullscreen quad
//! - **Deferred**: a geometry pass into a four-slot G-buffer, then a
//!   fullscreen lighting pass sampling it
//! - **Forward**: one lit pass per entity
//!
//! # Features
//! - Linear uniform allocator streaming per-frame and per-entity blocks
//! - Per-(submesh, program) vertex binding cache
//! - WGSL programs reflected with naga and reloaded when their file changes
//! - A recording `DummyBackend` so whole frames can be tested without a GPU

pub mod backend;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod resources;
pub mod scene;
pub mod window;

use std::path::PathBuf;

pub use backend::dummy::DummyBackend;
pub use backend::wgpu_backend::WgpuBackend;
pub use backend::GraphicsBackend;
pub use engine::Engine;
pub use error::{AssetError, RendererError, RendererResult};
pub use pipeline::{RenderMode, RenderSettings, Renderer};
pub use window::Window;

/// Configuration for the renderer and the demo application
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Root directory for models, textures and the skybox
    pub asset_dir: PathBuf,
    /// Directory of `<program>.wgsl` overrides, watched for changes.
    /// `None` uses the built-in shaders.
    pub shader_dir: Option<PathBuf>,
    /// Mode of the first frame
    pub mode: RenderMode,
    pub show_relief: bool,
    pub show_skybox: bool,
    pub show_gizmos: bool,
    pub clear_color: [f32; 4],
    /// Uniform allocator capacity in bytes. `None` uses the backend's
    /// largest uniform block.
    pub uniform_capacity: Option<u64>,
    /// Maximum number of lights shaded per frame
    pub max_lights: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: "Deferred Renderer".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            asset_dir: PathBuf::from("assets"),
            shader_dir: None,
            mode: RenderMode::Deferred,
            show_relief: true,
            show_skybox: true,
            show_gizmos: true,
            clear_color: [0.2, 0.2, 0.2, 1.0],
            uniform_capacity: None,
            max_lights: pipeline::uniforms::MAX_LIGHTS,
        }
    }
}
