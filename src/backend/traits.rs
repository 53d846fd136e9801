//! Core backend abstraction traits
//!
//! The renderer talks to the GPU through [`GraphicsBackend`], a small
//! command-recording interface. Commands are issued in program order against
//! an explicitly bound render target; backends are free to batch them.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Render target incomplete: {0}")]
    IncompleteTarget(IncompleteReason),
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a multi-attachment render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetHandle(pub(crate) u64);

/// Handle to a compiled program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u64);

/// Handle to a vertex binding (the VAO equivalent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBindingHandle(pub(crate) u64);

/// Main graphics backend trait
pub trait GraphicsBackend {
    /// Limits relevant to uniform packing and render targets
    fn limits(&self) -> BackendLimits;

    /// Human readable adapter description
    fn adapter_info(&self) -> String;

    /// Handle window resize
    fn resize(&mut self, width: u32, height: u32);

    /// Get current surface dimensions
    fn surface_size(&self) -> (u32, u32);

    /// Begin a new frame
    fn begin_frame(&mut self) -> BackendResult<()>;

    /// End the current frame, submit recorded work and present
    fn end_frame(&mut self) -> BackendResult<()>;

    // Resource creation

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8])
        -> BackendResult<BufferHandle>;

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Upload tightly packed RGBA8 texels into one layer
    fn write_texture(
        &mut self,
        texture: TextureHandle,
        layer: u32,
        data: &[u8],
        width: u32,
        height: u32,
    );

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)>;

    /// Assemble and validate a render target
    fn create_render_target(
        &mut self,
        desc: &RenderTargetDescriptor,
    ) -> BackendResult<RenderTargetHandle>;

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle>;

    fn create_vertex_binding(
        &mut self,
        desc: &VertexBindingDescriptor,
    ) -> BackendResult<VertexBindingHandle>;

    // Frame commands

    fn bind_render_target(&mut self, target: RenderTarget);

    /// Number of leading color slots subsequent draws write to
    fn set_draw_buffers(&mut self, count: u32);

    /// Clear the active color slots to `color` and depth to 1.0
    fn clear(&mut self, color: [f32; 4]);

    fn set_depth_state(&mut self, state: DepthState);

    fn use_program(&mut self, program: ProgramHandle);

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);

    fn bind_uniform_range(&mut self, binding: u32, buffer: BufferHandle, offset: u64, size: u64);

    fn draw(&mut self, binding: VertexBindingHandle, vertex_count: u32);

    fn draw_indexed(
        &mut self,
        binding: VertexBindingHandle,
        index_count: u32,
        index_byte_offset: u64,
        format: IndexFormat,
    );

    fn blit(&mut self, src: RenderTarget, dst: RenderTarget, mask: BlitMask, filter: FilterMode);

    // Resource destruction

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Also drops any pipelines built for the program
    fn destroy_program(&mut self, program: ProgramHandle);

    /// Forget the attachment list. The attachments themselves stay alive.
    fn destroy_render_target(&mut self, target: RenderTargetHandle);

    fn destroy_vertex_binding(&mut self, binding: VertexBindingHandle);
}
