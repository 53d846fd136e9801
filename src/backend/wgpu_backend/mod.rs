//! wgpu backend implementation
//!
//! Commands are recorded into pass segments. A segment ends whenever the
//! bound target, the draw buffer count or the clear state changes, or a blit
//! is requested; it is then replayed into a single wgpu render pass. Bind
//! groups for every draw are created while recording so the replay only
//! borrows resources.

mod blit;

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::backend::traits::*;
use crate::backend::types::*;

/// Units a program may sample from; bindings 0..MAX_TEXTURE_UNITS of group 1
pub const MAX_TEXTURE_UNITS: u32 = 8;
/// Group 1 binding of the linear, repeating sampler
pub const LINEAR_SAMPLER_BINDING: u32 = 8;
/// Group 1 binding of the nearest, clamping sampler
pub const NEAREST_SAMPLER_BINDING: u32 = 9;

const DEFAULT_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDescriptor,
}

struct WgpuTarget {
    colors: Vec<u64>,
    depth: Option<u64>,
}

struct WgpuProgram {
    module: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    reflection: ShaderReflection,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: u64,
    stride: u64,
    attributes: Vec<VertexAttribute>,
    color_formats: Vec<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    depth: DepthState,
}

struct IndexedRange {
    buffer: u64,
    format: wgpu::IndexFormat,
    byte_offset: u64,
    count: u32,
}

/// A draw with everything resolved except the pass it lands in
struct PreparedDraw {
    pipeline: u64,
    uniform_group: usize,
    texture_group: usize,
    vertex_buffer: u64,
    vertex_offset: u64,
    vertex_count: u32,
    index: Option<IndexedRange>,
}

struct PendingPass {
    target: RenderTarget,
    draw_buffers: u32,
    clear: Option<[f32; 4]>,
    draws: Vec<PreparedDraw>,
}

impl PendingPass {
    fn new(target: RenderTarget, draw_buffers: u32) -> Self {
        Self {
            target,
            draw_buffers,
            clear: None,
            draws: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.clear.is_none() && self.draws.is_empty()
    }
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    current_texture: Option<wgpu::SurfaceTexture>,
    swapchain_view: Option<wgpu::TextureView>,

    // Resource storage
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, WgpuTexture>,
    targets: HashMap<u64, WgpuTarget>,
    programs: HashMap<u64, WgpuProgram>,
    bindings: HashMap<u64, VertexBindingDescriptor>,
    next_id: u64,

    pipelines: HashMap<u64, wgpu::RenderPipeline>,
    pipeline_cache: HashMap<PipelineKey, u64>,

    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    white_2d: u64,
    white_cube: u64,
    default_depth: u64,

    blit_module: wgpu::ShaderModule,
    blit_layout: wgpu::BindGroupLayout,
    blit_pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,

    // Bound state
    target: RenderTarget,
    draw_buffers: u32,
    depth: DepthState,
    program: Option<u64>,
    texture_units: [Option<TextureHandle>; MAX_TEXTURE_UNITS as usize],
    uniform_ranges: HashMap<u32, (BufferHandle, u64, u64)>,

    // Command encoding
    encoder: Option<wgpu::CommandEncoder>,
    pending: Option<PendingPass>,
    frame_bind_groups: Vec<wgpu::BindGroup>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::COPY_DST) {
            result |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::INDEX) {
            result |= wgpu::BufferUsages::INDEX;
        }
        if usage.contains(BufferUsage::VERTEX) {
            result |= wgpu::BufferUsages::VERTEX;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            result |= wgpu::BufferUsages::UNIFORM;
        }
        result
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
        match format {
            VertexFormat::Float32 => wgpu::VertexFormat::Float32,
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        }
    }

    fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
        match func {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::Equal => wgpu::CompareFunction::Equal,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }

    fn convert_index_format(format: IndexFormat) -> wgpu::IndexFormat {
        match format {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }

    fn convert_view_dimension(dimension: TextureDimension) -> wgpu::TextureViewDimension {
        match dimension {
            TextureDimension::D2 => wgpu::TextureViewDimension::D2,
            TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
        }
    }
}

impl WgpuBackend {
    /// Create the backend for a window, blocking on adapter and device requests
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let backends = wgpu::util::backend_bits_from_env().unwrap_or(wgpu::Backends::all());
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Graphics Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        // Lighting output is written as-is, like a plain GL default framebuffer
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| {
                BackendError::SurfaceCreationFailed("Surface reports no formats".into())
            })?;

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Repeat Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let nearest_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Nearest Clamp Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let blit_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(blit::BLIT_SHADER.into()),
        });
        let blit_layout = blit::create_layout(&device);

        let mut backend = Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            current_texture: None,
            swapchain_view: None,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            targets: HashMap::new(),
            programs: HashMap::new(),
            bindings: HashMap::new(),
            next_id: 1,
            pipelines: HashMap::new(),
            pipeline_cache: HashMap::new(),
            linear_sampler,
            nearest_sampler,
            white_2d: 0,
            white_cube: 0,
            default_depth: 0,
            blit_module,
            blit_layout,
            blit_pipelines: HashMap::new(),
            target: RenderTarget::Default,
            draw_buffers: 1,
            depth: DepthState::default(),
            program: None,
            texture_units: [None; MAX_TEXTURE_UNITS as usize],
            uniform_ranges: HashMap::new(),
            encoder: None,
            pending: None,
            frame_bind_groups: Vec::new(),
        };

        backend.white_2d = backend.create_white_texture(TextureDimension::D2)?;
        backend.white_cube = backend.create_white_texture(TextureDimension::Cube)?;
        backend.default_depth = backend.create_default_depth()?;

        Ok(backend)
    }

    /// Get reference to the wgpu device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn create_white_texture(&mut self, dimension: TextureDimension) -> BackendResult<u64> {
        let texture = self.create_texture(&TextureDescriptor {
            label: Some(format!("White Fallback {:?}", dimension)),
            dimension,
            ..Default::default()
        })?;
        for layer in 0..dimension.layer_count() {
            self.write_texture(texture, layer, &[255, 255, 255, 255], 1, 1);
        }
        Ok(texture.0)
    }

    fn create_default_depth(&mut self) -> BackendResult<u64> {
        let texture = self.create_texture(&TextureDescriptor {
            label: Some("Default Depth".into()),
            width: self.surface_config.width,
            height: self.surface_config.height,
            dimension: TextureDimension::D2,
            format: DEFAULT_DEPTH_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_DST,
        })?;
        Ok(texture.0)
    }

    fn attachment_info(&self, texture: TextureHandle) -> Option<AttachmentInfo> {
        self.textures.get(&texture.0).map(|t| AttachmentInfo {
            format: t.desc.format,
            usage: t.desc.usage,
            width: t.desc.width,
            height: t.desc.height,
            dimension: t.desc.dimension,
        })
    }

    /// Color and depth formats a draw into `target` renders with
    fn target_formats(
        &self,
        target: RenderTarget,
        draw_buffers: u32,
    ) -> Option<(Vec<wgpu::TextureFormat>, Option<wgpu::TextureFormat>)> {
        match target {
            RenderTarget::Default => Some((
                vec![self.surface_config.format],
                Some(Self::convert_texture_format(DEFAULT_DEPTH_FORMAT)),
            )),
            RenderTarget::Offscreen(handle) => {
                let entry = self.targets.get(&handle.0)?;
                let colors = entry
                    .colors
                    .iter()
                    .take(draw_buffers as usize)
                    .filter_map(|id| self.textures.get(id))
                    .map(|t| Self::convert_texture_format(t.desc.format))
                    .collect();
                let depth = entry
                    .depth
                    .and_then(|id| self.textures.get(&id))
                    .map(|t| Self::convert_texture_format(t.desc.format));
                Some((colors, depth))
            }
        }
    }

    /// Views a pass into `target` attaches
    fn target_views(
        &self,
        target: RenderTarget,
        draw_buffers: u32,
    ) -> Option<(Vec<&wgpu::TextureView>, Option<&wgpu::TextureView>)> {
        match target {
            RenderTarget::Default => {
                let color = self.swapchain_view.as_ref()?;
                let depth = self.textures.get(&self.default_depth).map(|t| &t.view);
                Some((vec![color], depth))
            }
            RenderTarget::Offscreen(handle) => {
                let entry = self.targets.get(&handle.0)?;
                let colors = entry
                    .colors
                    .iter()
                    .take(draw_buffers as usize)
                    .filter_map(|id| self.textures.get(id))
                    .map(|t| &t.view)
                    .collect();
                let depth = entry
                    .depth
                    .and_then(|id| self.textures.get(&id))
                    .map(|t| &t.view);
                Some((colors, depth))
            }
        }
    }

    fn target_depth_texture(&self, target: RenderTarget) -> Option<u64> {
        match target {
            RenderTarget::Default => Some(self.default_depth),
            RenderTarget::Offscreen(handle) => self.targets.get(&handle.0)?.depth,
        }
    }

    fn build_pipeline(&self, key: &PipelineKey) -> BackendResult<wgpu::RenderPipeline> {
        let program = self
            .programs
            .get(&key.program)
            .ok_or_else(|| BackendError::InvalidHandle(format!("program {}", key.program)))?;

        let attributes: Vec<wgpu::VertexAttribute> = key
            .attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: Self::convert_vertex_format(a.format),
                offset: a.offset,
                shader_location: a.location,
            })
            .collect();
        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: key.stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let depth_stencil = key.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: key.depth.write,
            depth_compare: Self::convert_compare_function(key.depth.compare),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        Ok(self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: None,
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: "vs_main",
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.module,
                    entry_point: "fs_main",
                    targets: &color_targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            }))
    }

    fn build_uniform_group(&self, program: &WgpuProgram) -> BackendResult<wgpu::BindGroup> {
        let mut entries = Vec::with_capacity(program.reflection.uniform_blocks.len());
        for block in &program.reflection.uniform_blocks {
            let (buffer, offset, size) = self
                .uniform_ranges
                .get(&block.binding)
                .copied()
                .ok_or_else(|| {
                    BackendError::InvalidHandle(format!(
                        "uniform binding {} has no bound range",
                        block.binding
                    ))
                })?;
            let buffer = self
                .buffers
                .get(&buffer.0)
                .ok_or_else(|| BackendError::InvalidHandle(format!("buffer {:?}", buffer)))?;
            entries.push(wgpu::BindGroupEntry {
                binding: block.binding,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset,
                    size: NonZeroU64::new(size),
                }),
            });
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &program.uniform_layout,
            entries: &entries,
        }))
    }

    fn build_texture_group(&self, program: &WgpuProgram) -> BackendResult<wgpu::BindGroup> {
        let mut entries = Vec::new();
        for slot in &program.reflection.textures {
            let fallback = match slot.dimension {
                TextureDimension::D2 => self.white_2d,
                TextureDimension::Cube => self.white_cube,
            };
            let bound = self
                .texture_units
                .get(slot.unit as usize)
                .copied()
                .flatten()
                .and_then(|t| self.textures.get(&t.0))
                .filter(|t| t.desc.dimension == slot.dimension);
            let texture = match bound {
                Some(texture) => texture,
                None => self.textures.get(&fallback).ok_or_else(|| {
                    BackendError::InvalidHandle("fallback texture missing".into())
                })?,
            };
            entries.push(wgpu::BindGroupEntry {
                binding: slot.unit,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
        }
        for binding in &program.reflection.samplers {
            let sampler = if *binding == NEAREST_SAMPLER_BINDING {
                &self.nearest_sampler
            } else {
                &self.linear_sampler
            };
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &program.texture_layout,
            entries: &entries,
        }))
    }

    fn prepare_draw(
        &mut self,
        binding: VertexBindingHandle,
        vertex_count: u32,
        index: Option<(u32, u64, IndexFormat)>,
    ) -> BackendResult<()> {
        let program_id = self
            .program
            .ok_or_else(|| BackendError::InvalidHandle("draw issued without a program".into()))?;
        let binding = self
            .bindings
            .get(&binding.0)
            .cloned()
            .ok_or_else(|| BackendError::InvalidHandle(format!("vertex binding {:?}", binding)))?;
        let (color_formats, depth_format) = self
            .target_formats(self.target, self.draw_buffers)
            .ok_or_else(|| BackendError::InvalidHandle(format!("target {:?}", self.target)))?;

        let key = PipelineKey {
            program: program_id,
            stride: binding.stride,
            attributes: binding.attributes.clone(),
            color_formats,
            depth_format,
            depth: self.depth,
        };
        let pipeline = match self.pipeline_cache.get(&key).copied() {
            Some(id) => id,
            None => {
                let pipeline = self.build_pipeline(&key)?;
                let id = self.alloc_id();
                self.pipelines.insert(id, pipeline);
                self.pipeline_cache.insert(key, id);
                id
            }
        };

        let (uniform_group, texture_group) = {
            let program = self
                .programs
                .get(&program_id)
                .ok_or_else(|| BackendError::InvalidHandle(format!("program {}", program_id)))?;
            (
                self.build_uniform_group(program)?,
                self.build_texture_group(program)?,
            )
        };
        self.frame_bind_groups.push(uniform_group);
        let uniform_group = self.frame_bind_groups.len() - 1;
        self.frame_bind_groups.push(texture_group);
        let texture_group = self.frame_bind_groups.len() - 1;

        let index = match index {
            Some((count, byte_offset, format)) => {
                let buffer = binding.index_buffer.ok_or_else(|| {
                    BackendError::InvalidHandle("indexed draw without an index buffer".into())
                })?;
                Some(IndexedRange {
                    buffer: buffer.0,
                    format: Self::convert_index_format(format),
                    byte_offset,
                    count,
                })
            }
            None => None,
        };

        let draw = PreparedDraw {
            pipeline,
            uniform_group,
            texture_group,
            vertex_buffer: binding.vertex_buffer.0,
            vertex_offset: binding.base_offset,
            vertex_count,
            index,
        };
        let target = self.target;
        let draw_buffers = self.draw_buffers;
        self.pending
            .get_or_insert_with(|| PendingPass::new(target, draw_buffers))
            .draws
            .push(draw);
        Ok(())
    }

    /// Start a fresh segment if the current one already holds work
    fn split_pass(&mut self) {
        if self.pending.as_ref().is_some_and(|p| !p.draws.is_empty()) {
            self.flush_pass();
        }
        if self.pending.is_none() {
            self.pending = Some(PendingPass::new(self.target, self.draw_buffers));
        }
    }

    fn flush_pass(&mut self) {
        let Some(pass) = self.pending.take() else {
            return;
        };
        if pass.is_empty() {
            return;
        }
        let Some(mut encoder) = self.encoder.take() else {
            return;
        };

        {
            let Some((color_views, depth_view)) = self.target_views(pass.target, pass.draw_buffers)
            else {
                log::warn!("Dropping pass for unknown target {:?}", pass.target);
                self.encoder = Some(encoder);
                return;
            };

            let color_load = match pass.clear {
                Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: c[0] as f64,
                    g: c[1] as f64,
                    b: c[2] as f64,
                    a: c[3] as f64,
                }),
                None => wgpu::LoadOp::Load,
            };
            let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_views
                .iter()
                .map(|view| {
                    Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: color_load,
                            store: wgpu::StoreOp::Store,
                        },
                    })
                })
                .collect();
            let depth_attachment = depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: if pass.clear.is_some() {
                        wgpu::LoadOp::Clear(1.0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Recorded Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &pass.draws {
                let (Some(pipeline), Some(vertex_buffer)) = (
                    self.pipelines.get(&draw.pipeline),
                    self.buffers.get(&draw.vertex_buffer),
                ) else {
                    continue;
                };
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, &self.frame_bind_groups[draw.uniform_group], &[]);
                render_pass.set_bind_group(1, &self.frame_bind_groups[draw.texture_group], &[]);
                render_pass.set_vertex_buffer(0, vertex_buffer.slice(draw.vertex_offset..));
                match &draw.index {
                    Some(index) => {
                        let Some(index_buffer) = self.buffers.get(&index.buffer) else {
                            continue;
                        };
                        render_pass.set_index_buffer(
                            index_buffer.slice(index.byte_offset..),
                            index.format,
                        );
                        render_pass.draw_indexed(0..index.count, 0, 0..1);
                    }
                    None => render_pass.draw(0..draw.vertex_count, 0..1),
                }
            }
        }

        self.encoder = Some(encoder);
    }

    fn copy_depth(&mut self, src: RenderTarget, dst: RenderTarget) {
        let (Some(src_id), Some(dst_id)) =
            (self.target_depth_texture(src), self.target_depth_texture(dst))
        else {
            log::warn!("Depth blit between targets without depth: {:?} -> {:?}", src, dst);
            return;
        };
        let (Some(src_tex), Some(dst_tex)) = (self.textures.get(&src_id), self.textures.get(&dst_id))
        else {
            return;
        };
        if (src_tex.desc.width, src_tex.desc.height) != (dst_tex.desc.width, dst_tex.desc.height) {
            log::warn!(
                "Depth blit skipped: {}x{} -> {}x{}",
                src_tex.desc.width,
                src_tex.desc.height,
                dst_tex.desc.width,
                dst_tex.desc.height
            );
            return;
        }
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        encoder.copy_texture_to_texture(
            wgpu::ImageCopyTexture {
                texture: &src_tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyTexture {
                texture: &dst_tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: src_tex.desc.width,
                height: src_tex.desc.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn blit_color(&mut self, src: RenderTarget, dst: RenderTarget, filter: FilterMode) {
        let Some(dst_format) = self
            .target_formats(dst, 1)
            .and_then(|(colors, _)| colors.first().copied())
        else {
            log::warn!("Color blit into target without color: {:?}", dst);
            return;
        };
        if !self.blit_pipelines.contains_key(&dst_format) {
            let pipeline = blit::create_pipeline(
                &self.device,
                &self.blit_module,
                &self.blit_layout,
                dst_format,
            );
            self.blit_pipelines.insert(dst_format, pipeline);
        }

        let Some(mut encoder) = self.encoder.take() else {
            return;
        };
        {
            let source_view = match src {
                RenderTarget::Offscreen(_) => self
                    .target_views(src, 1)
                    .and_then(|(colors, _)| colors.first().copied()),
                RenderTarget::Default => None,
            };
            let dest_view = self
                .target_views(dst, 1)
                .and_then(|(colors, _)| colors.first().copied());
            let (Some(source_view), Some(dest_view), Some(pipeline)) =
                (source_view, dest_view, self.blit_pipelines.get(&dst_format))
            else {
                log::warn!("Color blit skipped: {:?} -> {:?}", src, dst);
                self.encoder = Some(encoder);
                return;
            };

            let sampler = match filter {
                FilterMode::Linear => &self.linear_sampler,
                FilterMode::Nearest => &self.nearest_sampler,
            };
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Blit Bind Group"),
                layout: &self.blit_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(source_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            });

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Blit Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: dest_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        self.encoder = Some(encoder);
    }
}

impl GraphicsBackend for WgpuBackend {
    fn limits(&self) -> BackendLimits {
        let limits = self.device.limits();
        BackendLimits {
            uniform_offset_alignment: limits.min_uniform_buffer_offset_alignment as u64,
            max_uniform_block_size: limits.max_uniform_buffer_binding_size as u64,
            max_color_attachments: limits.max_color_attachments,
        }
    }

    fn adapter_info(&self) -> String {
        let info = self.adapter.get_info();
        format!(
            "{} ({:?}, driver {} {})",
            info.name, info.backend, info.driver, info.driver_info
        )
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let max_size = self.device.limits().max_texture_dimension_2d;
        self.surface_config.width = width.min(max_size);
        self.surface_config.height = height.min(max_size);
        self.surface.configure(&self.device, &self.surface_config);

        self.textures.remove(&self.default_depth);
        match self.create_default_depth() {
            Ok(id) => self.default_depth = id,
            Err(e) => log::error!("Failed to recreate default depth buffer: {}", e),
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return Err(BackendError::SurfaceLost);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(BackendError::OutOfMemory),
            Err(e) => return Err(BackendError::AcquireImageFailed(e.to_string())),
        };

        self.swapchain_view = Some(
            output
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default()),
        );
        self.current_texture = Some(output);
        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        );
        self.frame_bind_groups.clear();
        self.target = RenderTarget::Default;
        self.draw_buffers = 1;
        self.pending = Some(PendingPass::new(self.target, self.draw_buffers));
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.flush_pass();

        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }

        self.swapchain_view = None;
        if let Some(texture) = self.current_texture.take() {
            texture.present();
        }

        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: Self::convert_buffer_usage(desc.usage),
            mapped_at_creation: false,
        });

        let id = self.alloc_id();
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: desc.label.as_deref(),
                contents: data,
                usage: Self::convert_buffer_usage(desc.usage),
            });

        let id = self.alloc_id();
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(buf) = self.buffers.get(&buffer.0) {
            self.queue.write_buffer(buf, offset, data);
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero extent",
                desc.label
            )));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.dimension.layer_count(),
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(Self::convert_view_dimension(desc.dimension)),
            ..Default::default()
        });

        let id = self.alloc_id();
        self.textures.insert(
            id,
            WgpuTexture {
                texture,
                view,
                desc: desc.clone(),
            },
        );
        Ok(TextureHandle(id))
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        layer: u32,
        data: &[u8],
        width: u32,
        height: u32,
    ) {
        if let Some(tex) = self.textures.get(&texture.0) {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &tex.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(width * 4),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures
            .get(&texture.0)
            .map(|t| (t.desc.width, t.desc.height))
    }

    fn create_render_target(
        &mut self,
        desc: &RenderTargetDescriptor,
    ) -> BackendResult<RenderTargetHandle> {
        let colors: Vec<Option<AttachmentInfo>> = desc
            .color_attachments
            .iter()
            .map(|t| self.attachment_info(*t))
            .collect();
        let depth = desc.depth_attachment.map(|t| self.attachment_info(t));
        let max = self.device.limits().max_color_attachments;
        validate_attachments(&colors, depth, max).map_err(BackendError::IncompleteTarget)?;

        let id = self.alloc_id();
        self.targets.insert(
            id,
            WgpuTarget {
                colors: desc.color_attachments.iter().map(|t| t.0).collect(),
                depth: desc.depth_attachment.map(|t| t.0),
            },
        );
        Ok(RenderTargetHandle(id))
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.source.as_str().into()),
            });

        let uniform_entries: Vec<wgpu::BindGroupLayoutEntry> = desc
            .reflection
            .uniform_blocks
            .iter()
            .map(|block| wgpu::BindGroupLayoutEntry {
                binding: block.binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(block.size),
                },
                count: None,
            })
            .collect();

        let mut texture_entries: Vec<wgpu::BindGroupLayoutEntry> = desc
            .reflection
            .textures
            .iter()
            .map(|slot| wgpu::BindGroupLayoutEntry {
                binding: slot.unit,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: Self::convert_view_dimension(slot.dimension),
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        texture_entries.extend(desc.reflection.samplers.iter().map(|binding| {
            wgpu::BindGroupLayoutEntry {
                binding: *binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            }
        }));

        let uniform_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Uniform Blocks"),
                entries: &uniform_entries,
            });
        let texture_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Texture Units"),
                entries: &texture_entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: desc.label.as_deref(),
                bind_group_layouts: &[&uniform_layout, &texture_layout],
                push_constant_ranges: &[],
            });

        let id = self.alloc_id();
        self.programs.insert(
            id,
            WgpuProgram {
                module,
                pipeline_layout,
                uniform_layout,
                texture_layout,
                reflection: desc.reflection.clone(),
            },
        );
        Ok(ProgramHandle(id))
    }

    fn create_vertex_binding(
        &mut self,
        desc: &VertexBindingDescriptor,
    ) -> BackendResult<VertexBindingHandle> {
        if !self.buffers.contains_key(&desc.vertex_buffer.0) {
            return Err(BackendError::InvalidHandle(format!(
                "vertex buffer {:?}",
                desc.vertex_buffer
            )));
        }
        let id = self.alloc_id();
        self.bindings.insert(id, desc.clone());
        Ok(VertexBindingHandle(id))
    }

    fn bind_render_target(&mut self, target: RenderTarget) {
        self.flush_pass();
        self.target = target;
        self.draw_buffers = 1;
        self.pending = Some(PendingPass::new(target, self.draw_buffers));
    }

    fn set_draw_buffers(&mut self, count: u32) {
        if count == self.draw_buffers {
            return;
        }
        self.flush_pass();
        self.draw_buffers = count;
        self.pending = Some(PendingPass::new(self.target, count));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.split_pass();
        if let Some(pass) = self.pending.as_mut() {
            pass.clear = Some(color);
        }
    }

    fn set_depth_state(&mut self, state: DepthState) {
        self.depth = state;
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.program = Some(program.0);
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        match self.texture_units.get_mut(unit as usize) {
            Some(slot) => *slot = Some(texture),
            None => log::warn!("Texture unit {} out of range", unit),
        }
    }

    fn bind_uniform_range(&mut self, binding: u32, buffer: BufferHandle, offset: u64, size: u64) {
        self.uniform_ranges.insert(binding, (buffer, offset, size));
    }

    fn draw(&mut self, binding: VertexBindingHandle, vertex_count: u32) {
        if let Err(e) = self.prepare_draw(binding, vertex_count, None) {
            log::error!("Draw skipped: {}", e);
        }
    }

    fn draw_indexed(
        &mut self,
        binding: VertexBindingHandle,
        index_count: u32,
        index_byte_offset: u64,
        format: IndexFormat,
    ) {
        if let Err(e) =
            self.prepare_draw(binding, 0, Some((index_count, index_byte_offset, format)))
        {
            log::error!("Indexed draw skipped: {}", e);
        }
    }

    fn blit(&mut self, src: RenderTarget, dst: RenderTarget, mask: BlitMask, filter: FilterMode) {
        self.flush_pass();
        match mask {
            BlitMask::Depth => self.copy_depth(src, dst),
            BlitMask::Color => self.blit_color(src, dst, filter),
        }
        self.pending = Some(PendingPass::new(self.target, self.draw_buffers));
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
        let pipelines = &mut self.pipelines;
        self.pipeline_cache.retain(|key, id| {
            if key.program != program.0 {
                return true;
            }
            pipelines.remove(&*id);
            false
        });
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        self.targets.remove(&target.0);
    }

    fn destroy_vertex_binding(&mut self, binding: VertexBindingHandle) {
        self.bindings.remove(&binding.0);
    }
}
