//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform GPU work. It records every command it
//! receives, keeps buffer contents in memory and snapshots the bound state
//! at each draw, so frame structure can be asserted without GPU hardware.

use std::collections::HashMap;

use crate::backend::traits::*;
use crate::backend::types::*;

/// A recorded backend command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginFrame,
    EndFrame,
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        len: usize,
    },
    BindRenderTarget(RenderTarget),
    SetDrawBuffers(u32),
    Clear([f32; 4]),
    SetDepthState(DepthState),
    UseProgram(ProgramHandle),
    BindTexture {
        unit: u32,
        texture: TextureHandle,
    },
    BindUniformRange {
        binding: u32,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    },
    Draw {
        binding: VertexBindingHandle,
        vertex_count: u32,
    },
    DrawIndexed {
        binding: VertexBindingHandle,
        index_count: u32,
        index_byte_offset: u64,
        format: IndexFormat,
    },
    Blit {
        src: RenderTarget,
        dst: RenderTarget,
        mask: BlitMask,
        filter: FilterMode,
    },
}

/// A uniform range bound when a draw was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundRange {
    pub binding: u32,
    pub buffer: BufferHandle,
    pub offset: u64,
    pub size: u64,
}

/// Snapshot of the pipeline state at a draw call
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub frame: u64,
    pub program: Option<ProgramHandle>,
    pub target: RenderTarget,
    pub draw_buffers: u32,
    pub depth: DepthState,
    pub binding: VertexBindingHandle,
    /// Ranges for the uniform blocks the program declares, by binding
    pub uniform_ranges: Vec<BoundRange>,
    /// Textures for the units the program samples, by unit
    pub textures: Vec<(u32, TextureHandle)>,
    pub vertex_count: u32,
    pub index_count: Option<u32>,
    pub index_byte_offset: u64,
}

#[derive(Debug, Clone)]
struct DummyTexture {
    desc: TextureDescriptor,
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    limits: BackendLimits,
    size: (u32, u32),
    frame: u64,
    in_frame: bool,
    next_id: u64,

    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, DummyTexture>,
    targets: HashMap<u64, RenderTargetDescriptor>,
    programs: HashMap<u64, ProgramDescriptor>,
    bindings: HashMap<u64, VertexBindingDescriptor>,

    // Bound state
    target: RenderTarget,
    draw_buffers: u32,
    depth: DepthState,
    program: Option<ProgramHandle>,
    texture_units: HashMap<u32, TextureHandle>,
    uniform_ranges: HashMap<u32, BoundRange>,

    commands: Vec<Command>,
    draws: Vec<DrawRecord>,
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

impl DummyBackend {
    /// Create a new dummy backend with a virtual surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            limits: BackendLimits::default(),
            size: (width, height),
            frame: 0,
            in_frame: false,
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            targets: HashMap::new(),
            programs: HashMap::new(),
            bindings: HashMap::new(),
            target: RenderTarget::Default,
            draw_buffers: 1,
            depth: DepthState::default(),
            program: None,
            texture_units: HashMap::new(),
            uniform_ranges: HashMap::new(),
            commands: Vec::new(),
            draws: Vec::new(),
        }
    }

    pub fn with_limits(mut self, limits: BackendLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    /// Every command recorded since creation (or the last `clear_records`)
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Every draw recorded since creation (or the last `clear_records`)
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Draws issued during the most recently begun frame
    pub fn last_frame_draws(&self) -> Vec<&DrawRecord> {
        self.draws.iter().filter(|d| d.frame == self.frame).collect()
    }

    /// Commands issued during the most recently begun frame
    pub fn last_frame_commands(&self) -> &[Command] {
        let start = self
            .commands
            .iter()
            .rposition(|c| *c == Command::BeginFrame)
            .unwrap_or(0);
        &self.commands[start..]
    }

    pub fn clear_records(&mut self) {
        self.commands.clear();
        self.draws.clear();
    }

    /// Current contents of a buffer
    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|b| b.as_slice())
    }

    pub fn program_descriptor(&self, program: ProgramHandle) -> Option<&ProgramDescriptor> {
        self.programs.get(&program.0)
    }

    pub fn binding_descriptor(
        &self,
        binding: VertexBindingHandle,
    ) -> Option<&VertexBindingDescriptor> {
        self.bindings.get(&binding.0)
    }

    /// Number of vertex bindings created so far
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0).map(|t| &t.desc)
    }

    pub fn render_target_descriptor(
        &self,
        target: RenderTargetHandle,
    ) -> Option<&RenderTargetDescriptor> {
        self.targets.get(&target.0)
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, command: Command) {
        log::trace!("DummyBackend: {:?}", command);
        self.commands.push(command);
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

    fn snapshot_draw(
        &mut self,
        binding: VertexBindingHandle,
        vertex_count: u32,
        index_count: Option<u32>,
        index_byte_offset: u64,
    ) {
        let reflection = self
            .program
            .and_then(|p| self.programs.get(&p.0))
            .map(|desc| desc.reflection.clone())
            .unwrap_or_default();

        let uniform_ranges = reflection
            .uniform_blocks
            .iter()
            .filter_map(|block| self.uniform_ranges.get(&block.binding).copied())
            .collect();
        let textures = reflection
            .textures
            .iter()
            .filter_map(|slot| {
                self.texture_units
                    .get(&slot.unit)
                    .map(|texture| (slot.unit, *texture))
            })
            .collect();

        self.draws.push(DrawRecord {
            frame: self.frame,
            program: self.program,
            target: self.target,
            draw_buffers: self.draw_buffers,
            depth: self.depth,
            binding,
            uniform_ranges,
            textures,
            vertex_count,
            index_count,
            index_byte_offset,
        });
    }
}

impl GraphicsBackend for DummyBackend {
    fn limits(&self) -> BackendLimits {
        self.limits
    }

    fn adapter_info(&self) -> String {
        self.name().to_string()
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.size = (width, height);
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        self.frame += 1;
        self.in_frame = true;
        self.target = RenderTarget::Default;
        self.draw_buffers = 1;
        self.record(Command::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.in_frame = false;
        self.record(Command::EndFrame);
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let id = self.alloc_id();
        self.buffers.insert(id, vec![0; desc.size as usize]);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        log::trace!(
            "DummyBackend: creating buffer {:?} with {} bytes",
            desc.label,
            data.len()
        );
        let id = self.alloc_id();
        self.buffers.insert(id, data.to_vec());
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(contents) = self.buffers.get_mut(&buffer.0) {
            let start = offset as usize;
            let end = start + data.len();
            if end > contents.len() {
                contents.resize(end, 0);
            }
            contents[start..end].copy_from_slice(data);
        }
        self.record(Command::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.dimension
        );
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero extent",
                desc.label
            )));
        }
        let id = self.alloc_id();
        self.textures.insert(id, DummyTexture { desc: desc.clone() });
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
        log::trace!(
            "DummyBackend: writing {} bytes to texture {:?} layer {} ({}x{})",
            data.len(),
            texture,
            layer,
            width,
            height
        );
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
        validate_attachments(&colors, depth, self.limits.max_color_attachments)
            .map_err(BackendError::IncompleteTarget)?;

        let id = self.alloc_id();
        self.targets.insert(id, desc.clone());
        Ok(RenderTargetHandle(id))
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        log::trace!("DummyBackend: creating program {:?}", desc.label);
        let id = self.alloc_id();
        self.programs.insert(id, desc.clone());
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
        log::trace!("DummyBackend: creating vertex binding {:?}", desc.label);
        let id = self.alloc_id();
        self.bindings.insert(id, desc.clone());
        Ok(VertexBindingHandle(id))
    }

    fn bind_render_target(&mut self, target: RenderTarget) {
        self.target = target;
        // Fresh targets start with a single draw buffer
        self.draw_buffers = 1;
        self.record(Command::BindRenderTarget(target));
    }

    fn set_draw_buffers(&mut self, count: u32) {
        self.draw_buffers = count;
        self.record(Command::SetDrawBuffers(count));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.record(Command::Clear(color));
    }

    fn set_depth_state(&mut self, state: DepthState) {
        self.depth = state;
        self.record(Command::SetDepthState(state));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.program = Some(program);
        self.record(Command::UseProgram(program));
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.texture_units.insert(unit, texture);
        self.record(Command::BindTexture { unit, texture });
    }

    fn bind_uniform_range(&mut self, binding: u32, buffer: BufferHandle, offset: u64, size: u64) {
        self.uniform_ranges.insert(
            binding,
            BoundRange {
                binding,
                buffer,
                offset,
                size,
            },
        );
        self.record(Command::BindUniformRange {
            binding,
            buffer,
            offset,
            size,
        });
    }

    fn draw(&mut self, binding: VertexBindingHandle, vertex_count: u32) {
        self.snapshot_draw(binding, vertex_count, None, 0);
        self.record(Command::Draw {
            binding,
            vertex_count,
        });
    }

    fn draw_indexed(
        &mut self,
        binding: VertexBindingHandle,
        index_count: u32,
        index_byte_offset: u64,
        format: IndexFormat,
    ) {
        self.snapshot_draw(binding, 0, Some(index_count), index_byte_offset);
        self.record(Command::DrawIndexed {
            binding,
            index_count,
            index_byte_offset,
            format,
        });
    }

    fn blit(&mut self, src: RenderTarget, dst: RenderTarget, mask: BlitMask, filter: FilterMode) {
        self.record(Command::Blit {
            src,
            dst,
            mask,
            filter,
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        self.targets.remove(&target.0);
    }

    fn destroy_vertex_binding(&mut self, binding: VertexBindingHandle) {
        self.bindings.remove(&binding.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_buffer_keeps_contents() {
        let mut backend = DummyBackend::new(64, 64);
        let buffer = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 8,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            })
            .unwrap();
        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]);
        assert_eq!(backend.buffer_data(buffer), Some(&[0, 0, 0, 0, 1, 2, 3, 4][..]));
    }

    #[test]
    fn test_draw_snapshot_filters_by_program_interface() {
        let mut backend = DummyBackend::new(64, 64);
        let buffer = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 1024,
                usage: BufferUsage::UNIFORM,
            })
            .unwrap();
        let program = backend
            .create_program(&ProgramDescriptor {
                label: Some("only-global".into()),
                source: String::new(),
                reflection: ShaderReflection {
                    uniform_blocks: vec![UniformBlockInfo {
                        binding: 0,
                        size: 16,
                    }],
                    ..Default::default()
                },
                color_outputs: 1,
            })
            .unwrap();
        let binding = backend
            .create_vertex_binding(&VertexBindingDescriptor {
                label: None,
                vertex_buffer: buffer,
                index_buffer: None,
                stride: 12,
                base_offset: 0,
                attributes: vec![],
            })
            .unwrap();

        backend.begin_frame().unwrap();
        backend.use_program(program);
        backend.bind_uniform_range(0, buffer, 0, 16);
        backend.bind_uniform_range(1, buffer, 256, 128);
        backend.draw(binding, 3);
        backend.end_frame().unwrap();

        let draws = backend.last_frame_draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].uniform_ranges.len(), 1);
        assert_eq!(draws[0].uniform_ranges[0].binding, 0);
    }

    #[test]
    fn test_unknown_vertex_buffer_is_rejected() {
        let mut backend = DummyBackend::new(64, 64);
        let result = backend.create_vertex_binding(&VertexBindingDescriptor {
            label: None,
            vertex_buffer: BufferHandle(999),
            index_buffer: None,
            stride: 12,
            base_offset: 0,
            attributes: vec![],
        });
        assert!(matches!(result, Err(BackendError::InvalidHandle(_))));
    }
}
