//! Linear uniform allocator for per-frame shader parameters.
//!
//! The allocator owns one fixed-capacity uniform buffer. Each frame the
//! pipeline appends blocks to a CPU staging copy, remembers the
//! `(offset, size)` of every block it binds, and uploads the written prefix
//! in one transfer at the end of the frame.
//!
//! ```ignore
//! allocator.begin_frame();
//! let start = allocator.begin_block()?;
//! allocator.push_vec3(camera_position)?;
//! allocator.push_u32(light_count)?;
//! let global = allocator.end_block(start, declared_size)?;
//! backend.bind_uniform_range(0, allocator.buffer(), global.offset, global.size);
//! allocator.end_frame(backend);
//! ```

use bytemuck::Pod;
use glam::{Mat4, Vec3, Vec4};

use crate::backend::{BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend};
use crate::error::{RendererError, RendererResult};

/// A byte range of the uniform buffer written this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBlock {
    pub offset: u64,
    pub size: u64,
}

/// Append-only allocator over a single uniform buffer
#[derive(Debug)]
pub struct UniformAllocator {
    buffer: BufferHandle,
    staging: Vec<u8>,
    capacity: u64,
    head: u64,
    mapped: bool,
    block_alignment: u64,
}

impl UniformAllocator {
    /// Create the backing buffer. Without an explicit capacity the buffer
    /// spans the backend's largest uniform block.
    pub fn new<B: GraphicsBackend>(backend: &mut B, capacity: Option<u64>) -> RendererResult<Self> {
        let limits = backend.limits();
        let capacity = capacity.unwrap_or(limits.max_uniform_block_size);
        let buffer = backend.create_buffer(&BufferDescriptor {
            label: Some("Uniform Allocator".into()),
            size: capacity,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;

        log::debug!(
            "Uniform allocator: {} bytes, block alignment {}",
            capacity,
            limits.uniform_offset_alignment
        );

        Ok(Self {
            buffer,
            staging: vec![0; capacity as usize],
            capacity,
            head: 0,
            mapped: false,
            block_alignment: limits.uniform_offset_alignment.max(1),
        })
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn head(&self) -> u64 {
        self.head
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Alignment every bound block must start on
    pub fn block_alignment(&self) -> u64 {
        self.block_alignment
    }

    /// Open the frame's write session and rewind to the start of the buffer
    pub fn begin_frame(&mut self) {
        self.head = 0;
        self.mapped = true;
    }

    /// Upload everything written this frame and close the write session
    pub fn end_frame<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if self.mapped && self.head > 0 {
            backend.write_buffer(self.buffer, 0, &self.staging[..self.head as usize]);
        }
        self.mapped = false;
    }

    /// Advance `head` to the next multiple of `alignment`
    pub fn align_to(&mut self, alignment: u64) -> RendererResult<()> {
        if alignment <= 1 {
            return Ok(());
        }
        let aligned = self.head.div_ceil(alignment) * alignment;
        if aligned > self.capacity {
            return Err(RendererError::UniformCapacity {
                head: self.head,
                requested: aligned - self.head,
                capacity: self.capacity,
            });
        }
        self.head = aligned;
        Ok(())
    }

    /// Copy `bytes` at `head` and return the offset they were written at
    pub fn push(&mut self, bytes: &[u8]) -> RendererResult<u64> {
        if !self.mapped {
            return Err(RendererError::NotMapped);
        }
        let len = bytes.len() as u64;
        if self.head + len > self.capacity {
            return Err(RendererError::UniformCapacity {
                head: self.head,
                requested: len,
                capacity: self.capacity,
            });
        }
        let offset = self.head;
        let start = offset as usize;
        self.staging[start..start + bytes.len()].copy_from_slice(bytes);
        self.head += len;
        Ok(offset)
    }

    pub fn push_pod<T: Pod>(&mut self, value: &T) -> RendererResult<u64> {
        self.push(bytemuck::bytes_of(value))
    }

    pub fn push_u32(&mut self, value: u32) -> RendererResult<u64> {
        self.align_to(4)?;
        self.push_pod(&value)
    }

    pub fn push_f32(&mut self, value: f32) -> RendererResult<u64> {
        self.align_to(4)?;
        self.push_pod(&value)
    }

    /// A vec3 starts on a 16 byte boundary but only occupies 12 bytes
    pub fn push_vec3(&mut self, value: Vec3) -> RendererResult<u64> {
        self.align_to(16)?;
        self.push_pod(&value.to_array())
    }

    pub fn push_vec4(&mut self, value: Vec4) -> RendererResult<u64> {
        self.align_to(16)?;
        self.push_pod(&value.to_array())
    }

    pub fn push_mat4(&mut self, value: &Mat4) -> RendererResult<u64> {
        self.align_to(16)?;
        self.push_pod(&value.to_cols_array())
    }

    pub fn push_zeroed(&mut self, len: u64) -> RendererResult<u64> {
        if !self.mapped {
            return Err(RendererError::NotMapped);
        }
        if self.head + len > self.capacity {
            return Err(RendererError::UniformCapacity {
                head: self.head,
                requested: len,
                capacity: self.capacity,
            });
        }
        let offset = self.head;
        self.staging[offset as usize..(offset + len) as usize].fill(0);
        self.head += len;
        Ok(offset)
    }

    /// Align to the backend's block alignment and return where the block starts
    pub fn begin_block(&mut self) -> RendererResult<u64> {
        if !self.mapped {
            return Err(RendererError::NotMapped);
        }
        self.align_to(self.block_alignment)?;
        Ok(self.head)
    }

    /// Close a block opened at `start`, zero-padding it to at least `min_size`
    pub fn end_block(&mut self, start: u64, min_size: u64) -> RendererResult<UniformBlock> {
        let written = self.head - start;
        if written < min_size {
            self.push_zeroed(min_size - written)?;
        }
        Ok(UniformBlock {
            offset: start,
            size: self.head - start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    fn allocator(capacity: u64) -> (DummyBackend, UniformAllocator) {
        let mut backend = DummyBackend::new(64, 64);
        let allocator = UniformAllocator::new(&mut backend, Some(capacity)).unwrap();
        (backend, allocator)
    }

    #[test]
    fn test_push_returns_pre_push_offset() {
        let (_backend, mut alloc) = allocator(1024);
        alloc.begin_frame();
        assert_eq!(alloc.push(&[1, 2, 3]).unwrap(), 0);
        assert_eq!(alloc.push(&[4]).unwrap(), 3);
        assert_eq!(alloc.head(), 4);
    }

    #[test]
    fn test_head_is_monotonic_and_resets_each_frame() {
        let (mut backend, mut alloc) = allocator(4096);
        alloc.begin_frame();
        let mut last = alloc.head();
        for size in [12u64, 64, 3, 128, 16] {
            alloc.begin_block().unwrap();
            alloc.push_zeroed(size).unwrap();
            assert!(alloc.head() >= last);
            last = alloc.head();
        }
        alloc.end_frame(&mut backend);

        alloc.begin_frame();
        assert_eq!(alloc.head(), 0);
    }

    #[test]
    fn test_align_to_is_idempotent() {
        let (_backend, mut alloc) = allocator(1024);
        alloc.begin_frame();
        alloc.push(&[0; 5]).unwrap();
        alloc.align_to(256).unwrap();
        let once = alloc.head();
        alloc.align_to(256).unwrap();
        assert_eq!(once, 256);
        assert_eq!(alloc.head(), once);
    }

    #[test]
    fn test_vec3_then_u32_packs_tightly() {
        let (_backend, mut alloc) = allocator(1024);
        alloc.begin_frame();
        assert_eq!(alloc.push_vec3(Vec3::ONE).unwrap(), 0);
        assert_eq!(alloc.push_u32(7).unwrap(), 12);
        assert_eq!(alloc.push_vec3(Vec3::ONE).unwrap(), 16);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let (_backend, mut alloc) = allocator(64);
        alloc.begin_frame();
        alloc.push(&[0; 60]).unwrap();
        let err = alloc.push(&[0; 8]).unwrap_err();
        assert!(matches!(
            err,
            RendererError::UniformCapacity {
                head: 60,
                requested: 8,
                capacity: 64
            }
        ));
        assert_eq!(alloc.head(), 60);
    }

    #[test]
    fn test_push_outside_frame_is_rejected() {
        let (mut backend, mut alloc) = allocator(64);
        assert!(matches!(alloc.push(&[1]), Err(RendererError::NotMapped)));
        alloc.begin_frame();
        alloc.push(&[1]).unwrap();
        alloc.end_frame(&mut backend);
        assert!(matches!(alloc.push(&[1]), Err(RendererError::NotMapped)));
    }

    #[test]
    fn test_end_block_pads_to_declared_size() {
        let (_backend, mut alloc) = allocator(1024);
        alloc.begin_frame();
        alloc.push(&[9]).unwrap();
        let start = alloc.begin_block().unwrap();
        alloc.push_u32(1).unwrap();
        let block = alloc.end_block(start, 32).unwrap();
        assert_eq!(block, UniformBlock { offset: 256, size: 32 });
    }

    #[test]
    fn test_end_frame_uploads_written_prefix() {
        let (mut backend, mut alloc) = allocator(256);
        alloc.begin_frame();
        alloc.push_u32(0xAABBCCDD).unwrap();
        alloc.end_frame(&mut backend);

        let data = backend.buffer_data(alloc.buffer()).unwrap();
        assert_eq!(&data[..4], &0xAABBCCDDu32.to_ne_bytes());
    }
}
