//! Meshes, submeshes and the per-program vertex binding cache

use crate::backend::{
    BackendError, BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend, IndexFormat,
    ProgramHandle, VertexAttribute, VertexBindingDescriptor, VertexBindingHandle, VertexFormat,
};
use crate::error::{RendererError, RendererResult};
use crate::resources::program::Program;

/// Interleaved vertex layout of one submesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Pack `(location, components)` pairs back to back in the given order
    pub fn packed(slots: &[(u32, u32)]) -> Self {
        let mut offset = 0;
        let mut attributes = Vec::with_capacity(slots.len());
        for &(location, components) in slots {
            let format = VertexFormat::from_components(components).unwrap_or(VertexFormat::Float32x4);
            attributes.push(VertexAttribute {
                location,
                format,
                offset,
            });
            offset += format.size();
        }
        Self {
            stride: offset,
            attributes,
        }
    }

    pub fn attribute(&self, location: u32) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.location == location)
    }
}

/// CPU-side index data
#[derive(Debug, Clone, PartialEq)]
pub enum IndexData {
    None,
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexData {
    fn len(&self) -> usize {
        match self {
            IndexData::None => 0,
            IndexData::U16(v) => v.len(),
            IndexData::U32(v) => v.len(),
        }
    }

    fn format(&self) -> Option<IndexFormat> {
        match self {
            IndexData::None => None,
            IndexData::U16(_) => Some(IndexFormat::Uint16),
            IndexData::U32(_) => Some(IndexFormat::Uint32),
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            IndexData::None => &[],
            IndexData::U16(v) => bytemuck::cast_slice(v),
            IndexData::U32(v) => bytemuck::cast_slice(v),
        }
    }
}

/// Geometry of one submesh before upload
#[derive(Debug, Clone)]
pub struct SubmeshData {
    pub name: String,
    pub layout: VertexLayout,
    /// Interleaved vertex components matching `layout`
    pub vertices: Vec<f32>,
    pub indices: IndexData,
}

impl SubmeshData {
    pub fn new(name: impl Into<String>, layout: VertexLayout, vertices: &[f32], indices: IndexData) -> Self {
        Self {
            name: name.into(),
            layout,
            vertices: vertices.to_vec(),
            indices,
        }
    }

    pub fn vertex_count(&self) -> u32 {
        if self.layout.stride == 0 {
            return 0;
        }
        (self.vertices.len() as u64 * 4 / self.layout.stride) as u32
    }
}

/// Range of the shared index buffer a submesh draws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub byte_offset: u64,
    pub count: u32,
    pub format: IndexFormat,
}

#[derive(Debug)]
pub struct Submesh {
    pub name: String,
    pub layout: VertexLayout,
    /// Byte offset of the first vertex inside the mesh's vertex buffer
    pub vertex_offset: u64,
    pub vertex_count: u32,
    pub index: Option<IndexRange>,
    bindings: Vec<(ProgramHandle, VertexBindingHandle)>,
}

impl Submesh {
    /// Number of programs this submesh has been bound for
    pub fn cached_bindings(&self) -> usize {
        self.bindings.len()
    }

    /// Issue the draw for this submesh with an already resolved binding
    pub fn draw<B: GraphicsBackend>(&self, backend: &mut B, binding: VertexBindingHandle) {
        match self.index {
            Some(index) => backend.draw_indexed(binding, index.count, index.byte_offset, index.format),
            None => backend.draw(binding, self.vertex_count),
        }
    }
}

/// GPU mesh: one vertex buffer and one index buffer shared by all submeshes
#[derive(Debug)]
pub struct Mesh {
    pub name: String,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: Option<BufferHandle>,
    pub submeshes: Vec<Submesh>,
}

impl Mesh {
    /// Concatenate submeshes into shared buffers and upload them
    pub fn upload<B: GraphicsBackend>(
        backend: &mut B,
        name: &str,
        parts: &[SubmeshData],
    ) -> RendererResult<Self> {
        let mut vertex_bytes = Vec::new();
        let mut index_bytes = Vec::new();
        let mut submeshes = Vec::with_capacity(parts.len());

        for part in parts {
            let vertex_offset = vertex_bytes.len() as u64;
            vertex_bytes.extend_from_slice(bytemuck::cast_slice(&part.vertices));

            let index = part.indices.format().map(|format| {
                // Each range starts on a 4 byte boundary so u16 and u32 ranges can share a buffer
                while index_bytes.len() % 4 != 0 {
                    index_bytes.push(0);
                }
                let byte_offset = index_bytes.len() as u64;
                index_bytes.extend_from_slice(part.indices.bytes());
                IndexRange {
                    byte_offset,
                    count: part.indices.len() as u32,
                    format,
                }
            });

            submeshes.push(Submesh {
                name: part.name.clone(),
                layout: part.layout.clone(),
                vertex_offset,
                vertex_count: part.vertex_count(),
                index,
                bindings: Vec::new(),
            });
        }

        let vertex_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} Vertices", name)),
                size: vertex_bytes.len() as u64,
                usage: BufferUsage::VERTEX,
            },
            &vertex_bytes,
        )?;
        let index_buffer = if index_bytes.is_empty() {
            None
        } else {
            Some(backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("{} Indices", name)),
                    size: index_bytes.len() as u64,
                    usage: BufferUsage::INDEX,
                },
                &index_bytes,
            )?)
        };

        log::debug!(
            "Uploaded mesh '{}': {} submeshes, {} vertex bytes, {} index bytes",
            name,
            submeshes.len(),
            vertex_bytes.len(),
            index_bytes.len()
        );

        Ok(Self {
            name: name.to_string(),
            vertex_buffer,
            index_buffer,
            submeshes,
        })
    }

    /// Return the vertex binding for drawing `submesh` with `program`,
    /// building and caching it on first use.
    ///
    /// Every input the program declares must be present in the submesh
    /// layout, otherwise [`RendererError::LayoutMismatch`] names the pair.
    pub fn get_or_build_binding<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        submesh: usize,
        program: &Program,
    ) -> RendererResult<VertexBindingHandle> {
        let vertex_buffer = self.vertex_buffer;
        let index_buffer = self.index_buffer;
        let mesh_name = &self.name;
        let Some(part) = self.submeshes.get_mut(submesh) else {
            return Err(RendererError::Backend(BackendError::InvalidHandle(
                format!("submesh {} of mesh '{}'", submesh, mesh_name),
            )));
        };

        if let Some((_, binding)) = part.bindings.iter().find(|(p, _)| *p == program.handle) {
            return Ok(*binding);
        }

        let mut attributes = Vec::with_capacity(program.reflection.vertex_inputs.len());
        for input in &program.reflection.vertex_inputs {
            let attribute = part.layout.attribute(input.location).ok_or_else(|| {
                RendererError::LayoutMismatch {
                    program: program.name.clone(),
                    mesh: format!("{}/{}", mesh_name, part.name),
                    location: input.location,
                }
            })?;
            attributes.push(*attribute);
        }

        let binding = backend.create_vertex_binding(&VertexBindingDescriptor {
            label: Some(format!("{}/{} x {}", mesh_name, part.name, program.name)),
            vertex_buffer,
            index_buffer: part.index.and(index_buffer),
            stride: part.layout.stride,
            base_offset: part.vertex_offset,
            attributes,
        })?;
        part.bindings.push((program.handle, binding));
        Ok(binding)
    }

    /// Destroy every cached binding built for `program`, used when it is reloaded
    pub fn forget_program<B: GraphicsBackend>(&mut self, backend: &mut B, program: ProgramHandle) {
        for part in &mut self.submeshes {
            part.bindings.retain(|&(p, binding)| {
                if p != program {
                    return true;
                }
                backend.destroy_vertex_binding(binding);
                false
            });
        }
    }
}
