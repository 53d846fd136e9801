//! Uniform block packing for the built-in programs.
//!
//! Blocks follow the std140-style rules WGSL applies to uniform buffers:
//! scalars align to 4 bytes, vec3/vec4/mat4 to 16, and every light record
//! starts on a 16 byte boundary. Each block is zero-padded to the size the
//! program declares so the bound range always covers the whole struct.

use glam::{Mat4, Vec3, Vec4};

use crate::error::RendererResult;
use crate::resources::{UniformAllocator, UniformBlock};
use crate::scene::Light;

/// Length of the light arrays declared by the lighting and forward programs
pub const MAX_LIGHTS: usize = 16;

/// Light records start on this boundary
pub const LIGHT_RECORD_ALIGNMENT: u64 = 16;

/// camera_position, light_count, show_relief
pub fn push_geometry_globals(
    allocator: &mut UniformAllocator,
    camera_position: Vec3,
    light_count: u32,
    show_relief: bool,
    block_size: u64,
) -> RendererResult<UniformBlock> {
    let start = allocator.begin_block()?;
    allocator.push_vec3(camera_position)?;
    allocator.push_u32(light_count)?;
    allocator.push_u32(show_relief as u32)?;
    allocator.end_block(start, block_size)
}

/// camera_position, light_count, then one 64 byte record per light:
/// kind, color, direction, position, intensity
pub fn push_lighting_globals(
    allocator: &mut UniformAllocator,
    camera_position: Vec3,
    lights: &[Light],
    block_size: u64,
) -> RendererResult<UniformBlock> {
    let start = allocator.begin_block()?;
    allocator.push_vec3(camera_position)?;
    allocator.push_u32(lights.len() as u32)?;
    for light in lights {
        allocator.align_to(LIGHT_RECORD_ALIGNMENT)?;
        allocator.push_u32(light.kind as u32)?;
        allocator.push_vec3(light.color)?;
        allocator.push_vec3(light.direction)?;
        allocator.push_vec3(light.position)?;
        allocator.push_f32(light.intensity)?;
    }
    allocator.end_block(start, block_size)
}

/// camera_position, light_count, then one 48 byte record per light:
/// kind, color, direction
pub fn push_forward_globals(
    allocator: &mut UniformAllocator,
    camera_position: Vec3,
    lights: &[Light],
    block_size: u64,
) -> RendererResult<UniformBlock> {
    let start = allocator.begin_block()?;
    allocator.push_vec3(camera_position)?;
    allocator.push_u32(lights.len() as u32)?;
    for light in lights {
        allocator.align_to(LIGHT_RECORD_ALIGNMENT)?;
        allocator.push_u32(light.kind as u32)?;
        allocator.push_vec3(light.color)?;
        allocator.push_vec3(light.direction)?;
    }
    allocator.end_block(start, block_size)
}

pub fn push_entity_locals(
    allocator: &mut UniformAllocator,
    model: &Mat4,
    view_projection: &Mat4,
    block_size: u64,
) -> RendererResult<UniformBlock> {
    let start = allocator.begin_block()?;
    allocator.push_mat4(model)?;
    allocator.push_mat4(view_projection)?;
    allocator.end_block(start, block_size)
}

pub fn push_gizmo_locals(
    allocator: &mut UniformAllocator,
    model: &Mat4,
    view_projection: &Mat4,
    color: Vec4,
    block_size: u64,
) -> RendererResult<UniformBlock> {
    let start = allocator.begin_block()?;
    allocator.push_mat4(model)?;
    allocator.push_mat4(view_projection)?;
    allocator.push_vec4(color)?;
    allocator.end_block(start, block_size)
}

pub fn push_skybox_locals(
    allocator: &mut UniformAllocator,
    model: &Mat4,
    view: &Mat4,
    projection: &Mat4,
    camera_position: Vec3,
    block_size: u64,
) -> RendererResult<UniformBlock> {
    let start = allocator.begin_block()?;
    allocator.push_mat4(model)?;
    allocator.push_mat4(view)?;
    allocator.push_mat4(projection)?;
    allocator.push_vec4(camera_position.extend(1.0))?;
    allocator.end_block(start, block_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::scene::default_lights;

    fn allocator() -> (DummyBackend, UniformAllocator) {
        let mut backend = DummyBackend::new(64, 64);
        let mut allocator = UniformAllocator::new(&mut backend, Some(4096)).unwrap();
        allocator.begin_frame();
        (backend, allocator)
    }

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn read_f32(bytes: &[u8], offset: usize) -> f32 {
        f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_lighting_record_layout() {
        let (mut backend, mut allocator) = allocator();
        let lights = default_lights();
        let block = push_lighting_globals(&mut allocator, Vec3::new(1.0, 2.0, 3.0), &lights, 1040).unwrap();
        assert_eq!(block, UniformBlock { offset: 0, size: 1040 });

        allocator.end_frame(&mut backend);
        let data = backend.buffer_data(allocator.buffer()).unwrap();
        assert_eq!(read_f32(data, 8), 3.0);
        assert_eq!(read_u32(data, 12), 7);

        // Second light record starts at 16 + 64
        let record = 16 + 64;
        assert_eq!(read_u32(data, record), 1);
        assert_eq!(read_f32(data, record + 16), lights[1].color.x);
        assert_eq!(read_f32(data, record + 32), lights[1].direction.x);
        assert_eq!(read_f32(data, record + 48), lights[1].position.x);
        assert_eq!(read_f32(data, record + 60), lights[1].intensity);
    }

    #[test]
    fn test_forward_records_are_48_bytes() {
        let (mut backend, mut allocator) = allocator();
        let lights = default_lights();
        let block = push_forward_globals(&mut allocator, Vec3::ZERO, &lights, 784).unwrap();
        assert_eq!(block.size, 784);

        allocator.end_frame(&mut backend);
        let data = backend.buffer_data(allocator.buffer()).unwrap();
        let record = 16 + 2 * 48;
        assert_eq!(read_u32(data, record), lights[2].kind as u32);
        assert_eq!(read_f32(data, record + 16), lights[2].color.x);
        assert_eq!(read_f32(data, record + 32), lights[2].direction.x);
    }

    #[test]
    fn test_geometry_globals_pad_to_declared_size() {
        let (_backend, mut allocator) = allocator();
        let block = push_geometry_globals(&mut allocator, Vec3::ONE, 7, true, 32).unwrap();
        assert_eq!(block, UniformBlock { offset: 0, size: 32 });
        assert_eq!(allocator.head(), 32);
    }

    #[test]
    fn test_local_blocks_start_aligned() {
        let (_backend, mut allocator) = allocator();
        push_geometry_globals(&mut allocator, Vec3::ONE, 1, false, 32).unwrap();
        let local = push_entity_locals(&mut allocator, &Mat4::IDENTITY, &Mat4::IDENTITY, 128).unwrap();
        assert_eq!(local.offset % allocator.block_alignment(), 0);
        assert_eq!(local.size, 128);

        let gizmo = push_gizmo_locals(&mut allocator, &Mat4::IDENTITY, &Mat4::IDENTITY, Vec4::ONE, 144).unwrap();
        assert_eq!(gizmo.size, 144);
        let sky = push_skybox_locals(&mut allocator, &Mat4::IDENTITY, &Mat4::IDENTITY, &Mat4::IDENTITY, Vec3::ZERO, 208).unwrap();
        assert_eq!(sky.size, 208);
    }
}
