//! Procedural geometry used by the demo and as asset fallbacks

use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use super::mesh::{IndexData, SubmeshData, VertexLayout};
use super::model::{lit_submesh, location};

const SPHERE_SECTORS: u32 = 32;
const SPHERE_STACKS: u32 = 16;

/// Corners of an axis aligned cube as 36 triangle-list vertices
fn cube_vertices(half: f32) -> Vec<(Vec3, Vec3, Vec2)> {
    // (normal, u axis, v axis); u x v == normal keeps every face counter-clockwise
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];
    let corners = [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ];

    let mut vertices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        for uv in corners {
            let local = (uv * 2.0 - Vec2::ONE) * half;
            let position = normal * half + u * local.x + v * local.y;
            vertices.push((position, normal, uv));
        }
    }
    vertices
}

/// Unit plane spanning +-1 on X and Z, facing +Y, with the full lit layout
pub fn plane() -> SubmeshData {
    let positions = [
        Vec3::new(-1.0, 0.0, 1.0),
        Vec3::new(1.0, 0.0, 1.0),
        Vec3::new(1.0, 0.0, -1.0),
        Vec3::new(-1.0, 0.0, -1.0),
    ];
    let uvs = [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ];
    lit_submesh("plane", &positions, &[Vec3::Y; 4], &uvs, vec![0, 1, 2, 0, 2, 3])
}

/// 36 vertex cube spanning +-1 with position, normal and uv
pub fn cube() -> SubmeshData {
    let mut vertices = Vec::with_capacity(36 * 8);
    for (position, normal, uv) in cube_vertices(1.0) {
        vertices.extend_from_slice(&position.to_array());
        vertices.extend_from_slice(&normal.to_array());
        vertices.extend_from_slice(&uv.to_array());
    }
    let layout = VertexLayout::packed(&[
        (location::POSITION, 3),
        (location::NORMAL, 3),
        (location::UV, 2),
    ]);
    SubmeshData::new("cube", layout, &vertices, IndexData::None)
}

/// Unit sphere with position, uv and normal, indexed as a triangle list
pub fn sphere() -> SubmeshData {
    let mut vertices = Vec::new();
    for stack in 0..=SPHERE_STACKS {
        let v = stack as f32 / SPHERE_STACKS as f32;
        let phi = PI / 2.0 - v * PI;
        for sector in 0..=SPHERE_SECTORS {
            let u = sector as f32 / SPHERE_SECTORS as f32;
            let theta = u * 2.0 * PI;
            let position = Vec3::new(phi.cos() * theta.cos(), phi.sin(), phi.cos() * theta.sin());
            vertices.extend_from_slice(&position.to_array());
            vertices.extend_from_slice(&[u, 1.0 - v]);
            vertices.extend_from_slice(&position.to_array());
        }
    }

    let row = SPHERE_SECTORS + 1;
    let mut indices = Vec::with_capacity((SPHERE_STACKS * SPHERE_SECTORS * 6) as usize);
    for stack in 0..SPHERE_STACKS {
        for sector in 0..SPHERE_SECTORS {
            let a = stack * row + sector;
            let b = a + row;
            indices.extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
        }
    }

    let layout = VertexLayout::packed(&[
        (location::POSITION, 3),
        (location::UV, 2),
        (location::NORMAL, 3),
    ]);
    SubmeshData::new("sphere", layout, &vertices, IndexData::U32(indices))
}

/// Clip-space quad covering the viewport, with position and uv
pub fn quad() -> SubmeshData {
    #[rustfmt::skip]
    let vertices: [f32; 20] = [
        -1.0, -1.0, 0.0,  0.0, 0.0,
         1.0, -1.0, 0.0,  1.0, 0.0,
         1.0,  1.0, 0.0,  1.0, 1.0,
        -1.0,  1.0, 0.0,  0.0, 1.0,
    ];
    let layout = VertexLayout::packed(&[(location::POSITION, 3), (location::UV, 2)]);
    SubmeshData::new("quad", layout, &vertices, IndexData::U16(vec![0, 1, 2, 0, 2, 3]))
}

/// Position-only cube spanning +-1 for the sky background
pub fn skybox_cube() -> SubmeshData {
    let vertices: Vec<f32> = cube_vertices(1.0)
        .into_iter()
        .flat_map(|(position, _, _)| position.to_array())
        .collect();
    let layout = VertexLayout::packed(&[(location::POSITION, 3)]);
    SubmeshData::new("skybox", layout, &vertices, IndexData::None)
}

/// Cube spanning +-0.5 with position and normal, used for the reflective cube
pub fn reflective_cube() -> SubmeshData {
    let mut vertices = Vec::with_capacity(36 * 6);
    for (position, normal, _) in cube_vertices(0.5) {
        vertices.extend_from_slice(&position.to_array());
        vertices.extend_from_slice(&normal.to_array());
    }
    let layout = VertexLayout::packed(&[(location::POSITION, 3), (location::NORMAL, 3)]);
    SubmeshData::new("reflective_cube", layout, &vertices, IndexData::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_faces_point_outwards() {
        for (position, normal, _) in cube_vertices(1.0) {
            assert!((position.dot(normal) - 1.0).abs() < 1e-6);
            assert!(position.abs().max_element() <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn test_primitive_sizes() {
        assert_eq!(cube().vertex_count(), 36);
        assert_eq!(skybox_cube().vertex_count(), 36);
        assert_eq!(reflective_cube().vertex_count(), 36);
        assert_eq!(quad().vertex_count(), 4);
        assert_eq!(quad().indices, IndexData::U16(vec![0, 1, 2, 0, 2, 3]));
        assert_eq!(plane().layout.stride, 56);
    }

    #[test]
    fn test_sphere_is_indexed_triangle_list() {
        let sphere = sphere();
        assert_eq!(sphere.vertex_count(), 33 * 17);
        match &sphere.indices {
            IndexData::U32(indices) => {
                assert_eq!(indices.len(), 32 * 16 * 6);
                assert!(indices.iter().all(|&i| i < 33 * 17));
            }
            other => panic!("unexpected indices {other:?}"),
        }
    }

    #[test]
    fn test_reflective_cube_is_half_unit() {
        let cube = reflective_cube();
        let floats = &cube.vertices;
        assert!(floats
            .chunks_exact(6)
            .all(|v| v[..3].iter().all(|c| c.abs() <= 0.5 + 1e-6)));
    }
}
