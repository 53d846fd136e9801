//! Models: a mesh plus the material of each submesh, imported from OBJ

use std::path::Path;

use glam::{Vec2, Vec3};

use super::material::Material;
use super::mesh::{IndexData, Mesh, SubmeshData, VertexLayout};
use super::texture::{TextureId, TextureRegistry};
use crate::backend::GraphicsBackend;
use crate::error::{AssetError, RendererResult};

/// Shader input locations shared by every built-in program
pub mod location {
    pub const POSITION: u32 = 0;
    pub const NORMAL: u32 = 1;
    pub const UV: u32 = 2;
    pub const TANGENT: u32 = 3;
    pub const BITANGENT: u32 = 4;
}

/// position3, normal3, uv2, tangent3, bitangent3
pub fn lit_layout() -> VertexLayout {
    VertexLayout::packed(&[
        (location::POSITION, 3),
        (location::NORMAL, 3),
        (location::UV, 2),
        (location::TANGENT, 3),
        (location::BITANGENT, 3),
    ])
}

/// Build an interleaved lit submesh, computing tangents per triangle.
///
/// Missing normals or uvs are zero filled.
pub fn lit_submesh(
    name: &str,
    positions: &[Vec3],
    normals: &[Vec3],
    uvs: &[Vec2],
    indices: Vec<u32>,
) -> SubmeshData {
    let count = positions.len();
    let mut tangents = vec![Vec3::ZERO; count];
    let mut bitangents = vec![Vec3::ZERO; count];

    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a >= count || b >= count || c >= count {
            continue;
        }
        let uv = |i: usize| uvs.get(i).copied().unwrap_or(Vec2::ZERO);
        let edge1 = positions[b] - positions[a];
        let edge2 = positions[c] - positions[a];
        let duv1 = uv(b) - uv(a);
        let duv2 = uv(c) - uv(a);

        let det = duv1.x * duv2.y - duv2.x * duv1.y;
        if det.abs() < f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;
        let bitangent = (edge2 * duv1.x - edge1 * duv2.x) * r;
        for i in [a, b, c] {
            tangents[i] += tangent;
            bitangents[i] += bitangent;
        }
    }

    let mut vertices = Vec::with_capacity(count * 14);
    for i in 0..count {
        let normal = normals.get(i).copied().unwrap_or(Vec3::ZERO);
        let uv = uvs.get(i).copied().unwrap_or(Vec2::ZERO);
        vertices.extend_from_slice(&positions[i].to_array());
        vertices.extend_from_slice(&normal.to_array());
        vertices.extend_from_slice(&uv.to_array());
        vertices.extend_from_slice(&tangents[i].normalize_or_zero().to_array());
        vertices.extend_from_slice(&bitangents[i].normalize_or_zero().to_array());
    }

    SubmeshData::new(name, lit_layout(), &vertices, IndexData::U32(indices))
}

/// Index of a model owned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(pub usize);

/// A renderable asset
#[derive(Debug)]
pub struct Model {
    pub name: String,
    pub mesh: Mesh,
    pub materials: Vec<Material>,
    /// Material index of each submesh, parallel to `mesh.submeshes`
    pub submesh_materials: Vec<Option<usize>>,
}

impl Model {
    /// Wrap a mesh whose submeshes all use the default material
    pub fn from_mesh(mesh: Mesh) -> Self {
        let submesh_materials = vec![None; mesh.submeshes.len()];
        Self {
            name: mesh.name.clone(),
            mesh,
            materials: Vec::new(),
            submesh_materials,
        }
    }

    pub fn material_for(&self, submesh: usize) -> Option<&Material> {
        self.submesh_materials
            .get(submesh)
            .copied()
            .flatten()
            .and_then(|i| self.materials.get(i))
    }

    /// Import an OBJ file with its MTL materials. Textures are resolved
    /// relative to the OBJ file; missing ones are logged and left unset.
    pub fn load_obj<B: GraphicsBackend>(
        backend: &mut B,
        textures: &mut TextureRegistry,
        path: &Path,
    ) -> RendererResult<Self> {
        let (models, materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
        )
        .map_err(|source| AssetError::Obj {
            path: path.to_path_buf(),
            source,
        })?;

        let materials = match materials {
            Ok(materials) => materials,
            Err(e) => {
                log::warn!("No materials for {}: {}", path.display(), e);
                Vec::new()
            }
        };

        let base = path.parent().unwrap_or(Path::new("."));
        let mut load = |file: Option<&String>| -> Option<TextureId> {
            let file = file?;
            let texture_path = base.join(file);
            match textures.load_2d(backend, &texture_path) {
                Ok(id) => Some(id),
                Err(e) => {
                    log::warn!("Material texture unavailable: {}", e);
                    None
                }
            }
        };

        let materials: Vec<Material> = materials
            .iter()
            .map(|m| Material {
                name: m.name.clone(),
                albedo: m.diffuse.map(Vec3::from).unwrap_or(Vec3::ONE),
                emissive: Vec3::ZERO,
                smoothness: Material::smoothness_from_shininess(m.shininess.unwrap_or(0.0)),
                albedo_texture: load(m.diffuse_texture.as_ref()),
                emissive_texture: load(m.unknown_param.get("map_Ke")),
                specular_texture: load(m.specular_texture.as_ref()),
                normals_texture: load(m.normal_texture.as_ref()),
                bump_texture: load(
                    m.unknown_param
                        .get("disp")
                        .or_else(|| m.unknown_param.get("map_disp")),
                ),
            })
            .collect();

        let mut parts = Vec::with_capacity(models.len());
        let mut submesh_materials = Vec::with_capacity(models.len());
        for model in &models {
            let mesh = &model.mesh;
            let positions: Vec<Vec3> = mesh
                .positions
                .chunks_exact(3)
                .map(|v| Vec3::new(v[0], v[1], v[2]))
                .collect();
            let normals: Vec<Vec3> = mesh
                .normals
                .chunks_exact(3)
                .map(|n| Vec3::new(n[0], n[1], n[2]))
                .collect();
            let uvs: Vec<Vec2> = mesh
                .texcoords
                .chunks_exact(2)
                .map(|t| Vec2::new(t[0], t[1]))
                .collect();

            parts.push(lit_submesh(
                &model.name,
                &positions,
                &normals,
                &uvs,
                mesh.indices.clone(),
            ));
            submesh_materials.push(mesh.material_id.filter(|i| *i < materials.len()));
        }

        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("model")
            .to_string();
        let mesh = Mesh::upload(backend, &name, &parts)?;
        log::info!(
            "Loaded model {} ({} submeshes, {} materials)",
            path.display(),
            mesh.submeshes.len(),
            materials.len()
        );

        Ok(Self {
            name,
            mesh,
            materials,
            submesh_materials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::error::RendererError;

    #[test]
    fn test_tangents_follow_uv_axes() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Z];
        let normals = [Vec3::Y; 3];
        let uvs = [Vec2::ZERO, Vec2::X, Vec2::Y];
        let data = lit_submesh("tri", &positions, &normals, &uvs, vec![0, 1, 2]);

        let floats = &data.vertices;
        assert_eq!(data.layout.stride, 56);
        assert_eq!(data.vertex_count(), 3);
        // tangent of the first vertex
        assert_eq!(&floats[8..11], &[1.0, 0.0, 0.0]);
        // bitangent of the first vertex
        assert_eq!(&floats[11..14], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_missing_attributes_are_zero_filled() {
        let data = lit_submesh("bare", &[Vec3::ONE], &[], &[], vec![]);
        let floats = &data.vertices;
        assert_eq!(floats.len(), 14);
        assert_eq!(&floats[3..8], &[0.0; 5]);
    }

    #[test]
    fn test_obj_import() {
        let dir = std::env::temp_dir().join(format!("model_obj_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("quad.obj");
        std::fs::write(
            &path,
            "o quad\nv -1 0 -1\nv 1 0 -1\nv 1 0 1\nv -1 0 1\n\
             vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\nvn 0 1 0\n\
             f 1/1/1 2/2/1 3/3/1 4/4/1\n",
        )
        .unwrap();

        let mut backend = DummyBackend::new(64, 64);
        let mut textures = TextureRegistry::new(&mut backend).unwrap();
        let model = Model::load_obj(&mut backend, &mut textures, &path).unwrap();

        assert_eq!(model.mesh.submeshes.len(), 1);
        assert_eq!(model.mesh.submeshes[0].index.unwrap().count, 6);
        assert!(model.material_for(0).is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_obj_is_an_error() {
        let mut backend = DummyBackend::new(64, 64);
        let mut textures = TextureRegistry::new(&mut backend).unwrap();
        let result = Model::load_obj(&mut backend, &mut textures, Path::new("nope/missing.obj"));
        assert!(matches!(
            result,
            Err(RendererError::Asset(AssetError::Obj { .. }))
        ));
    }
}
