//! Resource management
//!
//! Handles meshes and their vertex bindings, textures, materials, models,
//! programs and the per-frame uniform allocator.

pub mod material;
pub mod mesh;
pub mod model;
pub mod primitives;
pub mod program;
pub mod texture;
pub mod uniform_allocator;

pub use material::*;
pub use mesh::*;
pub use model::{lit_layout, lit_submesh, location, Model, ModelId};
pub use program::*;
pub use texture::*;
pub use uniform_allocator::*;

use std::path::Path;

use crate::backend::{GraphicsBackend, ProgramHandle};
use crate::error::RendererResult;

/// Programs, textures and models shared by every render mode
#[derive(Debug)]
pub struct Assets {
    pub programs: ProgramRegistry,
    pub textures: TextureRegistry,
    pub models: Vec<Model>,
}

impl Assets {
    pub fn new<B: GraphicsBackend>(backend: &mut B) -> RendererResult<Self> {
        Ok(Self {
            programs: ProgramRegistry::new(),
            textures: TextureRegistry::new(backend)?,
            models: Vec::new(),
        })
    }

    pub fn add_model(&mut self, model: Model) -> ModelId {
        self.models.push(model);
        ModelId(self.models.len() - 1)
    }

    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.models.get(id.0)
    }

    /// Import an OBJ file and register it
    pub fn load_model<B: GraphicsBackend>(&mut self, backend: &mut B, path: &Path) -> RendererResult<ModelId> {
        let model = Model::load_obj(backend, &mut self.textures, path)?;
        Ok(self.add_model(model))
    }

    /// Destroy cached vertex bindings for a replaced program across all models
    pub fn forget_program<B: GraphicsBackend>(&mut self, backend: &mut B, program: ProgramHandle) {
        for model in &mut self.models {
            model.mesh.forget_program(backend, program);
        }
    }
}
