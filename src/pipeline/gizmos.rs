//! Light gizmos: a cube per directional light, a sphere per point light

use glam::{Mat4, Vec3};

use crate::backend::{GraphicsBackend, ProgramHandle};
use crate::error::RendererResult;
use crate::resources::{primitives, Mesh, Program};
use crate::scene::{Light, LightKind};

use super::uniforms::push_gizmo_locals;
use super::{draw_mesh, Frame};

/// World-space size of a gizmo relative to the unit primitives
pub const GIZMO_SCALE: f32 = 0.1;

#[derive(Debug)]
pub struct LightGizmos {
    cube: Mesh,
    sphere: Mesh,
}

impl LightGizmos {
    pub fn new<B: GraphicsBackend>(backend: &mut B) -> RendererResult<Self> {
        Ok(Self {
            cube: Mesh::upload(backend, "gizmo_cube", &[primitives::cube()])?,
            sphere: Mesh::upload(backend, "gizmo_sphere", &[primitives::sphere()])?,
        })
    }

    /// One unlit draw per light at its position, in its color
    pub fn draw<B: GraphicsBackend>(
        &mut self,
        frame: &mut Frame<'_, B>,
        program: &Program,
        lights: &[Light],
        view_projection: &Mat4,
    ) -> RendererResult<()> {
        frame.backend().use_program(program.handle);
        for light in lights {
            let model = Mat4::from_translation(light.position) * Mat4::from_scale(Vec3::splat(GIZMO_SCALE));
            let block = push_gizmo_locals(
                frame.allocator(),
                &model,
                view_projection,
                light.color.extend(1.0),
                program.block_size(1),
            )?;
            frame.bind_block(1, block);

            let mesh = match light.kind {
                LightKind::Directional => &mut self.cube,
                LightKind::Point => &mut self.sphere,
            };
            draw_mesh(frame, mesh, program)?;
        }
        Ok(())
    }

    pub fn forget_program<B: GraphicsBackend>(&mut self, backend: &mut B, program: ProgramHandle) {
        self.cube.forget_program(backend, program);
        self.sphere.forget_program(backend, program);
    }
}
