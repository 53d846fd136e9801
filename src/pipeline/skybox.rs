//! Cube-mapped sky background
//!
//! A reflective cube is drawn first with full depth writes, then a
//! camera-centred cube with the view translation stripped is drawn at the far
//! plane with a less-or-equal test so it only fills pixels no geometry
//! reached.

use glam::{Mat3, Mat4};

use crate::backend::{DepthState, GraphicsBackend, ProgramHandle, TextureHandle};
use crate::error::RendererResult;
use crate::resources::{primitives, Mesh, Program};
use crate::scene::Camera;

use super::uniforms::push_skybox_locals;
use super::{draw_mesh, Frame};

/// Texture unit the cube map is bound to
pub const SKY_TEXTURE_UNIT: u32 = 3;

#[derive(Debug)]
pub struct Skybox {
    cube_map: TextureHandle,
    reflective_cube: Mesh,
    sky: Mesh,
}

impl Skybox {
    pub fn new<B: GraphicsBackend>(backend: &mut B, cube_map: TextureHandle) -> RendererResult<Self> {
        Ok(Self {
            cube_map,
            reflective_cube: Mesh::upload(backend, "reflective_cube", &[primitives::reflective_cube()])?,
            sky: Mesh::upload(backend, "skybox", &[primitives::skybox_cube()])?,
        })
    }

    pub fn cube_map(&self) -> TextureHandle {
        self.cube_map
    }

    /// Draw into whatever target `frame` has bound. Leaves the depth state
    /// at the regular less test.
    pub fn draw<B: GraphicsBackend>(
        &mut self,
        frame: &mut Frame<'_, B>,
        reflective: &Program,
        sky: &Program,
        camera: &Camera,
    ) -> RendererResult<()> {
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        frame.backend().bind_texture(SKY_TEXTURE_UNIT, self.cube_map);

        frame.backend().use_program(reflective.handle);
        frame.backend().set_depth_state(DepthState::LESS);
        let block = push_skybox_locals(
            frame.allocator(),
            &Mat4::IDENTITY,
            &view,
            &projection,
            camera.position,
            reflective.block_size(1),
        )?;
        frame.bind_block(1, block);
        draw_mesh(frame, &mut self.reflective_cube, reflective)?;

        let sky_view = Mat4::from_mat3(Mat3::from_mat4(view));
        frame.backend().use_program(sky.handle);
        frame.backend().set_depth_state(DepthState::LESS_EQUAL_NO_WRITE);
        let block = push_skybox_locals(
            frame.allocator(),
            &Mat4::IDENTITY,
            &sky_view,
            &projection,
            camera.position,
            sky.block_size(1),
        )?;
        frame.bind_block(1, block);
        draw_mesh(frame, &mut self.sky, sky)?;

        frame.backend().set_depth_state(DepthState::LESS);
        Ok(())
    }

    pub fn forget_program<B: GraphicsBackend>(&mut self, backend: &mut B, program: ProgramHandle) {
        self.reflective_cube.forget_program(backend, program);
        self.sky.forget_program(backend, program);
    }
}
