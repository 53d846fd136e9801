//! Render pipeline
//!
//! The active [`RenderMode`] is read once per frame and drives the whole
//! frame's draw sequence:
//! - `TexturedQuad`: a single textured fullscreen quad
//! - `Deferred`: geometry into the G-buffer, fullscreen lighting, depth blit
//!   and light gizmos
//! - `Forward`: one lit pass into the G-buffer color slot, then a color blit
//!
//! Every frame runs inside a [`Frame`], which owns the backend, the uniform
//! allocator and the explicitly tracked current render target.

pub mod deferred;
pub mod forward;
pub mod gbuffer;
pub mod gizmos;
pub mod shaders;
pub mod skybox;
pub mod textured_quad;
pub mod uniforms;

pub use gbuffer::{Attachment, AttachmentSet};
pub use gizmos::LightGizmos;
pub use shaders::BuiltinPrograms;
pub use skybox::Skybox;

use std::fmt;

use crate::backend::{GraphicsBackend, ProgramHandle, RenderTarget, TextureHandle};
use crate::error::RendererResult;
use crate::resources::{primitives, Assets, Mesh, Model, Program, TextureRegistry, UniformAllocator, UniformBlock};
use crate::scene::{Light, Scene};
use crate::RendererConfig;

/// Which draw sequence a frame runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderMode {
    TexturedQuad,
    #[default]
    Deferred,
    Forward,
}

impl RenderMode {
    pub const ALL: [RenderMode; 3] = [
        RenderMode::TexturedQuad,
        RenderMode::Deferred,
        RenderMode::Forward,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RenderMode::TexturedQuad => "Textured Quad",
            RenderMode::Deferred => "Deferred",
            RenderMode::Forward => "Forward",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State a debug UI or key bindings may change between frames
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub mode: RenderMode,
    pub show_relief: bool,
    pub show_skybox: bool,
    pub show_gizmos: bool,
    pub clear_color: [f32; 4],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            mode: RenderMode::Deferred,
            show_relief: true,
            show_skybox: true,
            show_gizmos: true,
            clear_color: [0.2, 0.2, 0.2, 1.0],
        }
    }
}

/// Textures the pipeline binds regardless of the scene's materials
#[derive(Debug, Clone, Copy)]
pub struct SceneTextures {
    /// Diffuse, normal and height maps for relief mapping, units 0 to 2
    pub relief: [TextureHandle; 3],
    /// Texture shown by the textured quad mode
    pub quad: TextureHandle,
    /// Six-layer cube map for the skybox
    pub sky: TextureHandle,
}

/// One frame's command context
pub struct Frame<'a, B: GraphicsBackend> {
    backend: &'a mut B,
    allocator: &'a mut UniformAllocator,
    target: RenderTarget,
}

impl<'a, B: GraphicsBackend> Frame<'a, B> {
    /// Begin the backend frame and open the allocator's write session
    pub fn begin(backend: &'a mut B, allocator: &'a mut UniformAllocator) -> RendererResult<Self> {
        backend.begin_frame()?;
        allocator.begin_frame();
        Ok(Self {
            backend,
            allocator,
            target: RenderTarget::Default,
        })
    }

    pub fn backend(&mut self) -> &mut B {
        self.backend
    }

    pub fn allocator(&mut self) -> &mut UniformAllocator {
        self.allocator
    }

    /// The target draws currently go to
    pub fn target(&self) -> RenderTarget {
        self.target
    }

    /// Bind `target` unless it is already current
    pub fn set_target(&mut self, target: RenderTarget) {
        if self.target != target {
            self.backend.bind_render_target(target);
            self.target = target;
        }
    }

    /// Bind a block written this frame at a uniform binding point
    pub fn bind_block(&mut self, binding: u32, block: UniformBlock) {
        self.backend
            .bind_uniform_range(binding, self.allocator.buffer(), block.offset, block.size);
    }

    /// Upload the frame's uniforms and submit
    pub fn finish(self) -> RendererResult<()> {
        self.allocator.end_frame(&mut *self.backend);
        self.backend.end_frame()?;
        Ok(())
    }
}

/// Draw every submesh of `mesh` with `program`
pub fn draw_mesh<B: GraphicsBackend>(
    frame: &mut Frame<'_, B>,
    mesh: &mut Mesh,
    program: &Program,
) -> RendererResult<()> {
    for index in 0..mesh.submeshes.len() {
        let binding = mesh.get_or_build_binding(frame.backend(), index, program)?;
        mesh.submeshes[index].draw(frame.backend(), binding);
    }
    Ok(())
}

/// Draw every submesh of `model`, binding each submesh's albedo at unit 0.
/// Submeshes without an albedo texture use `fallback_albedo`.
pub fn draw_model<B: GraphicsBackend>(
    frame: &mut Frame<'_, B>,
    model: &mut Model,
    program: &Program,
    textures: &TextureRegistry,
    fallback_albedo: TextureHandle,
) -> RendererResult<()> {
    for index in 0..model.mesh.submeshes.len() {
        let binding = model.mesh.get_or_build_binding(frame.backend(), index, program)?;
        let albedo = model
            .material_for(index)
            .and_then(|m| m.albedo_texture)
            .map(|id| textures.handle(id))
            .unwrap_or(fallback_albedo);
        frame.backend().bind_texture(0, albedo);
        model.mesh.submeshes[index].draw(frame.backend(), binding);
    }
    Ok(())
}

/// Everything the mode drivers draw with besides the scene and assets
#[derive(Debug)]
pub struct PipelineResources {
    pub builtins: BuiltinPrograms,
    pub gbuffer: AttachmentSet,
    pub textures: SceneTextures,
    quad: Mesh,
    skybox: Skybox,
    gizmos: LightGizmos,
    max_lights: usize,
}

impl PipelineResources {
    /// The leading lights that fit the shaders' light arrays
    pub fn packed_lights<'l>(&self, lights: &'l [Light]) -> &'l [Light] {
        &lights[..lights.len().min(self.max_lights)]
    }
}

/// Owns the G-buffer, the uniform allocator and the per-mode resources
#[derive(Debug)]
pub struct Renderer {
    pub settings: RenderSettings,
    allocator: UniformAllocator,
    resources: PipelineResources,
    light_limit_warned: bool,
}

impl Renderer {
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        assets: &mut Assets,
        config: &RendererConfig,
        textures: SceneTextures,
    ) -> RendererResult<Self> {
        let builtins = BuiltinPrograms::load(backend, &mut assets.programs, config.shader_dir.as_deref())?;
        let (width, height) = backend.surface_size();
        let gbuffer = AttachmentSet::build(backend, width, height)?;
        let allocator = UniformAllocator::new(backend, config.uniform_capacity)?;

        let max_lights = config.max_lights.min(uniforms::MAX_LIGHTS);
        if max_lights < config.max_lights {
            log::warn!(
                "max_lights {} exceeds the shader limit, using {}",
                config.max_lights,
                max_lights
            );
        }

        let resources = PipelineResources {
            builtins,
            gbuffer,
            textures,
            quad: Mesh::upload(backend, "quad", &[primitives::quad()])?,
            skybox: Skybox::new(backend, textures.sky)?,
            gizmos: LightGizmos::new(backend)?,
            max_lights,
        };

        Ok(Self {
            settings: RenderSettings {
                mode: config.mode,
                show_relief: config.show_relief,
                show_skybox: config.show_skybox,
                show_gizmos: config.show_gizmos,
                clear_color: config.clear_color,
            },
            allocator,
            resources,
            light_limit_warned: false,
        })
    }

    /// The G-buffer attachments, for inspection or visualization
    pub fn gbuffer(&self) -> &AttachmentSet {
        &self.resources.gbuffer
    }

    pub fn allocator(&self) -> &UniformAllocator {
        &self.allocator
    }

    pub fn builtins(&self) -> &BuiltinPrograms {
        &self.resources.builtins
    }

    pub fn mode(&self) -> RenderMode {
        self.settings.mode
    }

    pub fn set_mode(&mut self, mode: RenderMode) {
        if self.settings.mode != mode {
            log::info!("Render mode: {}", mode);
            self.settings.mode = mode;
        }
    }

    /// Render one frame of `scene` in the current mode
    pub fn render<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        scene: &mut Scene,
        assets: &mut Assets,
    ) -> RendererResult<()> {
        scene.clear_frame_state();
        if scene.lights.len() > self.resources.max_lights && !self.light_limit_warned {
            log::warn!(
                "Scene has {} lights, only the first {} are shaded",
                scene.lights.len(),
                self.resources.max_lights
            );
            self.light_limit_warned = true;
        }

        let settings = &self.settings;
        let resources = &mut self.resources;
        let mut frame = Frame::begin(backend, &mut self.allocator)?;
        let result = match settings.mode {
            RenderMode::TexturedQuad => textured_quad::render(&mut frame, resources, settings, assets),
            RenderMode::Deferred => deferred::render(&mut frame, resources, settings, scene, assets),
            RenderMode::Forward => forward::render(&mut frame, resources, settings, scene, assets),
        };
        let finished = frame.finish();
        result.and(finished)
    }

    /// Rebuild the G-buffer at a new resolution
    pub fn resize<B: GraphicsBackend>(&mut self, backend: &mut B, width: u32, height: u32) -> RendererResult<()> {
        if width == 0 || height == 0 || self.resources.gbuffer.size() == (width, height) {
            return Ok(());
        }
        let gbuffer = AttachmentSet::build(backend, width, height)?;
        let old = std::mem::replace(&mut self.resources.gbuffer, gbuffer);
        old.destroy(backend);
        Ok(())
    }

    /// Destroy vertex bindings built for a program that was replaced
    pub fn forget_program<B: GraphicsBackend>(&mut self, backend: &mut B, program: ProgramHandle) {
        self.resources.quad.forget_program(backend, program);
        self.resources.skybox.forget_program(backend, program);
        self.resources.gizmos.forget_program(backend, program);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{Command, DummyBackend};
    use crate::resources::solid_texture;
    use crate::backend::TextureDimension;

    fn renderer(backend: &mut DummyBackend, assets: &mut Assets) -> Renderer {
        let white = assets.textures.white();
        let sky = solid_texture(backend, "sky", TextureDimension::Cube, [128; 4]).unwrap();
        let textures = SceneTextures {
            relief: [white; 3],
            quad: white,
            sky,
        };
        Renderer::new(backend, assets, &RendererConfig::default(), textures).unwrap()
    }

    #[test]
    fn test_set_target_binds_only_on_change() {
        let mut backend = DummyBackend::new(64, 64);
        let mut allocator = UniformAllocator::new(&mut backend, Some(1024)).unwrap();
        let mut frame = Frame::begin(&mut backend, &mut allocator).unwrap();
        frame.set_target(RenderTarget::Default);
        frame.set_target(RenderTarget::Default);
        frame.finish().unwrap();

        let binds = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BindRenderTarget(_)))
            .count();
        assert_eq!(binds, 0);
    }

    #[test]
    fn test_resize_rebuilds_gbuffer() {
        let mut backend = DummyBackend::new(320, 240);
        let mut assets = Assets::new(&mut backend).unwrap();
        let mut renderer = renderer(&mut backend, &mut assets);
        let before = renderer.gbuffer().handle();
        assert_eq!(renderer.gbuffer().size(), (320, 240));

        renderer.resize(&mut backend, 640, 480).unwrap();
        assert_eq!(renderer.gbuffer().size(), (640, 480));
        assert_ne!(renderer.gbuffer().handle(), before);
        assert!(backend.render_target_descriptor(before).is_none());

        // Zero sizes (minimized windows) are ignored
        renderer.resize(&mut backend, 0, 480).unwrap();
        assert_eq!(renderer.gbuffer().size(), (640, 480));
    }

    #[test]
    fn test_forget_program_destroys_gizmo_bindings() {
        let mut backend = DummyBackend::new(320, 240);
        let mut assets = Assets::new(&mut backend).unwrap();
        let mut renderer = renderer(&mut backend, &mut assets);
        let mut scene = Scene::new();
        scene.lights = crate::scene::default_lights();
        renderer.render(&mut backend, &mut scene, &mut assets).unwrap();

        let gizmo = assets.programs.get(renderer.builtins().gizmo).handle;
        let mut stale = Vec::new();
        for draw in backend.last_frame_draws() {
            if draw.program == Some(gizmo) && !stale.contains(&draw.binding) {
                stale.push(draw.binding);
            }
        }
        // Cube for the directional light, sphere for point lights
        assert_eq!(stale.len(), 2);

        let before = backend.binding_count();
        renderer.forget_program(&mut backend, gizmo);
        assert_eq!(backend.binding_count(), before - 2);
        for binding in stale {
            assert!(backend.binding_descriptor(binding).is_none());
        }
    }

    #[test]
    fn test_light_limit_is_clamped_to_shader_arrays() {
        let mut backend = DummyBackend::new(64, 64);
        let mut assets = Assets::new(&mut backend).unwrap();
        let renderer = renderer(&mut backend, &mut assets);
        let lights = vec![crate::scene::default_lights()[0].clone(); 20];
        assert_eq!(renderer.resources.packed_lights(&lights).len(), uniforms::MAX_LIGHTS);
    }
}
