//! Main engine orchestrator

use std::path::Path;

use crate::backend::{GraphicsBackend, TextureDimension, TextureHandle};
use crate::error::RendererResult;
use crate::pipeline::{RenderMode, RenderSettings, Renderer, SceneTextures};
use crate::resources::{primitives, solid_texture, Assets, Mesh, Model, ModelId, CUBE_FACES};
use crate::scene::{CameraInput, FreeFlyController, Scene};
use crate::RendererConfig;

/// Model drawn by the demo scene, relative to the asset directory
pub const DEMO_MODEL: &str = "Cube/Plane.obj";
/// Diffuse, normal and height maps for relief mapping
pub const RELIEF_TEXTURES: [&str; 3] = [
    "Cube/toy_box_diffuse.png",
    "Cube/toy_box_normal.png",
    "Cube/toy_box_disp.png",
];
pub const QUAD_TEXTURE: &str = "dice.png";
pub const SKYBOX_DIR: &str = "skybox";

/// The main engine: backend, assets, scene and renderer
pub struct Engine<B: GraphicsBackend> {
    backend: B,
    assets: Assets,
    scene: Scene,
    renderer: Renderer,
    controller: FreeFlyController,
    config: RendererConfig,
}

impl<B: GraphicsBackend> Engine<B> {
    /// Load the demo assets and build the demo scene.
    ///
    /// Missing assets are logged and replaced: the model by a procedural
    /// plane, textures by white and the skybox by a gray cube map.
    pub fn new(mut backend: B, config: RendererConfig) -> RendererResult<Self> {
        log::info!("Backend: {}", backend.adapter_info());
        let mut assets = Assets::new(&mut backend)?;
        let asset_dir = config.asset_dir.clone();

        let model = load_model_or_plane(&mut backend, &mut assets, &asset_dir.join(DEMO_MODEL))?;
        let relief = RELIEF_TEXTURES.map(|name| load_texture_or_white(&mut backend, &mut assets, &asset_dir.join(name)));
        let quad = load_texture_or_white(&mut backend, &mut assets, &asset_dir.join(QUAD_TEXTURE));

        let sky_dir = asset_dir.join(SKYBOX_DIR);
        let sky = match assets.textures.load_cube(&mut backend, &sky_dir, &CUBE_FACES) {
            Ok(id) => assets.textures.handle(id),
            Err(e) => {
                log::warn!("Skybox unavailable, using a gray cube map: {}", e);
                solid_texture(&mut backend, "Gray Sky", TextureDimension::Cube, [96, 96, 96, 255])?
            }
        };

        let textures = SceneTextures { relief, quad, sky };
        let renderer = Renderer::new(&mut backend, &mut assets, &config, textures)?;

        let mut scene = Scene::demo(model);
        let (width, height) = backend.surface_size();
        scene.camera.set_aspect(width, height);

        log::info!(
            "Engine ready: {}x{}, mode {}, {} lights",
            width,
            height,
            renderer.mode(),
            scene.lights.len()
        );

        Ok(Self {
            backend,
            assets,
            scene,
            renderer,
            controller: FreeFlyController::new(),
            config,
        })
    }

    /// Move the camera and pick up changed shader files
    pub fn update(&mut self, dt: f32, input: &CameraInput) {
        self.controller.update(&mut self.scene.camera, input, dt);

        for replaced in self.assets.programs.reload_modified(&mut self.backend) {
            self.assets.forget_program(&mut self.backend, replaced);
            self.renderer.forget_program(&mut self.backend, replaced);
        }
    }

    pub fn render(&mut self) -> RendererResult<()> {
        self.renderer
            .render(&mut self.backend, &mut self.scene, &mut self.assets)
    }

    /// Resize the surface, the G-buffer and the camera aspect
    pub fn resize(&mut self, width: u32, height: u32) -> RendererResult<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.backend.resize(width, height);
        let (width, height) = self.backend.surface_size();
        self.renderer.resize(&mut self.backend, width, height)?;
        self.scene.camera.set_aspect(width, height);
        Ok(())
    }

    pub fn set_mode(&mut self, mode: RenderMode) {
        self.renderer.set_mode(mode);
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.renderer.settings
    }

    pub fn settings_mut(&mut self) -> &mut RenderSettings {
        &mut self.renderer.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn assets(&self) -> &Assets {
        &self.assets
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }
}

fn load_model_or_plane<B: GraphicsBackend>(
    backend: &mut B,
    assets: &mut Assets,
    path: &Path,
) -> RendererResult<ModelId> {
    match assets.load_model(backend, path) {
        Ok(id) => Ok(id),
        Err(e) => {
            log::warn!("Using the procedural plane: {}", e);
            let mesh = Mesh::upload(backend, "plane", &[primitives::plane()])?;
            Ok(assets.add_model(Model::from_mesh(mesh)))
        }
    }
}

fn load_texture_or_white<B: GraphicsBackend>(backend: &mut B, assets: &mut Assets, path: &Path) -> TextureHandle {
    match assets.textures.load_2d(backend, path) {
        Ok(id) => assets.textures.handle(id),
        Err(e) => {
            log::warn!("Using white for {}: {}", path.display(), e);
            assets.textures.white()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    fn engine() -> Engine<DummyBackend> {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = RendererConfig {
            asset_dir: "does-not-exist".into(),
            ..Default::default()
        };
        Engine::new(DummyBackend::new(800, 600), config).unwrap()
    }

    #[test]
    fn test_missing_assets_fall_back() {
        let engine = engine();
        assert_eq!(engine.assets().models.len(), 1);
        assert_eq!(engine.assets().models[0].name, "plane");
        assert!(engine.assets().textures.is_empty());
        assert_eq!(engine.scene().entities.len(), 1);
        assert_eq!(engine.scene().lights.len(), 7);
    }

    #[test]
    fn test_resize_updates_gbuffer_and_aspect() {
        let mut engine = engine();
        engine.resize(400, 400).unwrap();
        assert_eq!(engine.renderer().gbuffer().size(), (400, 400));
        assert!((engine.scene().camera.aspect - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_update_moves_camera() {
        let mut engine = engine();
        let before = engine.scene().camera.position;
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };
        engine.update(1.0, &input);
        assert_ne!(engine.scene().camera.position, before);
    }
}
