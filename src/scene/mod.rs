//! Scene management

mod camera;
mod camera_controller;
mod entity;
mod light;

pub use camera::*;
pub use camera_controller::*;
pub use entity::*;
pub use light::*;

use glam::{Mat4, Vec3};

use crate::resources::ModelId;

/// Camera placement of the demo scene
pub const DEMO_CAMERA_POSITION: Vec3 = Vec3::new(-0.368, 6.492, 8.699);

/// The scene containing all renderable content
#[derive(Debug, Clone)]
pub struct Scene {
    pub camera: Camera,
    pub entities: Vec<Entity>,
    pub lights: Vec<Light>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            camera: Camera::default(),
            entities: Vec::new(),
            lights: Vec::new(),
        }
    }

    /// One decorated entity over `model` lit by the default light rig
    pub fn demo(model: ModelId) -> Self {
        let mut scene = Self {
            camera: Camera::new(DEMO_CAMERA_POSITION),
            entities: Vec::new(),
            lights: default_lights(),
        };
        scene.add_entity(Entity::new(Mat4::IDENTITY, model).with_decoration(ForwardDecoration::DEMO));
        scene
    }

    /// Add an entity to the scene
    pub fn add_entity(&mut self, entity: Entity) -> usize {
        let id = self.entities.len();
        self.entities.push(entity);
        id
    }

    pub fn add_light(&mut self, light: Light) -> usize {
        let id = self.lights.len();
        self.lights.push(light);
        id
    }

    /// Drop the per-frame uniform blocks recorded on the entities
    pub fn clear_frame_state(&mut self) {
        for entity in &mut self.entities {
            entity.local_block = None;
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

/// One directional light and six coloured point lights
pub fn default_lights() -> Vec<Light> {
    vec![
        Light::directional(
            Vec3::new(0.8, 0.8, 0.8),
            Vec3::new(0.0, -1.0, 1.0),
            Vec3::new(4.0, 4.0, 0.0),
            0.1,
        ),
        Light::point(
            Vec3::new(0.0, 0.8, 0.9),
            Vec3::new(0.4, -1.0, 2.0),
            Vec3::new(2.0, 1.6, 2.0),
            0.7,
        ),
        Light::point(
            Vec3::new(1.0, 0.9, 0.1),
            Vec3::new(0.3, -1.0, 1.0),
            Vec3::new(-2.0, 1.0, 2.0),
            0.8,
        ),
        Light::point(
            Vec3::new(1.0, 0.52, -0.15),
            Vec3::new(0.6, -1.0, 1.0),
            Vec3::new(6.4, -0.05, -2.5),
            0.7,
        ),
        Light::point(
            Vec3::new(1.0, 0.04, 1.0),
            Vec3::new(0.2, -1.0, 1.0),
            Vec3::new(-4.9, 0.86, -5.6),
            0.8,
        ),
        Light::point(
            Vec3::new(1.0, -0.5, 0.0),
            Vec3::new(0.0, -1.0, 1.0),
            Vec3::new(4.0, 1.76, -6.53),
            2.0,
        ),
        Light::point(
            Vec3::new(0.2, 0.8, 0.2),
            Vec3::new(0.0, -1.0, 1.0),
            Vec3::new(0.55, 0.01, -3.0),
            0.9,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lights() {
        let lights = default_lights();
        assert_eq!(lights.len(), 7);
        assert_eq!(lights.iter().filter(|l| l.kind == LightKind::Directional).count(), 1);
        assert_eq!(lights.iter().filter(|l| l.kind == LightKind::Point).count(), 6);
    }

    #[test]
    fn test_demo_scene() {
        let scene = Scene::demo(ModelId(3));
        assert_eq!(scene.entities.len(), 1);
        assert_eq!(scene.entities[0].model, ModelId(3));
        assert_eq!(scene.entities[0].decoration, Some(ForwardDecoration::DEMO));
        assert_eq!(scene.camera.position, DEMO_CAMERA_POSITION);
    }
}
