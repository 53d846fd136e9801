//! Surface materials imported alongside models

use glam::Vec3;

use super::texture::TextureId;

/// Material properties and the textures that override them
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub albedo: Vec3,
    pub emissive: Vec3,
    pub smoothness: f32,

    /// Texture IDs (None means use default)
    pub albedo_texture: Option<TextureId>,
    pub emissive_texture: Option<TextureId>,
    pub specular_texture: Option<TextureId>,
    pub normals_texture: Option<TextureId>,
    pub bump_texture: Option<TextureId>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            albedo: Vec3::ONE,
            emissive: Vec3::ZERO,
            smoothness: 0.0,
            albedo_texture: None,
            emissive_texture: None,
            specular_texture: None,
            normals_texture: None,
            bump_texture: None,
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_albedo(mut self, albedo: Vec3) -> Self {
        self.albedo = albedo;
        self
    }

    pub fn with_albedo_texture(mut self, texture: TextureId) -> Self {
        self.albedo_texture = Some(texture);
        self
    }

    /// Map an MTL specular exponent (0..=1000) to 0..=1
    pub fn smoothness_from_shininess(shininess: f32) -> f32 {
        (shininess / 1000.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_untextured_white() {
        let material = Material::new("plain");
        assert_eq!(material.name, "plain");
        assert_eq!(material.albedo, Vec3::ONE);
        assert!(material.albedo_texture.is_none());
    }

    #[test]
    fn test_shininess_is_clamped() {
        assert_eq!(Material::smoothness_from_shininess(500.0), 0.5);
        assert_eq!(Material::smoothness_from_shininess(4000.0), 1.0);
        assert_eq!(Material::smoothness_from_shininess(-1.0), 0.0);
    }
}
