//! Scene entities

use glam::{Mat4, Vec3};

use crate::resources::{ModelId, UniformBlock};

/// Extra model transform applied to an entity only in forward mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForwardDecoration {
    pub scale: f32,
    /// Rotation about +X in degrees, applied after the scale
    pub rotation_x_degrees: f32,
}

impl ForwardDecoration {
    /// Dressing used by the demo plane: doubled and tilted 70 degrees
    pub const DEMO: Self = Self {
        scale: 2.0,
        rotation_x_degrees: 70.0,
    };

    pub fn apply(&self, model: Mat4) -> Mat4 {
        model
            * Mat4::from_scale(Vec3::splat(self.scale))
            * Mat4::from_rotation_x(self.rotation_x_degrees.to_radians())
    }
}

/// A placed model
#[derive(Debug, Clone)]
pub struct Entity {
    pub transform: Mat4,
    pub model: ModelId,
    pub decoration: Option<ForwardDecoration>,
    /// Local uniform block written for this entity in the current frame
    pub local_block: Option<UniformBlock>,
}

impl Entity {
    pub fn new(transform: Mat4, model: ModelId) -> Self {
        Self {
            transform,
            model,
            decoration: None,
            local_block: None,
        }
    }

    pub fn with_decoration(mut self, decoration: ForwardDecoration) -> Self {
        self.decoration = Some(decoration);
        self
    }

    /// Model matrix used by the forward pass
    pub fn forward_transform(&self) -> Mat4 {
        match self.decoration {
            Some(decoration) => decoration.apply(self.transform),
            None => self.transform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoration_scales_then_rotates() {
        let entity = Entity::new(Mat4::IDENTITY, ModelId(0)).with_decoration(ForwardDecoration::DEMO);
        let point = entity.forward_transform().transform_point3(Vec3::Y);

        // (0,1,0) rotated 70 degrees about X, then doubled
        let angle = 70f32.to_radians();
        let expected = Vec3::new(0.0, angle.cos(), angle.sin()) * 2.0;
        assert!((point - expected).length() < 1e-5);
    }

    #[test]
    fn test_undecorated_entity_keeps_transform() {
        let transform = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let entity = Entity::new(transform, ModelId(0));
        assert_eq!(entity.forward_transform(), transform);
    }
}
