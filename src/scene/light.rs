//! Light types for the scene

use glam::Vec3;

/// Light type, encoded as the `kind` field of the packed light record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LightKind {
    Directional = 0,
    Point = 1,
}

/// A scene light. Directional lights ignore `position` when shading but
/// it still places their gizmo.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub direction: Vec3,
    pub position: Vec3,
    pub intensity: f32,
}

impl Light {
    pub fn new(kind: LightKind, color: Vec3, direction: Vec3, position: Vec3, intensity: f32) -> Self {
        Self {
            kind,
            color,
            direction,
            position,
            intensity,
        }
    }

    pub fn directional(color: Vec3, direction: Vec3, position: Vec3, intensity: f32) -> Self {
        Self::new(LightKind::Directional, color, direction, position, intensity)
    }

    pub fn point(color: Vec3, direction: Vec3, position: Vec3, intensity: f32) -> Self {
        Self::new(LightKind::Point, color, direction, position, intensity)
    }
}
