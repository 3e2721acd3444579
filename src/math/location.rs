//! 位置：旋转、平移和统一缩放

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// 发射器和子发射器的世界变换
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub rotation: Quat,
    pub translation: Vec3,
    pub scale: f32,
}

impl Default for Location {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Location {
    pub const IDENTITY: Location = Location {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
        scale: 1.0,
    };

    pub fn new(rotation: Quat, translation: Vec3, scale: f32) -> Self {
        Self {
            rotation,
            translation,
            scale,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation * (p * self.scale) + self.translation
    }

    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.rotation * (v * self.scale)
    }

    pub fn inverse(&self) -> Location {
        let inv_rot = self.rotation.inverse();
        let inv_scale = if self.scale != 0.0 { 1.0 / self.scale } else { 0.0 };
        Location {
            rotation: inv_rot,
            translation: inv_rot * (-self.translation) * inv_scale,
            scale: inv_scale,
        }
    }

    /// 两个位置之间插值；旋转走球面弧线，避免快速转动的父对象把粒子挤成团
    pub fn interpolate(&self, to: &Location, t: f32) -> Location {
        Location {
            rotation: self.rotation.slerp(to.rotation, t),
            translation: self.translation.lerp(to.translation, t),
            scale: self.scale + (to.scale - self.scale) * t,
        }
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), self.rotation, self.translation)
    }

    pub fn is_equivalent(&self, other: &Location, epsilon: f32) -> bool {
        self.translation.abs_diff_eq(other.translation, epsilon)
            && self.rotation.abs_diff_eq(other.rotation, epsilon)
            && (self.scale - other.scale).abs() <= epsilon
    }
}
