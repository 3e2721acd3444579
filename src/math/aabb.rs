//! 轴对齐包围盒

use super::Location;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// 轴对齐包围盒
///
/// 重置状态用 `min > max` 表示，此时体积为 0，任何 `add_*` 都会把它变成有效盒。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::RESET
    }
}

impl Aabb {
    /// 重置（空）盒
    pub const RESET: Aabb = Aabb {
        min: Vec3::MAX,
        max: Vec3::MIN,
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// 只包含一个点的盒
    pub fn from_point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    /// 中心加半尺寸
    pub fn from_center_half(center: Vec3, half: Vec3) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::RESET;
    }

    pub fn is_reset(&self) -> bool {
        self.min.x > self.max.x
    }

    /// 退化为一个点（或重置）
    pub fn is_empty(&self) -> bool {
        self.is_reset() || self.min == self.max
    }

    pub fn add_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// 合并另一个盒
    pub fn add_box(&mut self, other: &Aabb) {
        if !other.is_reset() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    /// 每个方向扩展 `v`，重置盒保持不变
    pub fn expand(&mut self, v: Vec3) {
        if !self.is_reset() {
            self.min -= v;
            self.max += v;
        }
    }

    /// 与另一个盒的闵可夫斯基和
    pub fn augment(&mut self, other: &Aabb) {
        if !self.is_reset() && !other.is_reset() {
            self.min += other.min;
            self.max += other.max;
        }
    }

    pub fn translate(&mut self, offset: Vec3) {
        if !self.is_reset() {
            self.min += offset;
            self.max += offset;
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        if self.is_reset() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    pub fn radius(&self) -> f32 {
        self.size().length() * 0.5
    }

    pub fn volume(&self) -> f32 {
        let s = self.size();
        s.x * s.y * s.z
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// 是否完整包含另一个盒；重置盒被任何盒包含
    pub fn contains_box(&self, other: &Aabb) -> bool {
        other.is_reset()
            || (!self.is_reset()
                && other.min.cmpge(self.min).all()
                && other.max.cmple(self.max).all())
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        !self.is_reset()
            && !other.is_reset()
            && self.min.cmple(other.max).all()
            && other.min.cmple(self.max).all()
    }

    /// 交集，不相交时为重置盒
    pub fn intersection(&self, other: &Aabb) -> Aabb {
        if !self.intersects(other) {
            return Aabb::RESET;
        }
        Aabb {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    /// `other` 落在本盒之外部分的体积
    pub fn uncontained_volume(&self, other: &Aabb) -> f32 {
        if other.is_reset() {
            return 0.0;
        }
        (other.volume() - self.intersection(other).volume()).max(0.0)
    }

    /// 变换到另一个坐标系后的外接盒
    pub fn transformed(&self, loc: &Location) -> Aabb {
        if self.is_reset() {
            return *self;
        }
        let center = loc.transform_point(self.center());
        let half = (self.max - self.min) * (0.5 * loc.scale.abs());
        let m = glam::Mat3::from_quat(loc.rotation);
        let extent = m.x_axis.abs() * half.x + m.y_axis.abs() * half.y + m.z_axis.abs() * half.z;
        Aabb::from_center_half(center, extent)
    }
}
