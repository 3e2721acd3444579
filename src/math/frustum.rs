//! 视锥体剔除
//!
//! 发射器和容器按世界包围盒做可见性判断；水面也用同一个平面类型表示。

use super::Aabb;
use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// 平面表示（法向量和距离），正面为 `normal·p >= distance`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// 法向量
    pub normal: Vec3,
    /// 沿法向量到原点的距离
    pub distance: f32,
}

impl Plane {
    /// 创建平面
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self {
            normal: normal.normalize_or_zero(),
            distance,
        }
    }

    /// 过某点的平面
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            distance: normal.dot(point),
        }
    }

    /// 高度为 `height` 的水平面（Z 轴向上）
    pub fn horizontal(height: f32) -> Self {
        Self {
            normal: Vec3::Z,
            distance: height,
        }
    }

    /// 计算点到平面的有符号距离
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }

    /// 检查点是否在平面的正面
    pub fn point_in_front(&self, point: Vec3) -> bool {
        self.distance_to_point(point) >= 0.0
    }

    /// 包围盒到平面的有符号距离范围 (最小, 最大)
    pub fn box_distance_range(&self, bb: &Aabb) -> (f32, f32) {
        let center = self.distance_to_point(bb.center());
        let half = (bb.max - bb.min) * 0.5;
        let radius = half.dot(self.normal.abs());
        (center - radius, center + radius)
    }
}

/// 视锥体的6个平面
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// 从视图投影矩阵创建视锥体
    ///
    /// Gribb & Hartmann 平面提取，深度范围 [0, 1]。
    pub fn from_view_projection(view_proj: Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        Self {
            planes: [
                Self::extract_plane(r3 + r0),
                Self::extract_plane(r3 - r0),
                Self::extract_plane(r3 + r1),
                Self::extract_plane(r3 - r1),
                Self::extract_plane(r2),
                Self::extract_plane(r3 - r2),
            ],
        }
    }

    /// 从 `ax + by + cz + w >= 0` 形式的4分量向量提取平面
    fn extract_plane(v: Vec4) -> Plane {
        let normal = v.truncate();
        let len = normal.length();
        if len <= f32::EPSILON {
            return Plane {
                normal: Vec3::ZERO,
                distance: 0.0,
            };
        }
        Plane {
            normal: normal / len,
            distance: -v.w / len,
        }
    }

    /// 检查点是否在视锥体内
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.point_in_front(point))
    }

    /// 检查球体是否与视锥体相交
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|p| p.distance_to_point(center) >= -radius)
    }

    /// 检查包围盒是否与视锥体相交；重置盒不可见
    pub fn intersects_aabb(&self, bb: &Aabb) -> bool {
        if bb.is_reset() {
            return false;
        }
        self.planes.iter().all(|plane| {
            // 包围盒中沿法向量最远的顶点
            let farthest = Vec3::new(
                if plane.normal.x > 0.0 { bb.max.x } else { bb.min.x },
                if plane.normal.y > 0.0 { bb.max.y } else { bb.min.y },
                if plane.normal.z > 0.0 { bb.max.z } else { bb.min.z },
            );
            plane.distance_to_point(farthest) >= 0.0
        })
    }
}

/// 渲染相机
///
/// 排序插入用位置和朝向计算粒子到相机的距离，剔除用视锥体。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub frustum: Frustum,
}

impl Camera {
    /// 右手坐标系、Z 轴向上的透视相机
    pub fn look_at(position: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let view = Mat4::look_at_rh(position, target, Vec3::Z);
        let proj = Mat4::perspective_rh(fov_y, aspect, near, far);
        Self {
            position,
            forward: (target - position).normalize_or_zero(),
            frustum: Frustum::from_view_projection(proj * view),
        }
    }

    /// 沿视线方向的深度
    pub fn depth(&self, point: Vec3) -> f32 {
        (point - self.position).dot(self.forward)
    }

    pub fn is_visible(&self, bb: &Aabb) -> bool {
        self.frustum.intersects_aabb(bb)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::look_at(
            Vec3::new(0.0, -20.0, 2.0),
            Vec3::new(0.0, 0.0, 2.0),
            std::f32::consts::FRAC_PI_3,
            16.0 / 9.0,
            0.1,
            1000.0,
        )
    }
}
