//! 数学基础类型
//!
//! 包围盒、带统一缩放的位置变换、平面、视锥体与相机。

pub mod aabb;
pub mod frustum;
pub mod location;

pub use aabb::Aabb;
pub use frustum::{Camera, Frustum, Plane};
pub use location::Location;

/// 平方
#[inline]
pub fn sqr(x: f32) -> f32 {
    x * x
}

/// 安全除法，分母为 0 时返回 `fallback`
#[inline]
pub fn div_or(num: f32, den: f32, fallback: f32) -> f32 {
    if den != 0.0 {
        num / den
    } else {
        fallback
    }
}

/// 向量中绝对值最大的分量
#[inline]
pub fn max_abs_component(v: glam::Vec3) -> f32 {
    v.abs().max_element()
}
