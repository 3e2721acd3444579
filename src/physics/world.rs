//! 物理世界协作方
//!
//! 粒子系统只把物理世界当作不透明服务：力场查询、射线求交、地形高度，
//! 以及粒子群回馈给世界的力场代理。

use super::forces::PhysForces;
use crate::core::error::PhysicsQueryError;
use crate::core::utils::lock_recover;
use crate::effect::EnvFlags;
use crate::math::{Aabb, Plane};
use glam::Vec3;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

/// 物理区域 ID
pub type AreaId = u64;

/// 力场代理 ID
pub type ProxyId = u64;

/// 区域内力的分布
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AreaForceModel {
    /// 区域内各处相同
    Linear(PhysForces),
    /// 沿半径方向，正值向外
    Radial {
        center: Vec3,
        accel: f32,
        wind: f32,
    },
    /// 每次都要向物理世界查询
    Query,
}

/// 区域边缘的衰减
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Falloff {
    None,
    /// 内盒中为满强度，向外盒边缘线性衰减到 0
    Box { inner: Aabb },
    /// 内半径中为满强度，到外半径衰减到 0
    Sphere {
        center: Vec3,
        inner: f32,
        outer: f32,
    },
}

impl Falloff {
    /// `pos` 处的强度（0..=1），`outer` 为区域外包围盒
    pub fn strength(&self, pos: Vec3, outer: &Aabb) -> f32 {
        match *self {
            Falloff::None => 1.0,
            Falloff::Box { inner } => {
                let mut strength: f32 = 1.0;
                for i in 0..3 {
                    let p = pos[i];
                    let s = if p < inner.min[i] {
                        ramp(p, outer.min[i], inner.min[i])
                    } else if p > inner.max[i] {
                        ramp(p, outer.max[i], inner.max[i])
                    } else {
                        1.0
                    };
                    strength = strength.min(s);
                }
                strength
            }
            Falloff::Sphere {
                center,
                inner,
                outer,
            } => {
                let dist = pos.distance(center);
                if dist <= inner {
                    1.0
                } else if dist >= outer {
                    0.0
                } else {
                    1.0 - (dist - inner) / (outer - inner)
                }
            }
        }
    }
}

fn ramp(p: f32, edge: f32, full: f32) -> f32 {
    let span = full - edge;
    if span == 0.0 {
        1.0
    } else {
        ((p - edge) / span).clamp(0.0, 1.0)
    }
}

/// 物理世界报告的非均匀区域
#[derive(Debug, Clone, PartialEq)]
pub struct AreaInfo {
    pub id: AreaId,
    /// ENV_GRAVITY / ENV_WIND / ENV_WATER 的组合
    pub flags: EnvFlags,
    pub bounds: Aabb,
    pub model: AreaForceModel,
    pub falloff: Falloff,
}

/// 射线命中的物体类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Terrain,
    StaticEntity,
    DynamicEntity,
}

impl HitKind {
    pub fn env_flag(self) -> EnvFlags {
        match self {
            HitKind::Terrain => EnvFlags::ENV_TERRAIN,
            HitKind::StaticEntity => EnvFlags::ENV_STATIC_ENT,
            HitKind::DynamicEntity => EnvFlags::ENV_DYNAMIC_ENT,
        }
    }
}

/// 射线命中
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub normal: Vec3,
    /// 沿射线方向的参数（射线方向未归一化时以方向长度为单位）
    pub fraction: f32,
    pub kind: HitKind,
}

/// 力场代理形状
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProxyShape {
    Box(Aabb),
    Sphere { center: Vec3, radius: f32 },
}

/// 粒子群回馈给世界的力场
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceProxyDesc {
    pub shape: ProxyShape,
    pub forces: PhysForces,
}

/// 物理世界服务
///
/// 实现必须可在后台更新任务中并发调用。
pub trait PhysicsWorld: Send + Sync {
    /// 全局均匀力
    fn uniform_forces(&self) -> PhysForces;

    /// 枚举与 `bounds` 相交的非均匀区域
    fn enumerate_areas(&self, bounds: &Aabb, visit: &mut dyn FnMut(AreaInfo));

    /// 查询区域在某点的力；区域已不存在时返回 `None`
    fn area_forces(&self, id: AreaId, pos: Vec3) -> Option<PhysForces>;

    /// 射线求交，`flags` 中的碰撞位决定参与求交的物体类别
    fn ray_intersect(&self, origin: Vec3, dir: Vec3, flags: EnvFlags) -> Option<RayHit>;

    /// 地形高度
    fn terrain_height(&self, x: f32, y: f32) -> Option<f32>;

    fn create_force_proxy(&self, desc: ForceProxyDesc) -> ProxyId;

    fn update_force_proxy(&self, id: ProxyId, desc: ForceProxyDesc)
        -> Result<(), PhysicsQueryError>;

    fn remove_force_proxy(&self, id: ProxyId);
}

/// 内存中的物理世界
///
/// 平坦地形、若干静态/动态盒体和可增删的力场区域，用于测试和无物理引擎的宿主。
#[derive(Debug)]
pub struct StaticPhysicsWorld {
    uniform: RwLock<PhysForces>,
    terrain_height: Option<f32>,
    areas: RwLock<Vec<AreaInfo>>,
    obstacles: RwLock<Vec<(Aabb, HitKind)>>,
    proxies: Mutex<HashMap<ProxyId, ForceProxyDesc>>,
    next_id: AtomicU64,
}

impl Default for StaticPhysicsWorld {
    fn default() -> Self {
        Self::new(PhysForces::ZERO)
    }
}

impl StaticPhysicsWorld {
    pub fn new(uniform: PhysForces) -> Self {
        Self {
            uniform: RwLock::new(uniform),
            terrain_height: None,
            areas: RwLock::new(Vec::new()),
            obstacles: RwLock::new(Vec::new()),
            proxies: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 在高度 `height` 处加一个无限大平坦地形
    pub fn with_terrain(mut self, height: f32) -> Self {
        self.terrain_height = Some(height);
        self
    }

    pub fn with_water(self, height: f32) -> Self {
        self.write_uniform(|u| u.water = Some(Plane::horizontal(height)));
        self
    }

    pub fn set_uniform(&self, forces: PhysForces) {
        self.write_uniform(|u| *u = forces);
    }

    fn write_uniform(&self, f: impl FnOnce(&mut PhysForces)) {
        let mut guard = self.uniform.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }

    /// 添加区域；调用方负责随后通知粒子管理器区域变化
    pub fn add_area(&self, mut area: AreaInfo) -> AreaId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        area.id = id;
        self.areas
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(area);
        id
    }

    pub fn remove_area(&self, id: AreaId) -> bool {
        let mut areas = self.areas.write().unwrap_or_else(|e| e.into_inner());
        let before = areas.len();
        areas.retain(|a| a.id != id);
        areas.len() != before
    }

    pub fn add_obstacle(&self, bounds: Aabb, kind: HitKind) {
        self.obstacles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((bounds, kind));
    }

    pub fn proxy(&self, id: ProxyId) -> Option<ForceProxyDesc> {
        lock_recover(&self.proxies).get(&id).copied()
    }

    pub fn proxy_count(&self) -> usize {
        lock_recover(&self.proxies).len()
    }
}

/// 射线与盒体求交（slab 法），返回参数和法向量
fn ray_box(origin: Vec3, dir: Vec3, bb: &Aabb) -> Option<(f32, Vec3)> {
    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;
    let mut normal = Vec3::ZERO;
    for i in 0..3 {
        if dir[i].abs() < f32::EPSILON {
            if origin[i] < bb.min[i] || origin[i] > bb.max[i] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / dir[i];
        let (mut t0, mut t1) = ((bb.min[i] - origin[i]) * inv, (bb.max[i] - origin[i]) * inv);
        let mut n = Vec3::ZERO;
        n[i] = -dir[i].signum();
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        if t0 > t_near {
            t_near = t0;
            normal = n;
        }
        t_far = t_far.min(t1);
        if t_near > t_far {
            return None;
        }
    }
    (t_near >= 0.0).then_some((t_near, normal))
}

impl PhysicsWorld for StaticPhysicsWorld {
    fn uniform_forces(&self) -> PhysForces {
        *self.uniform.read().unwrap_or_else(|e| e.into_inner())
    }

    fn enumerate_areas(&self, bounds: &Aabb, visit: &mut dyn FnMut(AreaInfo)) {
        let areas = self.areas.read().unwrap_or_else(|e| e.into_inner());
        for area in areas.iter().filter(|a| a.bounds.intersects(bounds)) {
            visit(area.clone());
        }
    }

    fn area_forces(&self, id: AreaId, pos: Vec3) -> Option<PhysForces> {
        let areas = self.areas.read().unwrap_or_else(|e| e.into_inner());
        let area = areas.iter().find(|a| a.id == id)?;
        if !area.bounds.contains_point(pos) {
            return Some(PhysForces::ZERO);
        }
        let strength = area.falloff.strength(pos, &area.bounds);
        let mut forces = PhysForces::ZERO;
        match area.model {
            AreaForceModel::Linear(f) => forces.add(&f, strength),
            AreaForceModel::Radial { center, accel, wind } => {
                let dir = (pos - center).normalize_or_zero();
                forces.accel = dir * accel * strength;
                forces.wind = dir * wind * strength;
            }
            AreaForceModel::Query => {}
        }
        Some(forces)
    }

    fn ray_intersect(&self, origin: Vec3, dir: Vec3, flags: EnvFlags) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        let mut consider = |hit: RayHit| {
            if hit.fraction <= 1.0 && best.map_or(true, |b| hit.fraction < b.fraction) {
                best = Some(hit);
            }
        };

        if flags.contains(EnvFlags::ENV_TERRAIN) {
            if let Some(h) = self.terrain_height {
                if dir.z < 0.0 && origin.z >= h {
                    let t = (h - origin.z) / dir.z;
                    consider(RayHit {
                        point: origin + dir * t,
                        normal: Vec3::Z,
                        fraction: t,
                        kind: HitKind::Terrain,
                    });
                }
            }
        }

        let obstacles = self.obstacles.read().unwrap_or_else(|e| e.into_inner());
        for (bb, kind) in obstacles.iter() {
            if !flags.contains(kind.env_flag()) {
                continue;
            }
            if let Some((t, normal)) = ray_box(origin, dir, bb) {
                consider(RayHit {
                    point: origin + dir * t,
                    normal,
                    fraction: t,
                    kind: *kind,
                });
            }
        }
        best
    }

    fn terrain_height(&self, _x: f32, _y: f32) -> Option<f32> {
        self.terrain_height
    }

    fn create_force_proxy(&self, desc: ForceProxyDesc) -> ProxyId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock_recover(&self.proxies).insert(id, desc);
        id
    }

    fn update_force_proxy(
        &self,
        id: ProxyId,
        desc: ForceProxyDesc,
    ) -> Result<(), PhysicsQueryError> {
        match lock_recover(&self.proxies).get_mut(&id) {
            Some(slot) => {
                *slot = desc;
                Ok(())
            }
            None => Err(PhysicsQueryError::ProxyGone(id)),
        }
    }

    fn remove_force_proxy(&self, id: ProxyId) {
        lock_recover(&self.proxies).remove(&id);
    }
}
