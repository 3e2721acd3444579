//! 物理环境快照
//!
//! 每帧在任何发射器任务开始前刷新一次，之后整帧只读。非均匀区域的力模型被缓存，
//! 物理世界发出区域变化通知时清除“当前”标志，下次刷新时重建。

use super::forces::PhysForces;
use super::world::{AreaForceModel, AreaId, AreaInfo, Falloff, PhysicsWorld};
use crate::effect::EnvFlags;
use crate::math::Aabb;
use glam::Vec3;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

/// 缓存的非均匀区域
#[derive(Debug)]
pub struct PhysArea {
    pub id: AreaId,
    pub flags: EnvFlags,
    pub bounds: Aabb,
    model: AreaForceModel,
    falloff: Falloff,
}

impl PhysArea {
    fn from_info(info: AreaInfo) -> Self {
        Self {
            id: info.id,
            flags: info.flags & EnvFlags::ENV_PHYS_AREA,
            bounds: info.bounds,
            model: info.model,
            falloff: info.falloff,
        }
    }

    /// 是否必须逐点查询物理世界
    pub fn must_query(&self) -> bool {
        matches!(self.model, AreaForceModel::Query)
    }

    /// 区域在包围盒内是否处处相同
    pub fn is_uniform_over(&self, bb: &Aabb) -> bool {
        if !matches!(self.model, AreaForceModel::Linear(_)) || !self.bounds.contains_box(bb) {
            return false;
        }
        match self.falloff {
            Falloff::None => true,
            Falloff::Box { inner } => inner.contains_box(bb),
            Falloff::Sphere { .. } => false,
        }
    }

    /// 在 `pos` 处累加本区域的力
    pub fn add_forces(
        &self,
        forces: &mut PhysForces,
        pos: Vec3,
        flags: EnvFlags,
        world: Option<&dyn PhysicsWorld>,
    ) {
        if !self.flags.intersects(flags) || !self.bounds.contains_point(pos) {
            return;
        }
        let contribution = match self.model {
            AreaForceModel::Linear(f) => {
                let mut out = PhysForces::ZERO;
                out.add(&f, self.falloff.strength(pos, &self.bounds));
                out
            }
            AreaForceModel::Radial { center, accel, wind } => {
                let strength = self.falloff.strength(pos, &self.bounds);
                let dir = (pos - center).normalize_or_zero();
                PhysForces {
                    accel: dir * accel * strength,
                    wind: dir * wind * strength,
                    water: None,
                }
            }
            AreaForceModel::Query => match world.and_then(|w| w.area_forces(self.id, pos)) {
                Some(f) => f,
                None => {
                    // 区域实体已消失：只保留均匀力
                    tracing::trace!(target: "particle_env", area = self.id, "area gone during query");
                    return;
                }
            },
        };
        forces.add(&masked(&contribution, flags), 1.0);
    }
}

fn masked(forces: &PhysForces, flags: EnvFlags) -> PhysForces {
    PhysForces {
        accel: if flags.contains(EnvFlags::ENV_GRAVITY) {
            forces.accel
        } else {
            Vec3::ZERO
        },
        wind: if flags.contains(EnvFlags::ENV_WIND) {
            forces.wind
        } else {
            Vec3::ZERO
        },
        water: if flags.contains(EnvFlags::ENV_WATER) {
            forces.water
        } else {
            None
        },
    }
}

/// 区域锁守卫，析构时释放
#[derive(Debug)]
pub struct AreaLock {
    count: Arc<AtomicI32>,
}

impl Drop for AreaLock {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// 均匀力加非均匀区域列表
#[derive(Debug)]
pub struct PhysicsEnvironment {
    uniform: PhysForces,
    areas: Vec<Arc<PhysArea>>,
    /// 区域并集需要的标志
    area_flags: EnvFlags,
    current: AtomicBool,
    locks: Arc<AtomicI32>,
}

impl Default for PhysicsEnvironment {
    fn default() -> Self {
        Self {
            uniform: PhysForces::ZERO,
            areas: Vec::new(),
            area_flags: EnvFlags::empty(),
            current: AtomicBool::new(false),
            locks: Arc::new(AtomicI32::new(0)),
        }
    }
}

impl Clone for PhysicsEnvironment {
    fn clone(&self) -> Self {
        Self {
            uniform: self.uniform,
            areas: self.areas.clone(),
            area_flags: self.area_flags,
            current: AtomicBool::new(self.is_current()),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl PhysicsEnvironment {
    /// 只有均匀力的环境
    pub fn uniform(forces: PhysForces) -> Self {
        Self {
            uniform: forces,
            current: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn uniform_forces(&self) -> &PhysForces {
        &self.uniform
    }

    pub fn areas(&self) -> &[Arc<PhysArea>] {
        &self.areas
    }

    pub fn area_flags(&self) -> EnvFlags {
        self.area_flags
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire)
    }

    /// 物理世界通知区域变化
    pub fn invalidate(&self) {
        self.current.store(false, Ordering::Release);
    }

    /// 查询期间锁住区域列表
    pub fn lock_areas(&self) -> AreaLock {
        self.locks.fetch_add(1, Ordering::AcqRel);
        AreaLock {
            count: Arc::clone(&self.locks),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locks.load(Ordering::Acquire) > 0
    }

    /// 刷新全局快照；区域被锁住时推迟到下一帧
    pub fn update(&mut self, world: &dyn PhysicsWorld, flags: EnvFlags) -> bool {
        self.uniform = world.uniform_forces();
        if self.is_current() {
            return false;
        }
        if self.is_locked() {
            tracing::debug!(target: "particle_env", "areas locked, environment rebuild deferred");
            return false;
        }

        let infinite = Aabb::new(Vec3::splat(f32::MIN), Vec3::splat(f32::MAX));
        self.rebuild_areas(world, &infinite, flags);
        self.current.store(true, Ordering::Release);
        tracing::debug!(
            target: "particle_env",
            areas = self.areas.len(),
            "physics environment rebuilt"
        );
        true
    }

    fn rebuild_areas(&mut self, world: &dyn PhysicsWorld, bounds: &Aabb, flags: EnvFlags) {
        let mut areas = Vec::new();
        let mut area_flags = EnvFlags::empty();
        world.enumerate_areas(bounds, &mut |info| {
            if info.flags.intersects(flags & EnvFlags::ENV_PHYS_AREA) {
                let area = PhysArea::from_info(info);
                area_flags |= area.flags;
                areas.push(Arc::new(area));
            }
        });
        self.areas = areas;
        self.area_flags = area_flags;
    }

    /// 为发射器截取与其包围盒相交、且标志相关的子集
    ///
    /// 子集与全局快照共享区域锁计数，任务查询期间全局重建会被推迟。
    pub fn subset(&self, bounds: &Aabb, flags: EnvFlags) -> PhysicsEnvironment {
        let areas: Vec<_> = self
            .areas
            .iter()
            .filter(|a| a.flags.intersects(flags) && a.bounds.intersects(bounds))
            .cloned()
            .collect();
        let area_flags = areas.iter().fold(EnvFlags::empty(), |acc, a| acc | a.flags);
        PhysicsEnvironment {
            uniform: masked(&self.uniform, flags),
            areas,
            area_flags,
            current: AtomicBool::new(true),
            locks: Arc::clone(&self.locks),
        }
    }

    /// 某点受到的力
    pub fn get_forces(
        &self,
        pos: Vec3,
        flags: EnvFlags,
        world: Option<&dyn PhysicsWorld>,
    ) -> PhysForces {
        let mut forces = masked(&self.uniform, flags);
        if flags.intersects(self.area_flags) {
            let _lock = self.lock_areas();
            for area in &self.areas {
                area.add_forces(&mut forces, pos, flags, world);
            }
        }
        forces
    }

    /// 包围盒内的代表力，以及该力在盒内是否处处相同
    pub fn get_forces_box(
        &self,
        bb: &Aabb,
        flags: EnvFlags,
        world: Option<&dyn PhysicsWorld>,
    ) -> (PhysForces, bool) {
        let mut uniform = true;
        for area in &self.areas {
            if area.flags.intersects(flags)
                && area.bounds.intersects(bb)
                && !area.is_uniform_over(bb)
            {
                uniform = false;
                break;
            }
        }
        (self.get_forces(bb.center(), flags, world), uniform)
    }

    /// 是否有与盒相交的非均匀区域
    pub fn is_non_uniform(&self, bb: &Aabb, flags: EnvFlags) -> bool {
        self.areas
            .iter()
            .any(|a| a.flags.intersects(flags) && a.bounds.intersects(bb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::world::StaticPhysicsWorld;

    fn gravity_area(bounds: Aabb) -> AreaInfo {
        AreaInfo {
            id: 0,
            flags: EnvFlags::ENV_GRAVITY,
            bounds,
            model: AreaForceModel::Linear(PhysForces {
                accel: Vec3::new(0.0, 0.0, 5.0),
                ..PhysForces::ZERO
            }),
            falloff: Falloff::None,
        }
    }

    #[test]
    fn test_update_and_invalidate() {
        let world = StaticPhysicsWorld::new(PhysForces::earth());
        world.add_area(gravity_area(Aabb::new(Vec3::ZERO, Vec3::splat(10.0))));

        let mut env = PhysicsEnvironment::default();
        assert!(env.update(&world, EnvFlags::ENV_PHYS_AREA));
        assert_eq!(env.areas().len(), 1);
        assert!(!env.update(&world, EnvFlags::ENV_PHYS_AREA));

        let inside = env.get_forces(Vec3::splat(5.0), EnvFlags::ENV_GRAVITY, Some(&world));
        assert!((inside.accel.z - (-9.81 + 5.0)).abs() < 1e-5);

        let outside = env.get_forces(Vec3::splat(-5.0), EnvFlags::ENV_GRAVITY, Some(&world));
        assert!((outside.accel.z + 9.81).abs() < 1e-5);

        let no_gravity = env.get_forces(Vec3::splat(5.0), EnvFlags::ENV_WIND, Some(&world));
        assert_eq!(no_gravity.accel, Vec3::ZERO);

        env.invalidate();
        let lock = env.lock_areas();
        assert!(!env.update(&world, EnvFlags::ENV_PHYS_AREA));
        drop(lock);
        assert!(env.update(&world, EnvFlags::ENV_PHYS_AREA));
    }

    #[test]
    fn test_vanished_query_area_contributes_nothing() {
        let world = StaticPhysicsWorld::new(PhysForces::earth());
        let id = world.add_area(AreaInfo {
            model: AreaForceModel::Query,
            ..gravity_area(Aabb::new(Vec3::ZERO, Vec3::splat(10.0)))
        });

        let mut env = PhysicsEnvironment::default();
        env.update(&world, EnvFlags::ENV_GRAVITY);
        world.remove_area(id);

        let forces = env.get_forces(Vec3::splat(5.0), EnvFlags::ENV_GRAVITY, Some(&world));
        assert!((forces.accel.z + 9.81).abs() < 1e-5);
    }

    #[test]
    fn test_subset_and_box_uniformity() {
        let world = StaticPhysicsWorld::default();
        world.add_area(gravity_area(Aabb::new(Vec3::ZERO, Vec3::splat(10.0))));
        let mut env = PhysicsEnvironment::default();
        env.update(&world, EnvFlags::ENV_GRAVITY);

        let far = Aabb::new(Vec3::splat(100.0), Vec3::splat(101.0));
        assert!(env.subset(&far, EnvFlags::ENV_GRAVITY).areas().is_empty());

        let inner = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));
        let (_, uniform) = env.get_forces_box(&inner, EnvFlags::ENV_GRAVITY, None);
        assert!(uniform);

        let straddling = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let (_, uniform) = env.get_forces_box(&straddling, EnvFlags::ENV_GRAVITY, None);
        assert!(!uniform);
    }
}
