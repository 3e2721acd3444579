//! 单个粒子
//!
//! 粒子由三块状态组合而成：时间 [`TimeState`]、运动 [`MoveState`] 和形状标签
//! [`ShapeTag`]。生成它的子发射器只以句柄弱引用；子效果读取粒子位置期间通过
//! 引用计数阻止其被删除。

use super::arena::SlotHandle;
use crate::effect::{EffectParams, EnvFlags, Facing};
use crate::math::{Aabb, Location, Plane};
use crate::physics::{travel, ForceParams, PhysForces, PhysicsEnvironment, PhysicsWorld, RayHit};
use glam::Vec3;
use rand::Rng;
use std::collections::VecDeque;

/// 法向速度低于此值时粒子停靠在碰撞面上
pub const REST_SPEED: f32 = 0.1;

/// 碰撞后沿法线抬起的距离，避免下一帧立刻再次命中
const SURFACE_OFFSET: f32 = 0.001;

/// 粒子时间状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeState {
    pub age: f32,
    /// 无限寿命为 `f32::INFINITY`
    pub stop_age: f32,
    /// 最近一次碰撞时的年龄，未碰撞为负
    pub collide_age: f32,
}

impl TimeState {
    pub fn new(stop_age: f32) -> Self {
        Self {
            age: 0.0,
            stop_age,
            collide_age: -1.0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.age < self.stop_age
    }

    /// 0..=1 的相对年龄，无限寿命始终为 0
    pub fn relative_age(&self) -> f32 {
        if self.stop_age.is_finite() && self.stop_age > 0.0 {
            (self.age / self.stop_age).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn remaining(&self) -> f32 {
        (self.stop_age - self.age).max(0.0)
    }
}

/// 粒子运动状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveState {
    pub loc: Location,
    pub vel: Vec3,
    /// 角速度（弧度/秒），几何体粒子使用
    pub ang_vel: Vec3,
}

/// 渲染形状
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeTag {
    Sprite,
    Decal,
    /// `piece` 为几何体子部件序号，`None` 表示整个几何体
    Geometry { piece: Option<u32> },
}

/// 拖尾采样点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TailPoint {
    pub pos: Vec3,
    pub age: f32,
}

/// 碰撞预测
///
/// 记住最近一次命中的表面；停靠在表面上的粒子只与该平面比较，不再发射线。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CollisionPrediction {
    pub collisions: u32,
    pub last_hit: Option<RayHit>,
    pub rest_plane: Option<Plane>,
}

/// 发射时随机出的粒子属性
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleAttrs {
    pub size: f32,
    pub alpha: f32,
    pub drag: f32,
    pub gravity_scale: f32,
    pub stretch: f32,
    pub shape: ShapeTag,
    /// 连接序列号，同一条带的粒子相同
    pub seq: u32,
}

/// 粒子力场来源
#[derive(Debug, Clone, Copy)]
pub enum ForceField<'a> {
    /// 容器包围盒内处处相同
    Uniform(PhysForces),
    /// 逐点查询
    Field {
        env: &'a PhysicsEnvironment,
        flags: EnvFlags,
    },
}

impl ForceField<'_> {
    pub fn at(&self, pos: Vec3, world: &dyn PhysicsWorld) -> PhysForces {
        match *self {
            ForceField::Uniform(f) => f,
            ForceField::Field { env, flags } => env.get_forces(pos, flags, Some(world)),
        }
    }

    pub fn water(&self) -> Option<Plane> {
        match *self {
            ForceField::Uniform(f) => f.water,
            ForceField::Field { env, .. } => env.uniform_forces().water,
        }
    }
}

/// 单步更新需要的只读环境
pub struct ParticleUpdateContext<'a> {
    pub params: &'a EffectParams,
    pub forces: ForceField<'a>,
    pub world: &'a dyn PhysicsWorld,
    /// 发射器缩放
    pub scale: f32,
    /// 参与碰撞的物体类别，空表示不做碰撞
    pub collide_flags: EnvFlags,
    /// 世界空间循环盒
    pub space_loop: Option<Aabb>,
}

/// 单步更新结果
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepOutcome {
    pub collided: Option<RayHit>,
    /// 本步内死亡
    pub died: bool,
}

/// 粒子
#[derive(Debug, Clone)]
pub struct Particle {
    pub time: TimeState,
    pub moving: MoveState,
    pub attrs: ParticleAttrs,
    vortex_phase: f32,
    vortex_offset: Vec3,
    tail: Option<VecDeque<TailPoint>>,
    collision: Option<CollisionPrediction>,
    /// 生成它的子发射器（弱引用）
    pub(crate) emitter: Option<SlotHandle>,
    /// 外部引用计数，大于 0 时死亡粒子只隐藏不删除
    pub(crate) ref_count: u32,
    hidden: bool,
}

impl Particle {
    pub fn new(loc: Location, vel: Vec3, stop_age: f32, attrs: ParticleAttrs, params: &EffectParams) -> Self {
        let tail = (params.tail_steps > 0 && params.tail_length > 0.0)
            .then(|| VecDeque::with_capacity(params.tail_steps as usize + 1));
        let collision = params.has_collision().then(CollisionPrediction::default);
        Self {
            time: TimeState::new(stop_age),
            moving: MoveState {
                loc,
                vel,
                ang_vel: Vec3::ZERO,
            },
            attrs,
            vortex_phase: 0.0,
            vortex_offset: Vec3::ZERO,
            tail,
            collision,
            emitter: None,
            ref_count: 0,
            hidden: false,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.moving.loc.translation
    }

    pub fn velocity(&self) -> Vec3 {
        self.moving.vel
    }

    pub fn is_alive(&self) -> bool {
        self.time.is_alive()
    }

    /// 已死亡但仍被引用的粒子不渲染
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// 可以从容器中删除
    pub fn is_removable(&self) -> bool {
        !self.is_alive() && self.ref_count == 0
    }

    pub fn tail(&self) -> impl Iterator<Item = &TailPoint> {
        self.tail.iter().flatten()
    }

    pub fn collision(&self) -> Option<&CollisionPrediction> {
        self.collision.as_ref()
    }

    pub fn spawning_emitter(&self) -> Option<SlotHandle> {
        self.emitter
    }

    /// 世界空间尺寸
    pub fn world_size(&self) -> f32 {
        self.attrs.size * self.moving.loc.scale
    }

    /// 渲染透明度，临终前 10% 寿命淡出
    pub fn render_alpha(&self) -> f32 {
        if self.hidden || !self.is_alive() {
            return 0.0;
        }
        let fade = ((1.0 - self.time.relative_age()) * 10.0).min(1.0);
        (self.attrs.alpha * fade).clamp(0.0, 1.0)
    }

    /// 立即结束寿命
    pub fn kill(&mut self) {
        self.time.stop_age = self.time.stop_age.min(self.time.age);
    }

    pub(crate) fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    /// 把粒子（含拉伸和拖尾）加入包围盒
    pub fn add_bounds(&self, bb: &mut Aabb) {
        let pos = self.position();
        let half = Vec3::splat(self.world_size().max(0.0));
        bb.add_box(&Aabb::from_center_half(pos, half));
        if self.attrs.stretch != 0.0 {
            bb.add_box(&Aabb::from_center_half(pos - self.moving.vel * self.attrs.stretch, half));
            bb.add_box(&Aabb::from_center_half(pos + self.moving.vel * self.attrs.stretch, half));
        }
        for point in self.tail() {
            bb.add_box(&Aabb::from_center_half(point.pos, half));
        }
    }

    /// 推进 `dt` 秒
    ///
    /// 闭式积分位置与速度；碰撞、空间循环、水面吸附在积分后处理。
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        ctx: &ParticleUpdateContext<'_>,
        dt: f32,
        rng: &mut R,
    ) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        if !self.is_alive() || dt <= 0.0 {
            return outcome;
        }

        let params = ctx.params;
        let step = dt.min(self.time.remaining());
        let old_pos = self.position();
        let mut pos = old_pos;
        let mut vel = self.moving.vel;

        let here = ctx.forces.at(pos, ctx.world);
        let mut forces = ForceParams {
            accel: here.accel * self.attrs.gravity_scale + params.acceleration * ctx.scale,
            wind: here.wind * params.wind_scale,
            drag: self.attrs.drag,
            stretch: 0.0,
        };

        if params.turbulence_3d_speed.is_set() && step > 0.0 {
            // 随机加速度按 t^-1/2 缩放，位移与步长无关
            let dir = random_unit(rng);
            forces.accel += dir * (params.turbulence_3d_speed.sample(rng) * ctx.scale / step.sqrt());
        }

        if let Some(plane) = self.collision.and_then(|c| c.rest_plane) {
            // 停靠时去掉指向表面的分量
            let into = forces.accel.dot(plane.normal).min(0.0);
            forces.accel -= plane.normal * into;
        }

        travel(&mut pos, &mut vel, step, &forces);

        if params.turbulence_speed.is_set() && params.turbulence_size.is_set() {
            self.vortex_phase += params.turbulence_speed.max_value().to_radians() * step;
            let axis = vel.try_normalize().unwrap_or(Vec3::Z);
            let u = axis.any_orthonormal_vector();
            let v = axis.cross(u);
            let radius = params.turbulence_size.max_value() * ctx.scale;
            let offset = (u * self.vortex_phase.cos() + v * self.vortex_phase.sin()) * radius;
            pos += offset - self.vortex_offset;
            self.vortex_offset = offset;
        }

        let mut age = self.time.age + step;

        if !ctx.collide_flags.is_empty() {
            if let Some(hit) = self.collide(ctx, old_pos, &mut pos, &mut vel, step) {
                outcome.collided = Some(hit);
                let hit_age = self.time.age + hit.fraction.clamp(0.0, 1.0) * step;
                self.time.collide_age = hit_age;
                if self.time.stop_age <= hit_age {
                    age = hit_age;
                }
            }
        }

        if let Some(bb) = ctx.space_loop {
            pos = wrap_into(pos, &bb);
        }

        if params.facing == Facing::Water {
            match ctx.forces.water() {
                Some(water) => {
                    let dist = water.distance_to_point(pos);
                    pos -= water.normal * dist;
                    vel -= water.normal * vel.dot(water.normal);
                    self.hidden = false;
                }
                // 没有水面时隐藏，水面出现后恢复
                None => self.hidden = true,
            }
        }

        self.moving.loc.translation = pos;
        self.moving.vel = vel;
        self.moving.loc.rotation = (glam::Quat::from_scaled_axis(self.moving.ang_vel * step)
            * self.moving.loc.rotation)
            .normalize();
        self.time.age = age.min(self.time.stop_age.max(self.time.age));

        if let Some(tail) = &mut self.tail {
            tail.push_front(TailPoint {
                pos,
                age: self.time.age,
            });
            let min_age = self.time.age - params.tail_length;
            while tail.len() > params.tail_steps as usize + 1
                || tail.back().is_some_and(|p| p.age < min_age)
            {
                tail.pop_back();
            }
        }

        outcome.died = !self.is_alive();
        outcome
    }

    /// 碰撞处理；命中时修正位置和速度并返回命中信息
    fn collide(
        &mut self,
        ctx: &ParticleUpdateContext<'_>,
        old_pos: Vec3,
        pos: &mut Vec3,
        vel: &mut Vec3,
        step: f32,
    ) -> Option<RayHit> {
        let params = ctx.params;
        let info = self.collision.get_or_insert_with(CollisionPrediction::default);

        if let Some(plane) = info.rest_plane {
            // 沿停靠面滑动：穿透时投影回表面
            let dist = plane.distance_to_point(*pos);
            if dist < 0.0 {
                *pos -= plane.normal * dist;
            }
            let vn = vel.dot(plane.normal);
            if vn < 0.0 {
                *vel -= plane.normal * vn;
            } else if vn > REST_SPEED {
                info.rest_plane = None;
            }
            return None;
        }

        let seg = *pos - old_pos;
        if seg.length_squared() <= f32::EPSILON * f32::EPSILON {
            return None;
        }
        let hit = ctx.world.ray_intersect(old_pos, seg, ctx.collide_flags)?;
        info.collisions += 1;
        info.last_hit = Some(hit);

        let limit_reached = params.max_collision_events > 0 && info.collisions >= params.max_collision_events;
        if params.bounciness < 0.0 || limit_reached {
            *pos = hit.point;
            *vel = Vec3::ZERO;
            self.time.stop_age = self.time.age + hit.fraction.clamp(0.0, 1.0) * step;
            return Some(hit);
        }

        let vn = vel.dot(hit.normal);
        if vn < 0.0 {
            *vel -= hit.normal * (vn * (1.0 + params.bounciness));
        }
        *pos = hit.point + hit.normal * SURFACE_OFFSET;
        if vel.dot(hit.normal).abs() < REST_SPEED {
            info.rest_plane = Some(Plane::from_point_normal(hit.point, hit.normal));
        }
        Some(hit)
    }
}

/// 单位球面上均匀分布的方向
pub fn random_unit<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    let z: f32 = rng.gen_range(-1.0..=1.0);
    let phi: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// 按轴把位置折回循环盒内
pub fn wrap_into(pos: Vec3, bb: &Aabb) -> Vec3 {
    let size = bb.size();
    let mut out = pos;
    for i in 0..3 {
        if size[i] > 0.0 {
            out[i] = bb.min[i] + (pos[i] - bb.min[i]).rem_euclid(size[i]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::PhysicsType;
    use crate::physics::{StaticPhysicsWorld, STANDARD_GRAVITY};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn attrs() -> ParticleAttrs {
        ParticleAttrs {
            size: 0.5,
            alpha: 1.0,
            drag: 0.0,
            gravity_scale: 1.0,
            stretch: 0.0,
            shape: ShapeTag::Sprite,
            seq: 0,
        }
    }

    fn ctx<'a>(params: &'a EffectParams, world: &'a StaticPhysicsWorld) -> ParticleUpdateContext<'a> {
        ParticleUpdateContext {
            params,
            forces: ForceField::Uniform(PhysForces::earth()),
            world,
            scale: 1.0,
            collide_flags: EnvFlags::empty(),
            space_loop: None,
        }
    }

    #[test]
    fn test_closed_form_step() {
        let params = EffectParams::default();
        let world = StaticPhysicsWorld::default();
        let mut p = Particle::new(Location::IDENTITY, Vec3::new(0.0, 0.0, 10.0), 5.0, attrs(), &params);
        let mut rng = StdRng::seed_from_u64(1);

        p.update(&ctx(&params, &world), 1.0, &mut rng);
        assert!((p.velocity().z - (10.0 + STANDARD_GRAVITY)).abs() < 1e-5);
        assert!((p.position().z - (10.0 + 0.5 * STANDARD_GRAVITY)).abs() < 1e-5);
        assert_eq!(p.time.age, 1.0);
    }

    #[test]
    fn test_dies_at_stop_age() {
        let params = EffectParams::default();
        let world = StaticPhysicsWorld::default();
        let mut p = Particle::new(Location::IDENTITY, Vec3::ZERO, 0.5, attrs(), &params);
        let mut rng = StdRng::seed_from_u64(1);

        let out = p.update(&ctx(&params, &world), 1.0, &mut rng);
        assert!(out.died);
        assert_eq!(p.time.age, 0.5);
        assert!(p.is_removable());

        p.ref_count = 1;
        assert!(!p.is_removable());
        assert_eq!(p.render_alpha(), 0.0);
    }

    #[test]
    fn test_die_on_terrain_collision() {
        let params = EffectParams {
            physics_type: PhysicsType::SimpleCollision,
            collide_terrain: true,
            bounciness: -1.0,
            ..Default::default()
        };
        let world = StaticPhysicsWorld::default().with_terrain(0.0);
        let start = Location::from_translation(Vec3::new(0.0, 0.0, 1.0));
        let mut p = Particle::new(start, Vec3::new(0.0, 0.0, -4.0), 10.0, attrs(), &params);
        let mut rng = StdRng::seed_from_u64(1);

        let c = ParticleUpdateContext {
            collide_flags: EnvFlags::ENV_TERRAIN,
            forces: ForceField::Uniform(PhysForces::ZERO),
            ..ctx(&params, &world)
        };
        let out = p.update(&c, 1.0, &mut rng);
        assert!(out.collided.is_some());
        assert!(out.died);
        assert!((p.time.stop_age - 0.25).abs() < 1e-5);
        assert!(p.position().z.abs() < 1e-5);
    }

    #[test]
    fn test_bounce_then_rest() {
        let params = EffectParams {
            physics_type: PhysicsType::SimpleCollision,
            collide_terrain: true,
            bounciness: 0.0,
            ..Default::default()
        };
        let world = StaticPhysicsWorld::default().with_terrain(0.0);
        let start = Location::from_translation(Vec3::new(0.0, 0.0, 0.5));
        let mut p = Particle::new(start, Vec3::new(1.0, 0.0, -2.0), 10.0, attrs(), &params);
        let mut rng = StdRng::seed_from_u64(1);
        let c = ParticleUpdateContext {
            collide_flags: EnvFlags::ENV_TERRAIN,
            ..ctx(&params, &world)
        };

        let out = p.update(&c, 0.5, &mut rng);
        assert!(out.collided.is_some());
        assert!(!out.died);
        assert!(p.collision().and_then(|c| c.rest_plane).is_some());

        // 停靠后只沿地面滑动
        for _ in 0..10 {
            p.update(&c, 0.1, &mut rng);
        }
        assert!(p.position().z >= -1e-4);
        assert!(p.position().x > 0.5);
    }

    #[test]
    fn test_space_loop_and_tail() {
        let params = EffectParams {
            tail_steps: 3,
            tail_length: 10.0,
            ..Default::default()
        };
        let world = StaticPhysicsWorld::default();
        let mut p = Particle::new(Location::IDENTITY, Vec3::new(3.0, 0.0, 0.0), 10.0, attrs(), &params);
        let mut rng = StdRng::seed_from_u64(1);
        let c = ParticleUpdateContext {
            forces: ForceField::Uniform(PhysForces::ZERO),
            space_loop: Some(Aabb::new(Vec3::splat(-2.0), Vec3::splat(2.0))),
            ..ctx(&params, &world)
        };

        for _ in 0..6 {
            p.update(&c, 0.5, &mut rng);
        }
        assert!(p.position().x >= -2.0 && p.position().x <= 2.0);
        assert_eq!(p.tail().count(), 4);
    }

    #[test]
    fn test_water_snapping() {
        let params = EffectParams {
            facing: Facing::Water,
            ..Default::default()
        };
        let world = StaticPhysicsWorld::default();
        let mut p = Particle::new(Location::IDENTITY, Vec3::new(1.0, 0.0, 2.0), 10.0, attrs(), &params);
        let mut rng = StdRng::seed_from_u64(1);

        let mut c = ParticleUpdateContext {
            forces: ForceField::Uniform(PhysForces {
                water: Some(Plane::horizontal(1.5)),
                ..PhysForces::ZERO
            }),
            ..ctx(&params, &world)
        };
        p.update(&c, 0.5, &mut rng);
        assert!((p.position().z - 1.5).abs() < 1e-5);
        assert_eq!(p.velocity().z, 0.0);

        let dry = ParticleUpdateContext {
            forces: ForceField::Uniform(PhysForces::ZERO),
            ..ctx(&params, &world)
        };
        p.update(&dry, 0.1, &mut rng);
        assert!(p.is_hidden());

        c.forces = ForceField::Uniform(PhysForces {
            water: Some(Plane::horizontal(0.5)),
            ..PhysForces::ZERO
        });
        p.update(&c, 0.1, &mut rng);
        assert!(!p.is_hidden());
        assert!((p.position().z - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_random_unit_is_normalized() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            assert!((random_unit(&mut rng).length() - 1.0).abs() < 1e-4);
        }
        let wrapped = wrap_into(Vec3::new(5.0, -3.0, 0.0), &Aabb::new(Vec3::ZERO, Vec3::splat(2.0)));
        assert!((wrapped - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-5);
    }
}
