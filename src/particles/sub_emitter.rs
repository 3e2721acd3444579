//! 子发射器
//!
//! 决定何时发射、发射多少粒子的计时状态机，年龄都以所属容器的时间为基准：
//!
//! 未初始化 → 活跃（`start_age <= age < stop_age`）→ [到达 `repeat_age` 重新初始化] → 过期
//!
//! 重新初始化会换用新的随机种子并清零计数，但不影响所属容器。

use super::arena::SlotHandle;
use super::emitter::SpawnParams;
use super::particle::{Particle, ParticleAttrs, ShapeTag};
use crate::core::utils::mix_seed;
use crate::effect::{EffectParams, Facing, ForceGeneration, GeometryPieces};
use crate::math::{Aabb, Location};
use crate::physics::{ForceProxyDesc, PhysForces, PhysicsWorld, ProxyId, ProxyShape};
use glam::{EulerRot, Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

/// 脉冲周期下限，避免重复初始化陷入死循环
const MIN_PULSE_PERIOD: f32 = 0.1;

/// 力场变化超过此比例才更新代理
const FORCE_CHANGE_TOLERANCE: f32 = 0.05;

/// 包围盒角点移动超过盒对角线的此比例才更新代理
const SHAPE_CHANGE_TOLERANCE: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubEmitterState {
    Uninitialized,
    Active,
    Expired,
}

/// 状态变化，容器据此转发音频触发器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubEmitterEvent {
    Started,
    Stopped,
}

/// 一次发射的输入
#[derive(Debug, Clone, Copy)]
pub struct EmitContext<'a> {
    /// 容器当前年龄
    pub age: f32,
    pub params: &'a EffectParams,
    pub spawn: &'a SpawnParams,
    pub emitter_vel: Vec3,
    /// 发射器处的均匀力，朝重力方向发射时使用
    pub forces: &'a PhysForces,
    pub camera_pos: Option<Vec3>,
    /// 密度补偿系数，`>= 1`
    pub density: f32,
    /// 父粒子剩余寿命，寿命为 0 的间接子效果继承它
    pub parent_life: Option<f32>,
}

/// 一次发射的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmitResult {
    pub emitted: u32,
    pub rejected: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ForceProxyState {
    id: ProxyId,
    desc: ForceProxyDesc,
}

/// 子发射器
#[derive(Debug)]
pub struct SubEmitter {
    state: SubEmitterState,
    /// 触发年龄：直接子效果为容器创建时刻，间接子效果为父粒子事件时刻
    trigger_age: f32,
    start_age: f32,
    emit_stop_age: f32,
    repeat_age: f32,
    stop_age: f32,
    /// 下一个持续发射粒子的年龄
    next_emit_age: f32,
    pending_burst: bool,
    base_seed: u64,
    cycle: u64,
    rng: StdRng,
    count: f32,
    emitted: u32,
    loc: Location,
    loc_age: f32,
    prev_loc: Location,
    prev_loc_age: f32,
    /// 生成本子发射器的父粒子
    pub(crate) parent_particle: Option<SlotHandle>,
    /// 父粒子剩余寿命，跟随父粒子时逐帧刷新
    pub(crate) parent_life: Option<f32>,
    vel: Vec3,
    started: bool,
    force: Option<ForceProxyState>,
    seq: u32,
}

impl SubEmitter {
    pub fn new(trigger_age: f32, seed: u64, seq: u32, loc: Location) -> Self {
        Self {
            state: SubEmitterState::Uninitialized,
            trigger_age,
            start_age: trigger_age,
            emit_stop_age: trigger_age,
            repeat_age: trigger_age,
            stop_age: trigger_age,
            next_emit_age: trigger_age,
            pending_burst: false,
            base_seed: seed,
            cycle: 0,
            rng: StdRng::seed_from_u64(seed),
            count: 0.0,
            emitted: 0,
            loc,
            loc_age: trigger_age,
            prev_loc: loc,
            prev_loc_age: trigger_age,
            parent_particle: None,
            parent_life: None,
            vel: Vec3::ZERO,
            started: false,
            force: None,
            seq,
        }
    }

    pub fn state(&self) -> SubEmitterState {
        self.state
    }

    pub fn start_age(&self) -> f32 {
        self.start_age
    }

    pub fn stop_age(&self) -> f32 {
        self.stop_age
    }

    pub fn repeat_age(&self) -> f32 {
        self.repeat_age
    }

    pub fn emit_stop_age(&self) -> f32 {
        self.emit_stop_age
    }

    pub fn trigger_age(&self) -> f32 {
        self.trigger_age
    }

    /// 本周期已发射的粒子数
    pub fn emitted_count(&self) -> u32 {
        self.emitted
    }

    /// 本周期采样出的发射数量
    pub fn count(&self) -> f32 {
        self.count
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn location(&self) -> &Location {
        &self.loc
    }

    pub fn parent_particle(&self) -> Option<SlotHandle> {
        self.parent_particle
    }

    /// 发射源速度，粒子按 `inherit_velocity` 继承
    pub fn velocity(&self) -> Vec3 {
        self.vel
    }

    pub fn set_velocity(&mut self, vel: Vec3) {
        self.vel = vel;
    }

    pub fn has_force_proxy(&self) -> bool {
        self.force.is_some()
    }

    /// 在 `age` 时刻正在发射或等待发射
    pub fn is_active(&self, age: f32) -> bool {
        self.state == SubEmitterState::Active && age >= self.start_age && age < self.stop_age
    }

    /// 本周期的发射已全部完成
    fn emission_done(&self) -> bool {
        !self.pending_burst && self.next_emit_age >= self.emit_stop_age
    }

    /// 以 `age` 为触发时刻开始一个发射周期
    pub fn initialize(&mut self, age: f32, params: &EffectParams, spawn: &SpawnParams) {
        self.rng = StdRng::seed_from_u64(mix_seed(self.base_seed, self.cycle));
        self.cycle += 1;

        let rng = &mut self.rng;
        self.start_age = age + params.spawn_delay.sample(rng).max(0.0);
        let mut count = params.count.sample(rng).max(0.0) * spawn.count_scale;
        if spawn.strength >= 0.0 {
            count *= spawn.strength;
        }
        self.count = count;

        self.emit_stop_age = if !params.continuous {
            self.start_age
        } else if params.emitter_life_time.is_set() {
            self.start_age + params.emitter_life_time.sample(rng).max(0.0)
        } else {
            f32::INFINITY
        };
        self.pending_burst = !params.continuous;
        self.next_emit_age = self.start_age;

        if params.pulse_period.is_set() {
            self.repeat_age = self.start_age + params.pulse_period.sample(rng).max(MIN_PULSE_PERIOD);
            self.emit_stop_age = self.emit_stop_age.min(self.repeat_age);
            self.stop_age = f32::INFINITY;
        } else {
            self.repeat_age = self.emit_stop_age;
            self.stop_age = self.emit_stop_age;
        }

        self.emitted = 0;
        self.started = false;
        self.state = SubEmitterState::Active;
    }

    /// 推进状态机，开始/停止时回调 `on_event`
    pub fn update_state(
        &mut self,
        age: f32,
        params: &EffectParams,
        spawn: &SpawnParams,
        on_event: &mut dyn FnMut(SubEmitterEvent),
    ) {
        if self.state == SubEmitterState::Uninitialized {
            self.initialize(self.trigger_age, params, spawn);
        }
        if self.state != SubEmitterState::Active {
            return;
        }
        if !self.started && age >= self.start_age {
            self.started = true;
            on_event(SubEmitterEvent::Started);
        }
        if age >= self.stop_age && self.emission_done() {
            self.state = SubEmitterState::Expired;
            if self.started {
                on_event(SubEmitterEvent::Stopped);
            }
        }
    }

    /// 在 `age` 停止发射；尚未开始的爆发直接取消
    pub fn kill(&mut self, age: f32) {
        match self.state {
            SubEmitterState::Uninitialized => self.state = SubEmitterState::Expired,
            SubEmitterState::Active => {
                self.stop_age = self.stop_age.min(age);
                self.emit_stop_age = self.emit_stop_age.min(age);
                self.repeat_age = self.repeat_age.min(self.stop_age);
                if self.pending_burst && self.start_age > age {
                    self.pending_burst = false;
                }
            }
            SubEmitterState::Expired => {}
        }
    }

    /// 记录本帧的世界变换，发射时在两帧之间插值
    pub fn move_to(&mut self, loc: Location, age: f32) {
        if age > self.loc_age {
            self.prev_loc = self.loc;
            self.prev_loc_age = self.loc_age;
        }
        self.loc = loc;
        self.loc_age = age;
    }

    /// `age` 时刻的变换，沿四元数弧线插值
    pub fn location_at(&self, age: f32) -> Location {
        if self.loc_age <= self.prev_loc_age {
            return self.loc;
        }
        let t = ((age - self.prev_loc_age) / (self.loc_age - self.prev_loc_age)).clamp(0.0, 1.0);
        self.prev_loc.interpolate(&self.loc, t)
    }

    /// 持续发射时相邻两粒子的年龄间隔
    pub fn emission_step(&self, params: &EffectParams, density: f32) -> Option<f32> {
        if !params.continuous || self.count <= 0.0 {
            return None;
        }
        let particle_life = if params.particle_life_time.is_set() {
            params.particle_life_time.max_value()
        } else {
            f32::INFINITY
        };
        let emitter_life = self.emit_stop_age - self.start_age;
        let mut period = particle_life.min(emitter_life);
        if !period.is_finite() || period <= 0.0 {
            period = 1.0;
        }
        Some(period / self.count / density.max(1.0))
    }

    /// 发射到 `ctx.age` 为止应出生的粒子
    ///
    /// 从时间窗口最早的粒子走到最新的，每个粒子带着已流逝的年龄交给 `sink`；
    /// `sink` 返回 `false` 表示池已满，本次发射立即结束，不重试。
    pub fn emit_particles(
        &mut self,
        ctx: &EmitContext<'_>,
        sink: &mut dyn FnMut(Particle, f32) -> bool,
    ) -> EmitResult {
        let mut result = EmitResult::default();
        if self.state != SubEmitterState::Active {
            return result;
        }

        loop {
            if self.pending_burst {
                if ctx.age < self.start_age {
                    break;
                }
                self.pending_burst = false;
                let birth = self.start_age;
                let loc = self.location_at(birth);
                let total = self.count.round() as u32;
                for _ in 0..total {
                    let Some(particle) = self.spawn_particle(ctx, &loc, birth) else {
                        continue;
                    };
                    if !sink(particle, ctx.age - birth) {
                        result.rejected += 1;
                        break;
                    }
                    self.emitted += 1;
                    result.emitted += 1;
                }
            } else if let Some(step) = self.emission_step(ctx.params, ctx.density) {
                let end = ctx.age.min(self.emit_stop_age);
                let max_life = ctx.params.max_particle_life();
                if max_life.is_finite() && self.next_emit_age < end - max_life {
                    // 跳过出生即已死亡的粒子
                    let skipped = ((end - max_life - self.next_emit_age) / step).floor();
                    self.next_emit_age += skipped * step;
                }
                // 出生年龄按序号计算，年龄很大时累加会被 f32 精度吞掉
                let base = self.next_emit_age;
                let mut index = 0.0f32;
                loop {
                    let birth = base + index * step;
                    if birth >= end {
                        break;
                    }
                    index += 1.0;
                    self.next_emit_age = base + index * step;
                    let loc = self.location_at(birth);
                    let Some(particle) = self.spawn_particle(ctx, &loc, birth) else {
                        continue;
                    };
                    if !sink(particle, ctx.age - birth) {
                        result.rejected += 1;
                        break;
                    }
                    self.emitted += 1;
                    result.emitted += 1;
                }
            }

            if result.rejected == 0 && ctx.age >= self.repeat_age && self.repeat_age < self.stop_age {
                self.initialize(self.repeat_age, ctx.params, ctx.spawn);
                continue;
            }
            break;
        }
        result
    }

    /// 发射轴
    fn emit_axis(&mut self, ctx: &EmitContext<'_>, loc: &Location) -> Vec3 {
        let params = ctx.params;
        let default_axis = loc.rotation * Vec3::Y;
        if params.focus_angle.is_set() {
            let focus = Quat::from_euler(
                EulerRot::XYZ,
                params.focus_angle.sample(&mut self.rng).to_radians(),
                params.focus_azimuth.sample(&mut self.rng).to_radians(),
                0.0,
            );
            (loc.rotation * focus) * Vec3::Y
        } else if params.focus_camera_dir {
            ctx.camera_pos
                .and_then(|cam| (cam - loc.translation).try_normalize())
                .unwrap_or(default_axis)
        } else if params.focus_gravity_dir {
            (-ctx.forces.accel).try_normalize().unwrap_or(Vec3::NEG_Z)
        } else {
            default_axis
        }
    }

    /// 生成一个在 `birth` 时刻出生的粒子；出生后到现在已死亡则返回 `None`
    fn spawn_particle(&mut self, ctx: &EmitContext<'_>, loc: &Location, birth: f32) -> Option<Particle> {
        let params = ctx.params;

        let life = if params.remain_while_visible {
            f32::INFINITY
        } else if params.particle_life_time.is_set() {
            params.particle_life_time.sample(&mut self.rng).max(0.0)
        } else if let Some(parent_life) = ctx.parent_life {
            parent_life
        } else if self.emit_stop_age.is_finite() && self.emit_stop_age > birth {
            self.emit_stop_age - birth
        } else {
            f32::INFINITY
        };
        if ctx.age - birth >= life {
            return None;
        }

        let ro = params.random_offset;
        let jitter = Vec3::new(
            ro.x * self.rng.gen_range(-1.0f32..=1.0),
            ro.y * self.rng.gen_range(-1.0f32..=1.0),
            ro.z * self.rng.gen_range(-1.0f32..=1.0),
        );
        let offset = params.position_offset + jitter;
        let pos = loc.transform_point(offset);

        let axis = self.emit_axis(ctx, loc);
        let theta = params.emit_angle.sample(&mut self.rng).to_radians();
        let phi = self.rng.gen_range(0.0..TAU);
        let u = axis.any_orthonormal_vector();
        let v = axis.cross(u);
        let mut dir = axis * theta.cos() + (u * phi.cos() + v * phi.sin()) * theta.sin();
        if params.emit_offset_dir {
            if let Some(out) = loc.transform_vector(offset).try_normalize() {
                dir = out;
            }
        }

        let speed = params.speed.sample(&mut self.rng) * loc.scale * ctx.spawn.speed_scale;
        let vel = dir * speed + ctx.emitter_vel * params.inherit_velocity;

        let attrs = sample_attrs(params, ctx.spawn.size_scale, self.seq, self.emitted, &mut self.rng);
        let particle_loc = Location::new(loc.rotation, pos, loc.scale);
        Some(Particle::new(particle_loc, vel, life, attrs, params))
    }

    /// 维护粒子群回馈给世界的力场代理
    ///
    /// 只有形状或力的变化肉眼可见时才提交更新；力为零时删除代理。
    pub fn update_force(
        &mut self,
        world: &dyn PhysicsWorld,
        params: &EffectParams,
        bounds: &Aabb,
        avg_vel: Vec3,
        particle_count: usize,
    ) {
        let desired = desired_force(params, bounds, avg_vel, particle_count);
        match (desired, self.force.as_mut()) {
            (None, Some(_)) => self.release_force(world),
            (None, None) => {}
            (Some(desc), None) => {
                let id = world.create_force_proxy(desc);
                self.force = Some(ForceProxyState { id, desc });
            }
            (Some(desc), Some(state)) => {
                if visibly_changed(&state.desc, &desc) {
                    if world.update_force_proxy(state.id, desc).is_err() {
                        state.id = world.create_force_proxy(desc);
                    }
                    state.desc = desc;
                }
            }
        }
    }

    /// 删除力场代理
    pub fn release_force(&mut self, world: &dyn PhysicsWorld) {
        if let Some(state) = self.force.take() {
            world.remove_force_proxy(state.id);
        }
    }
}

/// 按参数随机出粒子属性；`index` 为本周期的发射序号，用于依次取几何体部件
pub(crate) fn sample_attrs<R: Rng + ?Sized>(
    params: &EffectParams,
    size_scale: f32,
    seq: u32,
    index: u32,
    rng: &mut R,
) -> ParticleAttrs {
    let shape = match &params.geometry {
        Some(geom) if geom.pieces > 0 => ShapeTag::Geometry {
            piece: match params.geometry_pieces {
                GeometryPieces::Whole => None,
                GeometryPieces::AllPieces => Some(index % geom.pieces),
                GeometryPieces::RandomPiece => Some(rng.gen_range(0..geom.pieces)),
            },
        },
        Some(_) => ShapeTag::Geometry { piece: None },
        None if params.facing == Facing::Decal => ShapeTag::Decal,
        None => ShapeTag::Sprite,
    };

    ParticleAttrs {
        size: params.size.sample(rng) * size_scale,
        alpha: params.alpha.sample(rng),
        drag: params.air_resistance.sample(rng),
        gravity_scale: params.gravity_scale.sample(rng),
        stretch: if params.tail_steps == 0 {
            params.stretch.sample(rng)
        } else {
            0.0
        },
        shape,
        seq,
    }
}

fn desired_force(
    params: &EffectParams,
    bounds: &Aabb,
    avg_vel: Vec3,
    particle_count: usize,
) -> Option<ForceProxyDesc> {
    if particle_count == 0 || bounds.is_reset() {
        return None;
    }
    let forces = match params.force_generation {
        ForceGeneration::None => return None,
        ForceGeneration::Wind => PhysForces {
            wind: avg_vel,
            ..PhysForces::ZERO
        },
        ForceGeneration::Gravity => PhysForces {
            accel: params.acceleration,
            ..PhysForces::ZERO
        },
    };
    if forces.is_zero() {
        return None;
    }
    Some(ForceProxyDesc {
        shape: ProxyShape::Box(*bounds),
        forces,
    })
}

fn visibly_changed(old: &ForceProxyDesc, new: &ForceProxyDesc) -> bool {
    let magnitude = old.forces.accel.length() + old.forces.wind.length();
    let delta = (old.forces.accel - new.forces.accel).length() + (old.forces.wind - new.forces.wind).length();
    if delta > FORCE_CHANGE_TOLERANCE * magnitude.max(f32::EPSILON) {
        return true;
    }
    match (old.shape, new.shape) {
        (ProxyShape::Box(a), ProxyShape::Box(b)) => {
            let tolerance = a.size().length() * SHAPE_CHANGE_TOLERANCE;
            (a.min - b.min).length() > tolerance || (a.max - b.max).length() > tolerance
        }
        (a, b) => a != b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::VarParam;
    use crate::physics::StaticPhysicsWorld;

    fn continuous() -> EffectParams {
        EffectParams {
            count: VarParam::fixed(10.0),
            continuous: true,
            particle_life_time: VarParam::fixed(2.0),
            speed: VarParam::fixed(1.0),
            ..Default::default()
        }
    }

    fn emit(
        sub: &mut SubEmitter,
        params: &EffectParams,
        age: f32,
        accept: &mut dyn FnMut(Particle, f32) -> bool,
    ) -> EmitResult {
        let spawn = SpawnParams::default();
        let ctx = EmitContext {
            age,
            params,
            spawn: &spawn,
            emitter_vel: Vec3::ZERO,
            forces: &PhysForces::ZERO,
            camera_pos: None,
            density: 1.0,
            parent_life: None,
        };
        sub.update_state(age, params, &spawn, &mut |_| {});
        sub.emit_particles(&ctx, accept)
    }

    #[test]
    fn test_continuous_emits_half_population_in_one_second() {
        let params = continuous();
        let mut sub = SubEmitter::new(0.0, 7, 0, Location::IDENTITY);
        let mut ages = Vec::new();
        let result = emit(&mut sub, &params, 1.0, &mut |p, past| {
            assert!(p.is_alive());
            ages.push(past);
            true
        });
        assert_eq!(result.emitted, 5);
        // 最早出生的粒子最先交出
        assert!(ages.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(sub.state(), SubEmitterState::Active);
    }

    #[test]
    fn test_emission_terminates_at_large_ages() {
        let params = EffectParams {
            count: VarParam::fixed(1000.0),
            ..continuous()
        };
        let trigger = 1.0e7;
        let mut sub = SubEmitter::new(trigger, 3, 0, Location::IDENTITY);
        let mut calls = 0u32;
        let result = emit(&mut sub, &params, trigger + 1.0, &mut |_, _| {
            calls += 1;
            true
        });
        // 一秒内最多 1000 / 2 个，外加窗口起点
        assert!(result.emitted > 0);
        assert!(calls <= 501, "emitted {} particles", calls);
        assert!(sub.next_emit_age >= trigger + 1.0);
    }

    #[test]
    fn test_burst_emits_once_then_expires() {
        let params = EffectParams {
            count: VarParam::fixed(4.0),
            particle_life_time: VarParam::fixed(1.0),
            ..Default::default()
        };
        let mut sub = SubEmitter::new(0.0, 1, 0, Location::IDENTITY);
        let mut events = Vec::new();
        let spawn = SpawnParams::default();

        sub.update_state(0.0, &params, &spawn, &mut |e| events.push(e));
        let first = emit(&mut sub, &params, 0.0, &mut |_, _| true);
        assert_eq!(first.emitted, 4);

        sub.update_state(0.5, &params, &spawn, &mut |e| events.push(e));
        assert_eq!(sub.state(), SubEmitterState::Expired);
        assert_eq!(events, vec![SubEmitterEvent::Started, SubEmitterEvent::Stopped]);
        assert_eq!(emit(&mut sub, &params, 1.0, &mut |_, _| true).emitted, 0);
    }

    #[test]
    fn test_rejection_stops_burst() {
        let params = EffectParams {
            count: VarParam::fixed(10.0),
            ..Default::default()
        };
        let mut sub = SubEmitter::new(0.0, 1, 0, Location::IDENTITY);
        let mut accepted = 0;
        let result = emit(&mut sub, &params, 0.0, &mut |_, _| {
            accepted += 1;
            accepted <= 3
        });
        assert_eq!(result.emitted, 3);
        assert_eq!(result.rejected, 1);
    }

    #[test]
    fn test_pulse_repeats_with_new_cycle() {
        let params = EffectParams {
            count: VarParam::fixed(2.0),
            pulse_period: VarParam::fixed(1.0),
            particle_life_time: VarParam::fixed(5.0),
            ..Default::default()
        };
        let mut sub = SubEmitter::new(0.0, 3, 0, Location::IDENTITY);
        let mut total = emit(&mut sub, &params, 0.0, &mut |_, _| true).emitted;
        assert!(sub.repeat_age() <= sub.stop_age());

        total += emit(&mut sub, &params, 2.5, &mut |_, _| true).emitted;
        assert_eq!(total, 6);
        assert_eq!(sub.start_age(), 2.0);
        assert!(sub.repeat_age() <= sub.stop_age());
    }

    #[test]
    fn test_kill_stops_continuous_emission() {
        let params = continuous();
        let mut sub = SubEmitter::new(0.0, 5, 0, Location::IDENTITY);
        emit(&mut sub, &params, 0.5, &mut |_, _| true);
        sub.kill(0.5);
        assert_eq!(emit(&mut sub, &params, 1.5, &mut |_, _| true).emitted, 0);

        let spawn = SpawnParams::default();
        sub.update_state(1.5, &params, &spawn, &mut |_| {});
        assert_eq!(sub.state(), SubEmitterState::Expired);
    }

    #[test]
    fn test_moving_emitter_interpolates_spawn_positions() {
        let params = EffectParams {
            count: VarParam::fixed(100.0),
            continuous: true,
            particle_life_time: VarParam::fixed(10.0),
            ..Default::default()
        };
        let mut sub = SubEmitter::new(0.0, 5, 0, Location::IDENTITY);
        sub.move_to(Location::from_translation(Vec3::new(10.0, 0.0, 0.0)), 1.0);

        let mut xs = Vec::new();
        emit(&mut sub, &params, 1.0, &mut |p, _| {
            xs.push(p.position().x);
            true
        });
        assert!(xs.len() > 1);
        assert!(xs.windows(2).all(|w| w[0] < w[1]));
        assert!(xs[0] < 1.0);
    }

    #[test]
    fn test_force_proxy_lifecycle() {
        let world = StaticPhysicsWorld::default();
        let params = EffectParams {
            force_generation: ForceGeneration::Wind,
            ..Default::default()
        };
        let bb = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        let mut sub = SubEmitter::new(0.0, 1, 0, Location::IDENTITY);

        sub.update_force(&world, &params, &bb, Vec3::X, 10);
        assert!(sub.has_force_proxy());
        assert_eq!(world.proxy_count(), 1);

        // 微小变化不提交
        sub.update_force(&world, &params, &bb, Vec3::new(1.01, 0.0, 0.0), 10);
        let stored = sub.force.map(|s| s.desc.forces.wind);
        assert_eq!(stored, Some(Vec3::X));

        sub.update_force(&world, &params, &bb, Vec3::ZERO, 10);
        assert!(!sub.has_force_proxy());
        assert_eq!(world.proxy_count(), 0);
    }
}
