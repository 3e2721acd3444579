//! 粒子容器
//!
//! 一个效果节点实例的粒子群：粒子链表、子发射器、延迟发射队列，以及静态、动态、
//! 世界三个包围盒。有父容器的是间接容器，每个触发它的父粒子对应一个子发射器。
//!
//! 包围盒策略：不需要动态包围盒时解析地算一次静态盒，在稳定年龄之前再并上
//! 动态盒；需要动态包围盒时每帧更新粒子并直接使用动态盒。

use super::arena::{PoolBudget, SlotHandle, SlotList};
use super::context::SimulationContext;
use super::emitter::SpawnParams;
use super::events::AudioTrigger;
use super::particle::{ForceField, Particle, ParticleUpdateContext};
use super::stats::ParticleCounts;
use super::sub_emitter::{sample_attrs, EmitContext, SubEmitter, SubEmitterEvent, SubEmitterState};
use crate::core::utils::mix_seed;
use crate::effect::{EffectId, EffectParams, EffectTree, EnvFlags, SpawnIndirection, StaticBoundsOpts};
use crate::math::{Aabb, Camera, Location};
use crate::physics::{ForceParams, PhysForces, PhysicsEnvironment, PhysicsWorld};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

/// 父粒子事件，子容器据此创建间接子发射器
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParentEvent {
    /// 只有 `ParentStart` 事件保证句柄有效
    pub particle: SlotHandle,
    pub trigger: SpawnIndirection,
    /// 事件发生时的容器年龄
    pub age: f32,
    pub loc: Location,
    pub vel: Vec3,
}

/// 发射器传给容器的本帧数据
#[derive(Debug, Clone, Copy)]
pub struct EmitterFrame<'a> {
    pub id: u64,
    pub age: f32,
    pub loc: Location,
    pub vel: Vec3,
    pub spawn: &'a SpawnParams,
    /// 发射器的物理环境子集
    pub env: &'a PhysicsEnvironment,
}

/// 外部请求、下次更新时执行的发射
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeferredEmit {
    pub loc: Location,
    pub vel: Vec3,
}

/// 新粒子的插入位置策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsertPolicy {
    /// 0 不排序，1 渐进二分，2 最小累计误差扫描
    pub sort_quality: u8,
    pub camera: Option<Camera>,
    /// 条带粒子插在同序列粒子之前
    pub connected: bool,
}

impl InsertPolicy {
    pub const UNSORTED: InsertPolicy = InsertPolicy {
        sort_quality: 0,
        camera: None,
        connected: false,
    };
}

/// 粒子链表与近似排序索引
///
/// 排序时链表由远到近排列，索引记录每个粒子在上次更新时的相机深度。
#[derive(Debug, Default)]
pub struct ParticleList {
    list: SlotList<Particle>,
    sort_index: Vec<(f32, SlotHandle)>,
}

impl ParticleList {
    pub fn with_budget(budget: Arc<PoolBudget>) -> Self {
        Self {
            list: SlotList::with_budget(budget),
            sort_index: Vec::new(),
        }
    }

    pub fn list(&self) -> &SlotList<Particle> {
        &self.list
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, h: SlotHandle) -> Option<&Particle> {
        self.list.get(h)
    }

    pub fn get_mut(&mut self, h: SlotHandle) -> Option<&mut Particle> {
        self.list.get_mut(h)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotHandle, &Particle)> {
        self.list.iter()
    }

    /// 按策略插入；池满时返回 `None`
    pub fn insert(&mut self, particle: Particle, policy: &InsertPolicy) -> Option<SlotHandle> {
        if policy.connected {
            let seq = particle.attrs.seq;
            let same = self
                .list
                .iter()
                .find(|(_, p)| p.attrs.seq == seq)
                .map(|(h, _)| h);
            return match same {
                Some(at) => self.list.insert_before(at, particle),
                None => self.list.push_front(particle),
            };
        }

        let camera = match policy.camera {
            Some(camera) if policy.sort_quality > 0 => camera,
            _ => return self.list.push_front(particle),
        };

        let depth = camera.depth(particle.position());
        let pos = if policy.sort_quality >= 2 {
            min_error_position(&self.sort_index, depth)
        } else {
            self.sort_index.partition_point(|&(d, _)| d > depth)
        };
        let handle = match self.sort_index.get(pos) {
            Some(&(_, at)) => self.list.insert_before(at, particle)?,
            None => self.list.push_back(particle)?,
        };
        self.sort_index.insert(pos, (depth, handle));
        Some(handle)
    }

    /// 按当前链表顺序重建深度索引
    pub fn rebuild_sort_index(&mut self, camera: Option<&Camera>) {
        self.sort_index.clear();
        if let Some(camera) = camera {
            self.sort_index
                .extend(self.list.iter().map(|(h, p)| (camera.depth(p.position()), h)));
        }
    }

    pub fn sort_index(&self) -> &[(f32, SlotHandle)] {
        &self.sort_index
    }

    pub fn clear(&mut self) {
        self.list.clear();
        self.sort_index.clear();
    }

    pub fn shrink(&mut self) {
        self.list.shrink();
        self.sort_index = Vec::new();
    }
}

/// 在由远到近的深度序列中找累计错序距离最小的插入位置
fn min_error_position(index: &[(f32, SlotHandle)], depth: f32) -> usize {
    // 插在最前面时，所有更远的元素都排错了
    let mut err: f32 = index.iter().map(|&(d, _)| (d - depth).max(0.0)).sum();
    let mut best = 0;
    let mut best_err = err;
    for (i, &(d, _)) in index.iter().enumerate() {
        err += (depth - d).max(0.0) - (d - depth).max(0.0);
        if err < best_err {
            best_err = err;
            best = i + 1;
        }
    }
    best
}

/// 插入并记录父粒子事件；池满时累加拒绝计数
fn insert_tracked(
    particles: &mut ParticleList,
    events: Option<&mut Vec<ParentEvent>>,
    counts: &mut ParticleCounts,
    particle: Particle,
    policy: &InsertPolicy,
    birth_age: f32,
) -> Option<SlotHandle> {
    let loc = particle.moving.loc;
    let vel = particle.moving.vel;
    let Some(handle) = particles.insert(particle, policy) else {
        counts.particles.reject += 1.0;
        return None;
    };
    if let Some(events) = events {
        events.push(ParentEvent {
            particle: handle,
            trigger: SpawnIndirection::ParentStart,
            age: birth_age,
            loc,
            vel,
        });
    }
    Some(handle)
}

/// 新粒子补算到当前年龄时产生的碰撞或死亡事件
fn backdated_event(particle: &Particle, handle: SlotHandle, trigger: SpawnIndirection, birth: f32) -> ParentEvent {
    let at = match trigger {
        SpawnIndirection::ParentCollide => particle.time.collide_age,
        _ => particle.time.age,
    };
    ParentEvent {
        particle: handle,
        trigger,
        age: birth + at,
        loc: particle.moving.loc,
        vel: particle.moving.vel,
    }
}

/// 粒子容器
#[derive(Debug)]
pub struct ParticleContainer {
    effect: EffectId,
    name: String,
    params: Arc<EffectParams>,
    env_flags: EnvFlags,
    enabled: bool,
    parent: Option<usize>,
    /// 触发间接子发射器的父粒子事件，沿祖先链取第一个设置了触发方式的节点
    trigger: SpawnIndirection,
    children: Vec<usize>,
    particles: ParticleList,
    sub_emitters: SlotList<SubEmitter>,
    deferred: Vec<DeferredEmit>,
    bb_static: Aabb,
    bb_dynamic: Aabb,
    bb_world: Aabb,
    /// 超过此年龄后静态盒单独即可包住粒子
    static_stable_age: f32,
    age: f32,
    last_update_age: Option<f32>,
    parent_emit_cap: f32,
    parent_life_cap: f32,
    events: Vec<ParentEvent>,
    counts: ParticleCounts,
    rng: StdRng,
    seed: u64,
    next_seq: u32,
}

impl ParticleContainer {
    /// `parent` 为父容器下标，只有间接子效果才有
    pub fn new(
        tree: &EffectTree,
        effect: EffectId,
        parent: Option<usize>,
        seed: u64,
        budget: Arc<PoolBudget>,
        allowed: EnvFlags,
    ) -> Self {
        let trigger = std::iter::successors(Some(effect), |&id| tree.parent(id))
            .filter(|&id| tree.is_enabled(id))
            .map(|id| tree.params(id).spawn_indirection)
            .find(|t| *t != SpawnIndirection::None)
            .filter(|_| parent.is_some())
            .unwrap_or_default();
        Self {
            effect,
            name: tree.full_name(effect),
            params: Arc::new(tree.params(effect).clone()),
            env_flags: tree.env_flags(effect) & allowed,
            enabled: tree.is_enabled(effect),
            parent,
            trigger,
            children: Vec::new(),
            particles: ParticleList::with_budget(budget),
            sub_emitters: SlotList::new(),
            deferred: Vec::new(),
            bb_static: Aabb::RESET,
            bb_dynamic: Aabb::RESET,
            bb_world: Aabb::RESET,
            static_stable_age: 0.0,
            age: 0.0,
            last_update_age: None,
            parent_emit_cap: f32::INFINITY,
            parent_life_cap: f32::INFINITY,
            events: Vec::new(),
            counts: ParticleCounts::default(),
            rng: StdRng::seed_from_u64(seed),
            seed,
            next_seq: 0,
        }
    }

    pub fn effect(&self) -> EffectId {
        self.effect
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &EffectParams {
        &self.params
    }

    pub fn env_flags(&self) -> EnvFlags {
        self.env_flags
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_indirect(&self) -> bool {
        self.parent.is_some()
    }

    pub fn parent_index(&self) -> Option<usize> {
        self.parent
    }

    pub fn trigger(&self) -> SpawnIndirection {
        self.trigger
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub(crate) fn add_child(&mut self, child: usize) {
        self.children.push(child);
    }

    pub fn particles(&self) -> &ParticleList {
        &self.particles
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// 存活且可见的粒子，按渲染顺序
    pub fn visible_particles(&self) -> impl Iterator<Item = &Particle> {
        self.particles
            .iter()
            .map(|(_, p)| p)
            .filter(|p| p.is_alive() && !p.is_hidden())
    }

    pub fn sub_emitters(&self) -> &SlotList<SubEmitter> {
        &self.sub_emitters
    }

    pub fn static_bounds(&self) -> &Aabb {
        &self.bb_static
    }

    pub fn dynamic_bounds(&self) -> &Aabb {
        &self.bb_dynamic
    }

    pub fn world_bounds(&self) -> &Aabb {
        &self.bb_world
    }

    pub fn age(&self) -> f32 {
        self.age
    }

    pub fn last_update_age(&self) -> Option<f32> {
        self.last_update_age
    }

    /// 本帧父粒子事件
    pub fn parent_events(&self) -> &[ParentEvent] {
        &self.events
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// 取出本容器累计的统计
    pub fn take_counts(&mut self) -> ParticleCounts {
        self.counts.take()
    }

    /// 动态盒超出世界盒的体积
    pub fn bounds_error(&self) -> f32 {
        self.bb_world.uncontained_volume(&self.bb_dynamic)
    }

    /// 效果参数变化后刷新
    pub fn refresh(&mut self, tree: &EffectTree, allowed: EnvFlags) {
        self.params = Arc::new(tree.params(self.effect).clone());
        self.env_flags = tree.env_flags(self.effect) & allowed;
        self.enabled = tree.is_enabled(self.effect);
        self.bb_static.reset();
        self.static_stable_age = 0.0;
    }

    /// 直接容器启动一个跟随发射器的子发射器
    pub fn start(&mut self, age: f32, loc: Location) {
        if self.parent.is_some() || !self.enabled {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let sub = SubEmitter::new(age, mix_seed(self.seed, u64::from(seq)), seq, loc);
        self.sub_emitters.push_back(sub);
    }

    /// 为父粒子事件创建间接子发射器
    ///
    /// 跟随父粒子的子发射器持有父粒子引用，父粒子死亡后才释放。
    pub fn create_indirect_sub_emitter(&mut self, event: &ParentEvent, parent: &mut ParticleContainer) {
        if !self.enabled {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let mut sub = SubEmitter::new(event.age, mix_seed(self.seed, u64::from(seq)), seq, event.loc);
        sub.set_velocity(event.vel);
        if event.trigger == SpawnIndirection::ParentStart {
            if let Some(pp) = parent.particles.get_mut(event.particle) {
                if pp.is_alive() {
                    pp.ref_count += 1;
                    sub.parent_particle = Some(event.particle);
                    sub.parent_life = Some(pp.time.remaining());
                }
            }
        }
        self.sub_emitters.push_back(sub);
    }

    /// 需要每帧重算动态包围盒
    pub fn needs_dynamic_bounds(&self, ctx: &SimulationContext, env: &PhysicsEnvironment) -> bool {
        if self.env_flags.contains(EnvFlags::EFF_DYNAMIC_BOUNDS) || ctx.config.force_dynamic_bounds {
            return true;
        }
        let phys = self.env_flags & EnvFlags::ENV_PHYS_AREA;
        if phys.is_empty() {
            return false;
        }
        if self.bb_world.is_reset() {
            env.area_flags().intersects(phys)
        } else {
            env.is_non_uniform(&self.bb_world, phys)
        }
    }

    /// 作废静态包围盒；动态包围盒的容器不受影响，返回是否作废
    pub fn invalidate_static_bounds(&mut self) -> bool {
        if self.env_flags.contains(EnvFlags::EFF_DYNAMIC_BOUNDS) {
            return false;
        }
        self.bb_static.reset();
        self.static_stable_age = 0.0;
        true
    }

    /// 读取父容器的寿命上限
    pub fn update_parent_life(&mut self, parent: &ParticleContainer) {
        self.parent_emit_cap = parent.get_emitter_life();
        self.parent_life_cap = parent.get_container_life();
    }

    /// 决定本帧的包围盒策略
    pub fn update_state(
        &mut self,
        ctx: &SimulationContext,
        frame: &EmitterFrame<'_>,
        parent: Option<&mut ParticleContainer>,
    ) {
        self.age = frame.age;
        if let Some(p) = parent.as_deref() {
            self.update_parent_life(p);
        }
        if !self.enabled {
            self.bb_world.reset();
            return;
        }
        self.update_sub_emitter_states(ctx, frame);

        if self.needs_dynamic_bounds(ctx, frame.env) || !self.deferred.is_empty() {
            self.update_particles(ctx, frame, parent);
            self.bb_world = self.bb_dynamic;
        } else {
            if self.bb_static.is_reset() {
                self.compute_static_bounds(frame, parent.as_deref());
            }
            self.bb_world = self.bb_static;
            if self.age < self.static_stable_age {
                self.bb_world.add_box(&self.bb_dynamic);
            }
        }
    }

    fn update_sub_emitter_states(&mut self, ctx: &SimulationContext, frame: &EmitterFrame<'_>) {
        let params = Arc::clone(&self.params);
        let audio = self.env_flags.contains(EnvFlags::EFF_AUDIO) && frame.spawn.enable_sound;
        let name = &self.name;
        let age = self.age;
        for h in self.sub_emitters.handles() {
            let Some(sub) = self.sub_emitters.get_mut(h) else {
                continue;
            };
            let location = *sub.location();
            sub.update_state(age, &params, frame.spawn, &mut |event| {
                if !audio {
                    return;
                }
                let (trigger, start) = match event {
                    SubEmitterEvent::Started => (&params.start_trigger, true),
                    SubEmitterEvent::Stopped => (&params.stop_trigger, false),
                };
                if !trigger.is_empty() {
                    ctx.events.audio_trigger(&AudioTrigger {
                        emitter: frame.id,
                        effect: name.clone(),
                        trigger: trigger.clone(),
                        location,
                        start,
                    });
                }
            });
        }
    }

    fn compute_static_bounds(&mut self, frame: &EmitterFrame<'_>, parent: Option<&ParticleContainer>) {
        let params = &self.params;
        let forces = *frame.env.uniform_forces();
        let mut opts = StaticBoundsOpts {
            speed_scale: frame.spawn.speed_scale,
            ..Default::default()
        };
        let mut loc = frame.loc;
        if let Some(parent) = parent {
            let pbb = *parent.world_bounds();
            if pbb.is_reset() {
                // 父容器还没有粒子，下一帧再算
                self.bb_static.reset();
                return;
            }
            loc.translation = pbb.center();
            opts.spawn_size = pbb.size() * 0.5;
            if !params.particle_life_time.is_set() {
                opts.max_life = parent.params().max_particle_life();
            }
        }
        self.bb_static = params.static_bounds(&loc, &forces, &opts);
        self.static_stable_age = self.age + params.max_particle_life().min(opts.max_life);
    }

    /// 本帧的插入策略
    pub fn insert_policy(&self, ctx: &SimulationContext) -> InsertPolicy {
        InsertPolicy {
            sort_quality: if self.env_flags.contains(EnvFlags::REN_SORT) {
                ctx.config.sort_quality
            } else {
                0
            },
            camera: ctx.camera,
            connected: self.params.connection,
        }
    }

    /// 插入一个已构造好的粒子，池满时返回 `None` 并计入拒绝数
    ///
    /// 不产生父粒子事件；需要子效果时由发射器直接创建间接子发射器。
    pub fn add_particle(&mut self, ctx: &SimulationContext, particle: Particle) -> Option<SlotHandle> {
        let policy = self.insert_policy(ctx);
        insert_tracked(&mut self.particles, None, &mut self.counts, particle, &policy, self.age)
    }

    /// 请求在下次更新时发射一个粒子
    pub fn emit_particle(&mut self, loc: Location, vel: Vec3) {
        self.deferred.push(DeferredEmit { loc, vel });
    }

    /// 密度补偿系数
    fn density_adjust(&self, ctx: &SimulationContext, frame: &EmitterFrame<'_>, forces: &PhysForces) -> f32 {
        let params = &self.params;
        if params.maintain_density <= 0.0 || self.is_indirect() {
            return 1.0;
        }
        let to_local = frame.loc.rotation.inverse();
        let scale = frame.loc.scale.max(f32::EPSILON);
        let drag = params.air_resistance.max_value();
        let standard = ForceParams {
            accel: params.acceleration,
            wind: Vec3::ZERO,
            drag,
            stretch: 0.0,
        };
        let local = ForceParams {
            accel: to_local * (forces.accel * params.gravity_scale.max_value()) / scale + params.acceleration,
            wind: to_local * (forces.wind * params.wind_scale) / scale,
            drag,
            stretch: 0.0,
        };
        let local_vel = to_local * frame.vel / scale;
        let adjust = params.compute_density_increase(
            &standard,
            &local,
            local_vel,
            &StaticBoundsOpts::default(),
            ctx.config.max_density_adjust,
        );
        1.0 + (adjust - 1.0) * params.maintain_density.min(1.0)
    }

    /// 更新全部粒子并发射新粒子；同一年龄只执行一次
    ///
    /// 父容器必须已在本帧更新过：子容器读取它的粒子事件和位置。
    pub fn update_particles(
        &mut self,
        ctx: &SimulationContext,
        frame: &EmitterFrame<'_>,
        mut parent: Option<&mut ParticleContainer>,
    ) {
        let age = frame.age;
        self.age = age;
        if !self.enabled || self.last_update_age == Some(age) {
            return;
        }
        let dt = self.last_update_age.map_or(0.0, |last| (age - last).max(0.0));
        self.last_update_age = Some(age);
        self.events.clear();

        let params = Arc::clone(&self.params);
        let flags = self.env_flags;
        let world: &dyn PhysicsWorld = ctx.world.as_ref();

        let sample_box = if self.bb_world.is_reset() {
            Aabb::from_point(frame.loc.translation)
        } else {
            self.bb_world
        };
        let (forces, uniform) = frame.env.get_forces_box(&sample_box, flags, Some(world));
        let field = if uniform {
            ForceField::Uniform(forces)
        } else {
            ForceField::Field { env: frame.env, flags }
        };
        let upd = ParticleUpdateContext {
            params: &params,
            forces: field,
            world,
            scale: frame.loc.scale,
            collide_flags: flags & EnvFlags::ENV_COLLIDE_ANY,
            space_loop: params
                .space_loop
                .then(|| params.emit_offset_bounds().transformed(&frame.loc)),
        };
        let record = !self.children.is_empty();

        // 推进已有粒子
        let mut collided = 0u32;
        for h in self.particles.list.handles() {
            let Some(p) = self.particles.list.get_mut(h) else {
                continue;
            };
            let was_alive = p.is_alive();
            let out = p.update(&upd, dt, &mut self.rng);
            if out.collided.is_some() {
                collided += 1;
                if record {
                    self.events.push(ParentEvent {
                        particle: h,
                        trigger: SpawnIndirection::ParentCollide,
                        age: age - (p.time.age - p.time.collide_age),
                        loc: p.moving.loc,
                        vel: p.moving.vel,
                    });
                }
            }
            if record && was_alive && !p.is_alive() {
                self.events.push(ParentEvent {
                    particle: h,
                    trigger: SpawnIndirection::ParentDeath,
                    age,
                    loc: p.moving.loc,
                    vel: p.moving.vel,
                });
            }
            let removable = p.is_removable();
            if !removable && !p.is_alive() {
                p.set_hidden(true);
            }
            if removable {
                self.particles.list.remove(h);
            }
        }
        self.counts.particles.collide += collided as f32;

        // 新粒子按移动后的深度插入
        let policy = self.insert_policy(ctx);
        let sort_camera = ctx.camera.filter(|_| policy.sort_quality > 0 && !policy.connected);
        self.particles.rebuild_sort_index(sort_camera.as_ref());

        // 子发射器跟随发射源
        match parent.as_deref_mut() {
            Some(parent) => {
                let trigger = self.trigger;
                let new_events: Vec<ParentEvent> = parent
                    .parent_events()
                    .iter()
                    .filter(|e| e.trigger == trigger)
                    .copied()
                    .collect();
                for event in &new_events {
                    self.create_indirect_sub_emitter(event, parent);
                }
                self.follow_parent_particles(parent);
            }
            None => {
                for h in self.sub_emitters.handles() {
                    if let Some(sub) = self.sub_emitters.get_mut(h) {
                        sub.move_to(frame.loc, age);
                        sub.set_velocity(frame.vel);
                    }
                }
            }
        }

        // 发射：先执行延迟请求，再执行常规发射
        for request in std::mem::take(&mut self.deferred) {
            let life = if params.particle_life_time.is_set() {
                params.particle_life_time.sample(&mut self.rng)
            } else {
                f32::INFINITY
            };
            let attrs = sample_attrs(&params, frame.spawn.size_scale, 0, 0, &mut self.rng);
            let particle = Particle::new(request.loc, request.vel, life, attrs, &params);
            let events = record.then_some(&mut self.events);
            insert_tracked(&mut self.particles, events, &mut self.counts, particle, &policy, age);
        }

        let density = self.density_adjust(ctx, frame, &forces);
        let camera_pos = ctx.camera.map(|c| c.position);
        for h in self.sub_emitters.handles() {
            let Some(sub) = self.sub_emitters.get_mut(h) else {
                continue;
            };
            let ectx = EmitContext {
                age,
                params: &params,
                spawn: frame.spawn,
                emitter_vel: sub.velocity(),
                forces: &forces,
                camera_pos,
                density,
                parent_life: sub.parent_life,
            };
            let particles = &mut self.particles;
            let events = &mut self.events;
            let counts = &mut self.counts;
            let rng = &mut self.rng;
            sub.emit_particles(&ectx, &mut |mut particle, past| {
                particle.emitter = Some(h);
                let birth = age - past;
                let mut hit = false;
                if past > 0.0 {
                    hit = particle.update(&upd, past, &mut *rng).collided.is_some();
                    if !particle.is_alive() {
                        // 补算期间死亡的粒子不入列，事件不带有效句柄
                        if record {
                            let none = SlotHandle::default();
                            if hit {
                                events.push(backdated_event(&particle, none, SpawnIndirection::ParentCollide, birth));
                            }
                            events.push(backdated_event(&particle, none, SpawnIndirection::ParentDeath, birth));
                        }
                        return true;
                    }
                }
                let collide = hit
                    .then(|| backdated_event(&particle, SlotHandle::default(), SpawnIndirection::ParentCollide, birth));
                let tracked = record.then_some(&mut *events);
                match insert_tracked(&mut *particles, tracked, &mut *counts, particle, &policy, birth) {
                    Some(handle) => {
                        if let (true, Some(event)) = (record, collide) {
                            events.push(ParentEvent { particle: handle, ..event });
                        }
                        true
                    }
                    None => false,
                }
            });
        }

        self.remove_expired_sub_emitters(world, parent);

        // 动态包围盒与统计
        self.bb_dynamic.reset();
        let mut alive = 0usize;
        for (_, p) in self.particles.list.iter() {
            if p.is_alive() && !p.is_hidden() {
                p.add_bounds(&mut self.bb_dynamic);
                alive += 1;
            }
        }
        let active_subs = self
            .sub_emitters
            .iter()
            .filter(|(_, s)| s.is_active(age))
            .count();
        self.counts.particles.alive += alive as f32;
        self.counts.particles.updated += self.particles.len() as f32;
        self.counts.particles.alloc += self.particles.list.capacity() as f32;
        self.counts.sub_emitters.alive += active_subs as f32;
        self.counts.sub_emitters.updated += self.sub_emitters.len() as f32;
        self.counts.components.updated += 1.0;
    }

    /// 跟随父粒子；父粒子死亡后停止发射并释放引用
    fn follow_parent_particles(&mut self, parent: &mut ParticleContainer) {
        let age = self.age;
        for h in self.sub_emitters.handles() {
            let Some(sub) = self.sub_emitters.get_mut(h) else {
                continue;
            };
            let Some(ph) = sub.parent_particle else {
                continue;
            };
            match parent.particles.get_mut(ph) {
                Some(pp) if pp.is_alive() => {
                    sub.move_to(pp.moving.loc, age);
                    sub.set_velocity(pp.moving.vel);
                    sub.parent_life = Some(pp.time.remaining());
                }
                other => {
                    if let Some(pp) = other {
                        pp.ref_count = pp.ref_count.saturating_sub(1);
                    }
                    sub.kill(age);
                    sub.parent_particle = None;
                }
            }
        }
    }

    fn remove_expired_sub_emitters(
        &mut self,
        world: &dyn PhysicsWorld,
        mut parent: Option<&mut ParticleContainer>,
    ) {
        for h in self.sub_emitters.handles() {
            let expired = self
                .sub_emitters
                .get(h)
                .is_some_and(|s| s.state() == SubEmitterState::Expired);
            if !expired {
                continue;
            }
            if let Some(mut sub) = self.sub_emitters.remove(h) {
                if let (Some(ph), Some(parent)) = (sub.parent_particle, parent.as_deref_mut()) {
                    if let Some(pp) = parent.particles.get_mut(ph) {
                        pp.ref_count = pp.ref_count.saturating_sub(1);
                    }
                }
                sub.release_force(world);
            }
        }
    }

    /// 维护力场代理
    pub fn update_effects(&mut self, ctx: &SimulationContext) {
        if !self.env_flags.contains(EnvFlags::EFF_FORCE) {
            return;
        }
        let (sum, n) = self
            .visible_particles()
            .fold((Vec3::ZERO, 0usize), |(s, n), p| (s + p.velocity(), n + 1));
        let avg = if n > 0 { sum / n as f32 } else { Vec3::ZERO };
        let bounds = self.bb_dynamic;
        let world = ctx.world.as_ref();
        let params = Arc::clone(&self.params);
        for h in self.sub_emitters.handles() {
            if let Some(sub) = self.sub_emitters.get_mut(h) {
                sub.update_force(world, &params, &bounds, avg, n);
            }
        }
    }

    /// 停止全部子发射器，已有粒子自然消亡
    pub fn kill(&mut self, age: f32) {
        for h in self.sub_emitters.handles() {
            if let Some(sub) = self.sub_emitters.get_mut(h) {
                sub.kill(age);
            }
        }
    }

    /// 清空粒子和子发射器，释放对父粒子的引用
    pub fn reset(&mut self, world: &dyn PhysicsWorld, mut parent: Option<&mut ParticleContainer>) {
        for h in self.sub_emitters.handles() {
            if let Some(mut sub) = self.sub_emitters.remove(h) {
                if let (Some(ph), Some(parent)) = (sub.parent_particle, parent.as_deref_mut()) {
                    if let Some(pp) = parent.particles.get_mut(ph) {
                        pp.ref_count = pp.ref_count.saturating_sub(1);
                    }
                }
                sub.release_force(world);
            }
        }
        self.particles.clear();
        self.deferred.clear();
        self.events.clear();
        self.bb_static.reset();
        self.bb_dynamic.reset();
        self.bb_world.reset();
        self.static_stable_age = 0.0;
        self.last_update_age = None;
    }

    /// 不可见时释放粒子内存，直接子发射器保留计时
    pub fn release_memory(&mut self, world: &dyn PhysicsWorld, mut parent: Option<&mut ParticleContainer>) {
        // 间接子发射器跟随的父粒子随之释放
        let handles = if self.is_indirect() {
            self.sub_emitters.handles()
        } else {
            Vec::new()
        };
        for h in handles {
            if let Some(mut sub) = self.sub_emitters.remove(h) {
                if let (Some(ph), Some(parent)) = (sub.parent_particle, parent.as_deref_mut()) {
                    if let Some(pp) = parent.particles.get_mut(ph) {
                        pp.ref_count = pp.ref_count.saturating_sub(1);
                    }
                }
                sub.release_force(world);
            }
        }
        self.particles.shrink();
        self.events.clear();
        self.bb_dynamic.reset();
    }

    /// 可能同时存活的最多粒子数
    ///
    /// 没有发射数量或没有寿命（且不继承父粒子寿命）时不会增长，返回现有数量。
    pub fn get_max_particle_count(&self, spawn: &SpawnParams) -> usize {
        let params = &self.params;
        let existing = self.particles.len();
        let life_known = params.particle_life_time.is_set() || self.is_indirect();
        if !self.enabled || !params.count.is_set() || !life_known {
            return existing;
        }
        let mut count = params.count.max_value() * spawn.count_scale;
        if spawn.strength >= 0.0 {
            count *= spawn.strength;
        }
        if params.pulse_period.is_set() {
            // 多个脉冲周期的粒子同时存活
            let overlap = (params.max_particle_life() / params.pulse_period.min_value().max(0.1)).ceil();
            if overlap.is_finite() {
                count *= overlap.max(1.0);
            }
        }
        let emitters = self.sub_emitters.len().max(1) as f32;
        let max = (count * emitters).ceil() as usize;
        max.max(existing)
    }

    /// 最后一个粒子的出生年龄上限
    ///
    /// 间接容器不超过父容器寿命。
    pub fn get_emitter_life(&self) -> f32 {
        if !self.enabled {
            return 0.0;
        }
        let params = &self.params;
        let pulsing = params.pulse_period.is_set();
        let own = self
            .sub_emitters
            .iter()
            .map(|(_, s)| match s.state() {
                SubEmitterState::Uninitialized if pulsing => f32::INFINITY,
                SubEmitterState::Uninitialized => s.trigger_age() + params.max_emitter_life(),
                SubEmitterState::Active if s.stop_age().is_infinite() => f32::INFINITY,
                _ => s.emit_stop_age(),
            })
            .fold(f32::NEG_INFINITY, f32::max);

        if !self.is_indirect() {
            return own.max(0.0);
        }
        let child_life = if pulsing {
            f32::INFINITY
        } else {
            params.max_emitter_life()
        };
        let potential = match self.trigger {
            SpawnIndirection::ParentStart => self.parent_emit_cap + child_life,
            _ => self.parent_life_cap + child_life,
        };
        own.max(potential).min(self.parent_life_cap)
    }

    /// 最后一个粒子的死亡年龄上限
    pub fn get_container_life(&self) -> f32 {
        if !self.enabled {
            return 0.0;
        }
        let params = &self.params;
        let inherits = !params.particle_life_time.is_set() && !params.remain_while_visible;
        let particle_life = if !inherits {
            params.max_particle_life()
        } else if self.is_indirect() || params.continuous {
            0.0
        } else {
            f32::INFINITY
        };
        let existing = self
            .particles
            .iter()
            .filter(|(_, p)| p.is_alive())
            .map(|(_, p)| self.age + p.time.remaining())
            .fold(f32::NEG_INFINITY, f32::max);
        let mut life = (self.get_emitter_life() + particle_life).max(existing);
        if self.is_indirect() && inherits {
            life = life.min(self.parent_life_cap);
        }
        life
    }
}
