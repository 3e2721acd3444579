//! 粒子发射器
//!
//! 每次生成请求对应一个发射器。它按效果树建立容器数组（下标与效果节点
//! 一一对应，父节点总在子节点之前），汇总包围盒与寿命，并提供后台更新
//! 任务的主体 [`ParticleEmitter::update_particles`]。
//!
//! 状态由年龄决定：
//!
//! - `Starting`：年龄为负（延迟未到）
//! - `Active`：年龄不超过死亡年龄
//! - `Dormant`：仍存活但上一帧没有被渲染
//! - `Dead`：超过死亡年龄，等待管理器删除

use super::arena::SlotHandle;
use super::container::{EmitterFrame, ParentEvent, ParticleContainer};
use super::context::SimulationContext;
use super::particle::Particle;
use super::stats::ParticleCounts;
use crate::core::utils::{current_timestamp_nanos, mix_seed};
use crate::effect::{EffectId, EffectTree, EnvFlags, SpawnIndirection};
use crate::impl_default;
use crate::math::{Aabb, Location};
use crate::physics::PhysicsEnvironment;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 生成参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnParams {
    /// 发射数量倍数
    pub count_scale: f32,
    pub size_scale: f32,
    pub speed_scale: f32,
    /// 时间流速倍数
    pub time_scale: f32,
    /// 外部强度，`>= 0` 时再乘到发射数量上，负值表示不使用
    pub strength: f32,
    /// 生成延迟（秒）
    pub delay: f32,
    /// 直接从稳定状态开始
    pub prime: bool,
    pub enable_sound: bool,
    /// 随机种子，`None` 时取当前时间
    pub seed: Option<u64>,
}

impl_default!(SpawnParams {
    count_scale: 1.0,
    size_scale: 1.0,
    speed_scale: 1.0,
    time_scale: 1.0,
    strength: -1.0,
    delay: 0.0,
    prime: false,
    enable_sound: true,
    seed: None,
});

/// 发射器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    Starting,
    Active,
    Dormant,
    Dead,
}

/// 粒子发射器
#[derive(Debug)]
pub struct ParticleEmitter {
    id: u64,
    tree: Arc<EffectTree>,
    spawn: SpawnParams,
    seed: u64,
    allowed: EnvFlags,
    containers: Vec<ParticleContainer>,
    loc: Location,
    prev_loc: Location,
    vel: Vec3,
    age: f32,
    death_age: f32,
    time_not_rendered: f32,
    rendered: bool,
    killed: bool,
    bb_world: Aabb,
    env_flags: EnvFlags,
    /// 与包围盒相交的物理区域子集
    phys_env: PhysicsEnvironment,
    counts: ParticleCounts,
}

impl ParticleEmitter {
    pub fn new(id: u64, tree: Arc<EffectTree>, loc: Location, spawn: SpawnParams, ctx: &SimulationContext) -> Self {
        let seed = spawn
            .seed
            .unwrap_or_else(|| mix_seed(current_timestamp_nanos() as u64, id));
        let allowed = ctx.config.allowed_env_flags();
        let mut emitter = Self {
            id,
            containers: Vec::new(),
            loc,
            prev_loc: loc,
            vel: Vec3::ZERO,
            age: -spawn.delay.max(0.0),
            death_age: 0.0,
            time_not_rendered: 0.0,
            rendered: false,
            killed: false,
            bb_world: Aabb::RESET,
            env_flags: EnvFlags::empty(),
            phys_env: PhysicsEnvironment::uniform(*ctx.phys_env.uniform_forces()),
            counts: ParticleCounts::default(),
            tree,
            spawn,
            seed,
            allowed,
        };
        emitter.build_containers(ctx);
        emitter.start_containers(0.0);
        if emitter.spawn.prime {
            emitter.prime();
        }
        emitter.update_times();
        emitter
    }

    fn build_containers(&mut self, ctx: &SimulationContext) {
        let tree = Arc::clone(&self.tree);
        self.containers = tree
            .ids()
            .map(|id| {
                let parent = tree.indirect_parent(id).map(EffectId::index);
                ParticleContainer::new(
                    &tree,
                    id,
                    parent,
                    mix_seed(self.seed, id.index() as u64),
                    Arc::clone(&ctx.budget),
                    self.allowed,
                )
            })
            .collect();
        for i in 0..self.containers.len() {
            if let Some(p) = self.containers[i].parent_index() {
                self.containers[p].add_child(i);
            }
        }
        self.env_flags = self
            .containers
            .iter()
            .fold(EnvFlags::empty(), |acc, c| acc | c.env_flags());
    }

    fn start_containers(&mut self, age: f32) {
        let loc = self.loc;
        for c in &mut self.containers {
            c.start(age, loc);
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tree(&self) -> &Arc<EffectTree> {
        &self.tree
    }

    pub fn effect_name(&self) -> &str {
        self.tree.root_name()
    }

    pub fn spawn_params(&self) -> &SpawnParams {
        &self.spawn
    }

    pub fn location(&self) -> &Location {
        &self.loc
    }

    pub fn velocity(&self) -> Vec3 {
        self.vel
    }

    pub fn age(&self) -> f32 {
        self.age
    }

    pub fn death_age(&self) -> f32 {
        self.death_age
    }

    pub fn env_flags(&self) -> EnvFlags {
        self.env_flags
    }

    pub fn world_bounds(&self) -> &Aabb {
        &self.bb_world
    }

    pub fn containers(&self) -> &[ParticleContainer] {
        &self.containers
    }

    pub fn container(&self, effect: EffectId) -> Option<&ParticleContainer> {
        self.containers.get(effect.index())
    }

    pub fn particle_count(&self) -> usize {
        self.containers.iter().map(ParticleContainer::particle_count).sum()
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }

    /// 会向物理世界施加力的发射器需先于其他发射器更新
    pub fn generates_force(&self) -> bool {
        self.env_flags.contains(EnvFlags::EFF_FORCE)
    }

    pub fn state(&self) -> EmitterState {
        if self.age < 0.0 && !self.killed {
            EmitterState::Starting
        } else if self.age > self.death_age {
            EmitterState::Dead
        } else if self.time_not_rendered > 0.0 {
            EmitterState::Dormant
        } else {
            EmitterState::Active
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state() != EmitterState::Dead
    }

    /// 移动发射器；静态包围盒随之作废
    pub fn set_location(&mut self, loc: Location) {
        if loc.is_equivalent(&self.loc, 1e-5) {
            return;
        }
        self.loc = loc;
        self.invalidate_static_bounds();
    }

    /// 物理环境或位置变化后重新估算静态包围盒
    pub fn invalidate_static_bounds(&mut self) {
        for c in &mut self.containers {
            c.invalidate_static_bounds();
        }
    }

    /// 渲染路径在发射器可见时调用
    pub fn mark_rendered(&mut self) {
        self.rendered = true;
        self.time_not_rendered = 0.0;
    }

    /// 取出并清除“上一帧已渲染”标记
    pub fn take_rendered(&mut self) -> bool {
        std::mem::take(&mut self.rendered)
    }

    pub fn time_not_rendered(&self) -> f32 {
        self.time_not_rendered
    }

    /// 主线程上的每帧更新：推进年龄、刷新物理环境子集、决定各容器的包围盒策略
    pub fn update(&mut self, ctx: &SimulationContext, rendered_last_frame: bool) {
        let dt = ctx.time.delta * self.spawn.time_scale;
        if !rendered_last_frame {
            self.time_not_rendered += ctx.time.delta;
        }
        if dt > 0.0 {
            self.vel = (self.loc.translation - self.prev_loc.translation) / dt;
        }
        self.prev_loc = self.loc;
        self.age += dt;
        if self.age < 0.0 {
            return;
        }

        let sample_box = if self.bb_world.is_reset() {
            Aabb::from_point(self.loc.translation)
        } else {
            self.bb_world
        };
        self.phys_env = ctx
            .phys_env
            .subset(&sample_box, self.env_flags & EnvFlags::ENV_PHYS_AREA);

        self.update_state(ctx);
        self.update_times();
    }

    /// 容器按父先于子的顺序更新状态
    ///
    /// 需要每帧更新粒子的容器连带其全部间接祖先一起更新粒子；
    /// 更新过的容器的全部后代也随之更新，父粒子事件在产生的同一帧被消费。
    pub fn update_state(&mut self, ctx: &SimulationContext) {
        let n = self.containers.len();
        let mut needs: Vec<bool> = self
            .containers
            .iter()
            .map(|c| c.is_enabled() && (c.deferred_count() > 0 || c.needs_dynamic_bounds(ctx, &self.phys_env)))
            .collect();
        for i in (0..n).rev() {
            if needs[i] {
                if let Some(p) = self.containers[i].parent_index() {
                    needs[p] = true;
                }
            }
        }
        // 树序保证父先于子，一次正向遍历即可覆盖整棵子树
        for i in 0..n {
            if let Some(p) = self.containers[i].parent_index() {
                if needs[p] && self.containers[i].is_enabled() {
                    needs[i] = true;
                }
            }
        }

        let frame = EmitterFrame {
            id: self.id,
            age: self.age,
            loc: self.loc,
            vel: self.vel,
            spawn: &self.spawn,
            env: &self.phys_env,
        };
        for (i, need) in needs.into_iter().enumerate() {
            let (head, tail) = self.containers.split_at_mut(i);
            let container = &mut tail[0];
            let mut parent = container.parent_index().map(|p| &mut head[p]);
            if need {
                container.update_particles(ctx, &frame, parent.as_deref_mut());
            }
            container.update_state(ctx, &frame, parent);
        }

        self.bb_world.reset();
        for c in &self.containers {
            self.bb_world.add_box(c.world_bounds());
        }
    }

    /// 后台任务主体：按父先于子的顺序更新全部容器的粒子，然后维护力场代理
    pub fn update_particles(&mut self, ctx: &SimulationContext) {
        if self.age < 0.0 {
            return;
        }
        let frame = EmitterFrame {
            id: self.id,
            age: self.age,
            loc: self.loc,
            vel: self.vel,
            spawn: &self.spawn,
            env: &self.phys_env,
        };
        for i in 0..self.containers.len() {
            let (head, tail) = self.containers.split_at_mut(i);
            let container = &mut tail[0];
            let parent = container.parent_index().map(|p| &mut head[p]);
            container.update_particles(ctx, &frame, parent);
            container.update_effects(ctx);
        }
    }

    /// 重新计算死亡年龄：全部容器寿命的最大值
    pub fn update_times(&mut self) {
        for i in 0..self.containers.len() {
            let (head, tail) = self.containers.split_at_mut(i);
            if let Some(p) = tail[0].parent_index() {
                tail[0].update_parent_life(&head[p]);
            }
        }
        self.death_age = self
            .containers
            .iter()
            .filter(|c| c.is_enabled())
            .map(ParticleContainer::get_container_life)
            .fold(0.0, f32::max);
    }

    /// 长时间不可见时释放粒子内存；需要动态包围盒的容器保留
    pub fn reset_unseen(&mut self, ctx: &SimulationContext) -> bool {
        if self.time_not_rendered <= ctx.config.unseen_reset_timeout {
            return false;
        }
        let world = ctx.world.as_ref();
        let mut released = 0usize;
        for i in 0..self.containers.len() {
            if self.containers[i].needs_dynamic_bounds(ctx, &self.phys_env)
                || self.containers[i].particle_count() == 0
            {
                continue;
            }
            let (head, tail) = self.containers.split_at_mut(i);
            let parent = tail[0].parent_index().map(|p| &mut head[p]);
            tail[0].release_memory(world, parent);
            released += 1;
        }
        if released > 0 {
            tracing::debug!(
                target: "particles",
                emitter = self.id,
                containers = released,
                "released memory of unseen emitter"
            );
        }
        released > 0
    }

    /// 为 `parent` 容器的父粒子事件在匹配的子容器中创建间接子发射器
    pub fn create_indirect_emitters(&mut self, parent: usize, event: &ParentEvent) -> usize {
        let children: Vec<usize> = match self.containers.get(parent) {
            Some(c) => c.children().to_vec(),
            None => return 0,
        };
        let mut created = 0;
        for child in children {
            if child <= parent || self.containers[child].trigger() != event.trigger {
                continue;
            }
            let (head, tail) = self.containers.split_at_mut(child);
            let before = tail[0].sub_emitters().len();
            tail[0].create_indirect_sub_emitter(event, &mut head[parent]);
            created += tail[0].sub_emitters().len() - before;
        }
        created
    }

    /// 直接插入一个粒子，并为其启动出生触发的子效果
    pub fn add_particle(
        &mut self,
        ctx: &SimulationContext,
        effect: EffectId,
        particle: Particle,
    ) -> Option<SlotHandle> {
        let index = effect.index();
        let loc = particle.moving.loc;
        let vel = particle.moving.vel;
        let age = self.age;
        let handle = self.containers.get_mut(index)?.add_particle(ctx, particle)?;
        let event = ParentEvent {
            particle: handle,
            trigger: SpawnIndirection::ParentStart,
            age,
            loc,
            vel,
        };
        self.create_indirect_emitters(index, &event);
        Some(handle)
    }

    /// 请求下次更新时在 `effect` 容器发射一个粒子
    pub fn emit_particle(&mut self, effect: EffectId, loc: Location, vel: Vec3) -> bool {
        match self.containers.get_mut(effect.index()) {
            Some(c) if c.is_enabled() => {
                c.emit_particle(loc, vel);
                true
            }
            _ => false,
        }
    }

    /// 直接跳到稳定状态
    pub fn prime(&mut self) {
        let eq = self.tree.equilibrium_age(EffectId::ROOT, true);
        if eq.is_finite() && eq > self.age {
            self.age = eq;
        }
    }

    /// 停止发射，已有粒子自然消亡
    pub fn kill(&mut self) {
        if self.killed {
            return;
        }
        self.killed = true;
        let age = self.age.max(0.0);
        self.age = age;
        for c in &mut self.containers {
            c.kill(age);
        }
        self.update_times();
    }

    /// 清空并从头开始
    pub fn restart(&mut self, ctx: &SimulationContext) {
        let world = ctx.world.as_ref();
        for i in (0..self.containers.len()).rev() {
            let (head, tail) = self.containers.split_at_mut(i);
            let parent = tail[0].parent_index().map(|p| &mut head[p]);
            tail[0].reset(world, parent);
        }
        self.killed = false;
        self.age = -self.spawn.delay.max(0.0);
        self.time_not_rendered = 0.0;
        self.bb_world.reset();
        self.start_containers(0.0);
        if self.spawn.prime {
            self.prime();
        }
        self.update_times();
    }

    /// 效果参数变化后刷新；树结构变化时重建全部容器
    pub fn refresh_effect(&mut self, tree: Arc<EffectTree>, ctx: &SimulationContext) {
        let same_shape = tree.len() == self.containers.len()
            && tree
                .ids()
                .all(|id| tree.indirect_parent(id).map(EffectId::index) == self.containers[id.index()].parent_index());
        self.tree = tree;
        self.allowed = ctx.config.allowed_env_flags();
        if same_shape {
            let tree = Arc::clone(&self.tree);
            for c in &mut self.containers {
                c.refresh(&tree, self.allowed);
            }
            self.env_flags = self
                .containers
                .iter()
                .fold(EnvFlags::empty(), |acc, c| acc | c.env_flags());
        } else {
            let world = ctx.world.as_ref();
            for i in (0..self.containers.len()).rev() {
                let (head, tail) = self.containers.split_at_mut(i);
                let parent = tail[0].parent_index().map(|p| &mut head[p]);
                tail[0].reset(world, parent);
            }
            self.build_containers(ctx);
            self.start_containers(self.age.max(0.0));
        }
        self.update_times();
    }

    /// 释放全部粒子与力场代理
    pub fn release(&mut self, ctx: &SimulationContext) {
        let world = ctx.world.as_ref();
        for i in (0..self.containers.len()).rev() {
            let (head, tail) = self.containers.split_at_mut(i);
            let parent = tail[0].parent_index().map(|p| &mut head[p]);
            tail[0].reset(world, parent);
        }
    }

    /// 取出本帧统计，附带包围盒体积与误差
    pub fn take_counts(&mut self) -> ParticleCounts {
        let mut counts = self.counts.take();
        counts.emitters.alloc += 1.0;
        if self.is_alive() {
            counts.emitters.alive += 1.0;
        }
        counts.emitters.updated += 1.0;
        for c in &mut self.containers {
            counts.components.alloc += 1.0;
            if c.is_enabled() {
                counts.components.alive += 1.0;
            }
            counts.volume.stat += c.static_bounds().volume();
            counts.volume.dyn_ += c.dynamic_bounds().volume();
            let error = c.bounds_error();
            if error > 0.0 {
                counts.volume.error += error;
                counts.bounds_errors += 1.0;
            }
            counts += c.take_counts();
        }
        counts
    }

    /// 渲染侧累加可见与剔除统计
    pub fn add_render_counts(&mut self, rendered: usize, clipped: usize) {
        self.counts.particles.rendered += rendered as f32;
        self.counts.particles.clip += clipped as f32;
        self.counts.emitters.rendered += 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParticleConfig;
    use crate::effect::{EffectParams, PhysicsType, VarParam};
    use crate::physics::StaticPhysicsWorld;

    fn context() -> SimulationContext {
        SimulationContext::new(
            Arc::new(StaticPhysicsWorld::default()),
            Arc::new(ParticleConfig::default()),
        )
    }

    fn fountain() -> Arc<EffectTree> {
        Arc::new(EffectTree::new(
            "fountain",
            EffectParams {
                count: VarParam::fixed(10.0),
                continuous: true,
                particle_life_time: VarParam::fixed(2.0),
                speed: VarParam::fixed(1.0),
                emitter_life_time: VarParam::fixed(3.0),
                ..Default::default()
            },
        ))
    }

    fn seeded() -> SpawnParams {
        SpawnParams {
            seed: Some(7),
            ..Default::default()
        }
    }

    fn step(emitter: &mut ParticleEmitter, ctx: &mut SimulationContext, dt: f32) {
        ctx.advance(dt);
        emitter.update(ctx, true);
        emitter.update_particles(ctx);
        emitter.mark_rendered();
    }

    #[test]
    fn test_states_over_lifetime() {
        let mut ctx = context();
        let spawn = SpawnParams {
            delay: 0.5,
            ..seeded()
        };
        let mut e = ParticleEmitter::new(1, fountain(), Location::IDENTITY, spawn, &ctx);
        assert_eq!(e.state(), EmitterState::Starting);
        assert_eq!(e.age(), -0.5);

        step(&mut e, &mut ctx, 1.0);
        assert_eq!(e.state(), EmitterState::Active);
        // 发射 3 秒，粒子再活 2 秒
        assert_eq!(e.death_age(), 5.0);

        for _ in 0..6 {
            step(&mut e, &mut ctx, 1.0);
        }
        assert_eq!(e.state(), EmitterState::Dead);
    }

    #[test]
    fn test_kill_shortens_death_age() {
        let mut ctx = context();
        let mut e = ParticleEmitter::new(1, fountain(), Location::IDENTITY, seeded(), &ctx);
        step(&mut e, &mut ctx, 1.0);
        assert!(e.particle_count() > 0);

        e.kill();
        assert!(e.is_killed());
        assert!(e.death_age() <= 1.0 + 2.0 + 1e-4);
        for _ in 0..4 {
            step(&mut e, &mut ctx, 1.0);
        }
        assert!(!e.is_alive());
        assert_eq!(e.particle_count(), 0);
    }

    #[test]
    fn test_dormant_when_not_rendered() {
        let mut ctx = context();
        let mut e = ParticleEmitter::new(1, fountain(), Location::IDENTITY, seeded(), &ctx);
        ctx.advance(0.5);
        e.update(&ctx, false);
        assert_eq!(e.state(), EmitterState::Dormant);
        e.mark_rendered();
        assert_eq!(e.state(), EmitterState::Active);
        assert!(e.take_rendered());
        assert!(!e.take_rendered());
    }

    #[test]
    fn test_move_invalidates_static_bounds() {
        let mut ctx = context();
        let mut e = ParticleEmitter::new(1, fountain(), Location::IDENTITY, seeded(), &ctx);
        step(&mut e, &mut ctx, 0.5);
        let before = *e.world_bounds();
        assert!(!before.is_reset());

        e.set_location(Location::from_translation(Vec3::new(100.0, 0.0, 0.0)));
        assert!(e.container(EffectId::ROOT).is_some_and(|c| c.static_bounds().is_reset()));
        step(&mut e, &mut ctx, 0.5);
        assert!(e.world_bounds().contains_point(Vec3::new(100.0, 0.0, 0.0)));
        assert!(e.velocity().x > 0.0);
    }

    #[test]
    fn test_restart_and_prime() {
        let mut ctx = context();
        let tree = Arc::new(EffectTree::new(
            "smoke",
            EffectParams {
                count: VarParam::fixed(10.0),
                continuous: true,
                particle_life_time: VarParam::fixed(2.0),
                ..Default::default()
            },
        ));
        let spawn = SpawnParams {
            prime: true,
            ..seeded()
        };
        let mut e = ParticleEmitter::new(1, tree, Location::IDENTITY, spawn, &ctx);
        assert_eq!(e.age(), 2.0);
        step(&mut e, &mut ctx, 0.1);
        let primed = e.particle_count();
        assert!(primed >= 9, "primed emitter has {} particles", primed);

        e.restart(&ctx);
        assert_eq!(e.particle_count(), 0);
        assert_eq!(e.age(), 2.0);
    }

    #[test]
    fn test_emit_particle_and_indirect_children() {
        let mut ctx = context();
        let mut tree = EffectTree::new("manual", EffectParams {
            particle_life_time: VarParam::fixed(1.0),
            ..Default::default()
        });
        let child = tree.add_child(EffectId::ROOT, "sparks", EffectParams {
            count: VarParam::fixed(4.0),
            particle_life_time: VarParam::fixed(0.5),
            spawn_indirection: SpawnIndirection::ParentStart,
            ..Default::default()
        });
        let mut e = ParticleEmitter::new(1, Arc::new(tree), Location::IDENTITY, seeded(), &ctx);

        assert!(e.emit_particle(EffectId::ROOT, Location::IDENTITY, Vec3::X));
        step(&mut e, &mut ctx, 0.1);
        assert_eq!(e.container(EffectId::ROOT).map(|c| c.particle_count()), Some(1));
        assert_eq!(e.container(child).map(|c| c.sub_emitters().len()), Some(1));
        step(&mut e, &mut ctx, 0.1);
        assert_eq!(e.container(child).map(|c| c.particle_count()), Some(4));
    }

    #[test]
    fn test_reset_unseen_releases_after_timeout() {
        let config = ParticleConfig {
            unseen_reset_timeout: 0.5,
            ..Default::default()
        };
        let mut ctx = SimulationContext::new(Arc::new(StaticPhysicsWorld::default()), Arc::new(config));
        let mut e = ParticleEmitter::new(1, fountain(), Location::IDENTITY, seeded(), &ctx);
        step(&mut e, &mut ctx, 0.5);
        assert!(e.particle_count() > 0);

        ctx.advance(0.3);
        e.update(&ctx, false);
        assert!(!e.reset_unseen(&ctx));
        assert!(e.particle_count() > 0);

        ctx.advance(0.3);
        e.update(&ctx, false);
        assert!(e.reset_unseen(&ctx));
        assert_eq!(e.particle_count(), 0);
        assert_eq!(ctx.budget.used(), 0);
        // 已释放，不再重复释放
        assert!(!e.reset_unseen(&ctx));
    }

    #[test]
    fn test_unrendered_frames_keep_indirect_spawns() {
        let mut ctx = context();
        let mut tree = EffectTree::new("sparks", EffectParams {
            count: VarParam::fixed(10.0),
            continuous: true,
            particle_life_time: VarParam::fixed(2.0),
            speed: VarParam::fixed(1.0),
            physics_type: PhysicsType::SimpleCollision,
            collide_terrain: true,
            ..Default::default()
        });
        let child = tree.add_child(EffectId::ROOT, "glow", EffectParams {
            count: VarParam::fixed(2.0),
            continuous: true,
            particle_life_time: VarParam::fixed(0.5),
            emitter_life_time: VarParam::fixed(10.0),
            spawn_indirection: SpawnIndirection::ParentStart,
            ..Default::default()
        });
        let mut e = ParticleEmitter::new(1, Arc::new(tree), Location::IDENTITY, seeded(), &ctx);

        // 不渲染时只有状态更新，没有后台任务
        for _ in 0..3 {
            ctx.advance(0.2);
            e.update(&ctx, false);
        }
        let parents = e.container(EffectId::ROOT).map_or(0, |c| c.particle_count());
        assert!(parents > 0);
        assert_eq!(e.container(child).map(|c| c.sub_emitters().len()), Some(parents));

        ctx.advance(0.2);
        e.update(&ctx, true);
        e.update_particles(&ctx);
        let parents = e.container(EffectId::ROOT).map_or(0, |c| c.particle_count());
        assert_eq!(e.container(child).map(|c| c.sub_emitters().len()), Some(parents));
    }
}
