//! 粒子管理器
//!
//! 管理全部存活发射器，维护每帧的全局物理环境快照，调度后台更新任务并汇总统计。
//!
//! 每帧流程：
//!
//! 1. 同步上一帧全部在途任务并收集统计
//! 2. 推进时间，刷新全局物理环境
//! 3. 产生力场的发射器先于其他发射器更新
//! 4. 上一帧被渲染的发射器提交一个后台任务，其余只更新状态
//! 5. 死亡发射器等待在途任务后释放

use super::context::SimulationContext;
use super::emitter::{EmitterState, ParticleEmitter, SpawnParams};
use super::events::{EffectEventListener, EmitterInfo};
use super::stats::ParticleCounts;
use crate::config::ParticleConfig;
use crate::core::error::{ParticleError, ParticleResult};
use crate::core::scheduler::{JobHandle, JobScheduler};
use crate::core::utils::lock_recover;
use crate::effect::{EffectTree, EnvFlagOptions, EnvFlags};
use crate::math::{Aabb, Camera, Location};
use crate::physics::PhysicsWorld;
use crate::render::{render_emitter, ParticleRenderer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 一个存活发射器及其在途任务
struct EmitterEntry {
    emitter: Arc<Mutex<ParticleEmitter>>,
    job: Option<JobHandle<()>>,
}

impl EmitterEntry {
    /// 渲染或删除前的同步屏障
    fn sync(&mut self) {
        if let Some(job) = self.job.take() {
            if let Err(e) = job.wait() {
                tracing::warn!(target: "particle_jobs", "update job lost: {}", e);
            }
        }
    }

    fn info(&self) -> EmitterInfo {
        let emitter = lock_recover(&self.emitter);
        EmitterInfo {
            id: emitter.id(),
            effect: emitter.effect_name().to_string(),
            location: *emitter.location(),
        }
    }
}

/// 粒子管理器
pub struct ParticleManager {
    config: Arc<ParticleConfig>,
    scheduler: JobScheduler,
    /// 每帧克隆给各任务的基础上下文
    ctx: SimulationContext,
    entries: Vec<EmitterEntry>,
    effects: HashMap<String, Arc<EffectTree>>,
    next_id: u64,
    last_counts: ParticleCounts,
}

impl std::fmt::Debug for ParticleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleManager")
            .field("emitters", &self.entries.len())
            .field("effects", &self.effects.len())
            .field("scheduler", &self.scheduler)
            .field("frame", &self.ctx.time.frame)
            .finish()
    }
}

impl ParticleManager {
    /// 创建管理器
    ///
    /// 配置非法时返回错误；工作线程池创建失败时退化为同步更新。
    pub fn new(config: ParticleConfig, world: Arc<dyn PhysicsWorld>) -> ParticleResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let scheduler = match JobScheduler::new(config.worker_threads, config.thread_update) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(target: "particle_jobs", "falling back to inline updates: {}", e);
                JobScheduler::inline()
            }
        };
        let ctx = SimulationContext::new(world, Arc::clone(&config));
        tracing::info!(
            target: "particles",
            threaded = scheduler.is_threaded(),
            workers = scheduler.worker_count(),
            pool = config.pool_size,
            "particle manager created"
        );
        Ok(Self {
            config,
            scheduler,
            ctx,
            entries: Vec::new(),
            effects: HashMap::new(),
            next_id: 1,
            last_counts: ParticleCounts::default(),
        })
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn add_listener(&self, listener: Arc<dyn EffectEventListener>) {
        self.ctx.events.add_listener(listener);
    }

    /// 排序插入使用的相机
    pub fn set_camera(&mut self, camera: Camera) {
        self.ctx.camera = Some(camera);
    }

    /// 注册效果；同名效果被替换，已存在的发射器不受影响
    pub fn register_effect(&mut self, mut tree: EffectTree) -> Arc<EffectTree> {
        tree.set_env_flag_options(EnvFlagOptions {
            min_physics_dynamic_bounds: self.config.min_physics_dynamic_bounds,
        });
        let tree = Arc::new(tree);
        self.effects
            .insert(tree.root_name().to_string(), Arc::clone(&tree));
        tree
    }

    pub fn find_effect(&self, name: &str) -> Option<&Arc<EffectTree>> {
        self.effects.get(name)
    }

    /// 按名字创建发射器
    ///
    /// 未注册的效果返回错误；子系统关闭或发射器已满时返回 `Ok(None)`。
    pub fn create_emitter(&mut self, effect: &str, loc: Location, spawn: SpawnParams) -> ParticleResult<Option<u64>> {
        let tree = self
            .effects
            .get(effect)
            .cloned()
            .ok_or_else(|| ParticleError::EffectNotFound(effect.to_string()))?;
        Ok(self.create_emitter_from_tree(tree, loc, spawn))
    }

    pub fn create_emitter_from_tree(&mut self, tree: Arc<EffectTree>, loc: Location, spawn: SpawnParams) -> Option<u64> {
        if !self.config.enabled {
            return None;
        }
        if self.entries.len() >= self.config.max_emitters {
            tracing::warn!(
                target: "particles",
                effect = tree.root_name(),
                max = self.config.max_emitters,
                "emitter limit reached"
            );
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        let emitter = ParticleEmitter::new(id, tree, loc, spawn, &self.ctx);
        let entry = EmitterEntry {
            emitter: Arc::new(Mutex::new(emitter)),
            job: None,
        };
        let info = entry.info();
        tracing::debug!(target: "particles", emitter = id, effect = %info.effect, "emitter created");
        self.ctx.events.emitter_created(&info);
        self.entries.push(entry);
        Some(id)
    }

    fn entry_mut(&mut self, id: u64) -> Option<&mut EmitterEntry> {
        self.entries
            .iter_mut()
            .find(|e| lock_recover(&e.emitter).id() == id)
    }

    /// 停止发射器，粒子自然消亡后删除
    pub fn delete_emitter(&mut self, id: u64) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.sync();
                lock_recover(&entry.emitter).kill();
                true
            }
            None => false,
        }
    }

    /// 停止全部满足条件的发射器
    pub fn delete_emitters(&mut self, mut filter: impl FnMut(&ParticleEmitter) -> bool) -> usize {
        let mut killed = 0;
        for entry in &mut self.entries {
            entry.sync();
            let mut emitter = lock_recover(&entry.emitter);
            if !emitter.is_killed() && filter(&emitter) {
                emitter.kill();
                killed += 1;
            }
        }
        killed
    }

    /// 访问发射器；先等待其在途任务
    pub fn with_emitter<R>(&mut self, id: u64, f: impl FnOnce(&mut ParticleEmitter) -> R) -> Option<R> {
        let entry = self.entry_mut(id)?;
        entry.sync();
        let mut emitter = lock_recover(&entry.emitter);
        Some(f(&mut emitter))
    }

    /// 等待全部在途任务
    pub fn sync_all(&mut self) {
        for entry in &mut self.entries {
            entry.sync();
        }
    }

    /// 每帧更新
    pub fn update(&mut self, delta: f32) {
        self.sync_all();
        let mut counts = ParticleCounts::default();
        for entry in &self.entries {
            counts += lock_recover(&entry.emitter).take_counts();
        }
        self.last_counts = counts;

        self.ctx.advance(delta);
        let flags = self
            .entries
            .iter()
            .fold(EnvFlags::empty(), |acc, e| acc | lock_recover(&e.emitter).env_flags())
            & self.config.allowed_env_flags();
        let world = Arc::clone(&self.ctx.world);
        Arc::make_mut(&mut self.ctx.phys_env).update(world.as_ref(), flags);

        let ctx = self.ctx.clone();
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by_key(|&i| !lock_recover(&self.entries[i].emitter).generates_force());

        for i in order {
            let entry = &mut self.entries[i];
            let submit = {
                let mut emitter = lock_recover(&entry.emitter);
                let rendered = emitter.take_rendered();
                emitter.update(&ctx, rendered);
                match emitter.state() {
                    EmitterState::Dead | EmitterState::Starting => false,
                    _ if rendered => true,
                    _ => {
                        emitter.reset_unseen(&ctx);
                        false
                    }
                }
            };
            if submit {
                let shared = Arc::clone(&entry.emitter);
                let job_ctx = ctx.clone();
                entry.job = Some(self.scheduler.submit(move || {
                    lock_recover(&shared).update_particles(&job_ctx);
                }));
            }
        }

        self.erase_dead();
    }

    fn erase_dead(&mut self) {
        let ctx = &self.ctx;
        self.entries.retain_mut(|entry| {
            // 本帧提交过任务的发射器一定存活
            if entry.job.is_some() || lock_recover(&entry.emitter).is_alive() {
                return true;
            }
            entry.sync();
            let info = entry.info();
            lock_recover(&entry.emitter).release(ctx);
            ctx.events.emitter_deleted(&info);
            tracing::debug!(target: "particles", emitter = info.id, effect = %info.effect, "emitter deleted");
            false
        });
    }

    /// 剔除并提交全部发射器，返回可见发射器数
    pub fn render(&mut self, camera: &Camera, renderer: &mut dyn ParticleRenderer) -> usize {
        self.ctx.camera = Some(*camera);
        let mut visible = 0;
        for entry in &mut self.entries {
            entry.sync();
            let mut emitter = lock_recover(&entry.emitter);
            if render_emitter(&mut emitter, camera, renderer) {
                visible += 1;
            }
        }
        visible
    }

    /// 删除全部发射器并清空物理环境
    pub fn reset(&mut self) {
        self.sync_all();
        for entry in self.entries.drain(..) {
            let info = entry.info();
            lock_recover(&entry.emitter).release(&self.ctx);
            self.ctx.events.emitter_deleted(&info);
        }
        self.ctx.phys_env.invalidate();
        self.last_counts = ParticleCounts::default();
        tracing::info!(target: "particles", "particle manager reset");
    }

    /// 物理区域变化：作废全局快照，受影响的发射器重新估算静态包围盒
    pub fn on_area_changed(&mut self, bounds: Option<Aabb>) {
        self.ctx.phys_env.invalidate();
        for entry in &mut self.entries {
            entry.sync();
            let mut emitter = lock_recover(&entry.emitter);
            let hit = match &bounds {
                Some(bb) => emitter.world_bounds().intersects(bb),
                None => true,
            };
            if hit {
                emitter.invalidate_static_bounds();
            }
        }
    }

    /// 效果参数变化后刷新使用它的发射器
    pub fn update_emitters(&mut self, tree: EffectTree) -> usize {
        let tree = self.register_effect(tree);
        let name = tree.root_name().to_string();
        let mut updated = 0;
        for entry in &mut self.entries {
            entry.sync();
            let mut emitter = lock_recover(&entry.emitter);
            if emitter.effect_name() == name {
                emitter.refresh_effect(Arc::clone(&tree), &self.ctx);
                updated += 1;
            }
        }
        updated
    }

    /// 列出发射器并写入调试日志
    pub fn list_emitters(&mut self, mut filter: impl FnMut(&ParticleEmitter) -> bool) -> Vec<EmitterInfo> {
        self.sync_all();
        let mut list = Vec::new();
        for entry in &self.entries {
            let emitter = lock_recover(&entry.emitter);
            if !filter(&emitter) {
                continue;
            }
            tracing::info!(
                target: "particles",
                emitter = emitter.id(),
                effect = emitter.effect_name(),
                state = ?emitter.state(),
                age = emitter.age(),
                particles = emitter.particle_count(),
                "emitter"
            );
            list.push(EmitterInfo {
                id: emitter.id(),
                effect: emitter.effect_name().to_string(),
                location: *emitter.location(),
            });
        }
        list
    }

    /// 上一帧的汇总统计
    pub fn get_counts(&self) -> ParticleCounts {
        self.last_counts
    }

    pub fn emitter_count(&self) -> usize {
        self.entries.len()
    }

    /// 管理器内存活粒子数
    pub fn particle_count(&self) -> usize {
        self.ctx.budget.used()
    }
}

impl Drop for ParticleManager {
    fn drop(&mut self) {
        self.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{EffectId, EffectParams, VarParam};
    use crate::physics::StaticPhysicsWorld;
    use crate::render::VertexCollector;
    use glam::Vec3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager(threaded: bool) -> ParticleManager {
        let config = ParticleConfig {
            thread_update: threaded,
            worker_threads: 2,
            max_emitters: 4,
            ..Default::default()
        };
        ParticleManager::new(config, Arc::new(StaticPhysicsWorld::default())).unwrap()
    }

    fn burst() -> EffectTree {
        EffectTree::new(
            "burst",
            EffectParams {
                count: VarParam::fixed(5.0),
                particle_life_time: VarParam::fixed(0.5),
                speed: VarParam::fixed(1.0),
                material: Some("sprite".to_string()),
                ..Default::default()
            },
        )
    }

    fn camera() -> Camera {
        Camera::look_at(Vec3::new(0.0, -10.0, 0.0), Vec3::ZERO, 1.2, 1.0, 0.1, 100.0)
    }

    #[derive(Default)]
    struct Counter {
        created: AtomicUsize,
        deleted: AtomicUsize,
    }

    impl EffectEventListener for Counter {
        fn on_create_emitter(&self, _info: &EmitterInfo) {
            self.created.fetch_add(1, Ordering::SeqCst);
        }

        fn on_delete_emitter(&self, _info: &EmitterInfo) {
            self.deleted.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_unknown_effect_is_an_error() {
        let mut m = manager(false);
        let err = m
            .create_emitter("missing", Location::IDENTITY, SpawnParams::default())
            .unwrap_err();
        assert!(matches!(err, ParticleError::EffectNotFound(ref n) if n == "missing"));
    }

    #[test]
    fn test_emitter_limit() {
        let mut m = manager(false);
        m.register_effect(burst());
        for _ in 0..4 {
            assert!(m
                .create_emitter("burst", Location::IDENTITY, SpawnParams::default())
                .unwrap()
                .is_some());
        }
        assert_eq!(
            m.create_emitter("burst", Location::IDENTITY, SpawnParams::default())
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_lifecycle_notifies_listeners() {
        let mut m = manager(true);
        let counter = Arc::new(Counter::default());
        m.add_listener(counter.clone());
        m.register_effect(burst());
        let id = m
            .create_emitter("burst", Location::IDENTITY, SpawnParams::default())
            .unwrap()
            .unwrap();
        assert_eq!(counter.created.load(Ordering::SeqCst), 1);

        let cam = camera();
        let mut collector = VertexCollector::new(cam);
        for _ in 0..5 {
            m.render(&cam, &mut collector);
            m.update(0.05);
        }
        assert!(m.delete_emitter(id));
        for _ in 0..40 {
            m.render(&cam, &mut collector);
            m.update(0.05);
        }
        assert_eq!(m.emitter_count(), 0);
        assert_eq!(counter.deleted.load(Ordering::SeqCst), 1);
        assert_eq!(m.particle_count(), 0);
    }

    #[test]
    fn test_reset_releases_everything() {
        let mut m = manager(false);
        m.register_effect(burst());
        m.create_emitter("burst", Location::IDENTITY, SpawnParams::default())
            .unwrap();
        m.create_emitter("burst", Location::from_translation(Vec3::X), SpawnParams::default())
            .unwrap();
        assert_eq!(m.list_emitters(|_| true).len(), 2);
        m.reset();
        assert_eq!(m.emitter_count(), 0);
        assert_eq!(m.particle_count(), 0);
    }

    #[test]
    fn test_delete_emitters_by_filter() {
        let mut m = manager(false);
        m.register_effect(burst());
        m.create_emitter("burst", Location::IDENTITY, SpawnParams::default())
            .unwrap();
        m.create_emitter("burst", Location::from_translation(Vec3::new(5.0, 0.0, 0.0)), SpawnParams::default())
            .unwrap();
        let killed = m.delete_emitters(|e| e.location().translation.x > 1.0);
        assert_eq!(killed, 1);
        assert_eq!(m.delete_emitters(|e| e.location().translation.x > 1.0), 0);
    }

    fn static_bounds_reset(m: &mut ParticleManager, id: u64) -> Option<bool> {
        m.with_emitter(id, |e| e.container(EffectId::ROOT).map(|c| c.static_bounds().is_reset()))
            .flatten()
    }

    #[test]
    fn test_area_change_resets_intersecting_static_bounds() {
        let mut m = manager(false);
        m.register_effect(burst());
        let id = m
            .create_emitter("burst", Location::IDENTITY, SpawnParams::default())
            .unwrap()
            .unwrap();
        m.update(0.1);
        assert_eq!(static_bounds_reset(&mut m, id), Some(false));

        m.on_area_changed(Some(Aabb::new(Vec3::splat(100.0), Vec3::splat(101.0))));
        assert_eq!(static_bounds_reset(&mut m, id), Some(false));

        m.on_area_changed(Some(Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0))));
        assert_eq!(static_bounds_reset(&mut m, id), Some(true));
        assert!(!m.context().phys_env.is_current());

        // 下一帧重新估算
        m.update(0.1);
        assert_eq!(static_bounds_reset(&mut m, id), Some(false));
    }

    #[test]
    fn test_update_emitters_refreshes_matching_effect() {
        let mut m = manager(false);
        m.register_effect(burst());
        m.register_effect(EffectTree::new("other", EffectParams::default()));
        let id = m
            .create_emitter("burst", Location::IDENTITY, SpawnParams::default())
            .unwrap()
            .unwrap();
        m.create_emitter("other", Location::IDENTITY, SpawnParams::default())
            .unwrap();

        let tree = EffectTree::new(
            "burst",
            EffectParams {
                count: VarParam::fixed(12.0),
                ..burst().params(EffectId::ROOT).clone()
            },
        );
        assert_eq!(m.update_emitters(tree), 1);

        let count = m.with_emitter(id, |e| {
            e.container(EffectId::ROOT).map(|c| c.params().count.max_value())
        });
        assert_eq!(count, Some(Some(12.0)));
        assert!(m
            .find_effect("burst")
            .is_some_and(|t| t.params(EffectId::ROOT).count.max_value() == 12.0));
    }

    #[test]
    fn test_disabled_subsystem_creates_nothing() {
        let config = ParticleConfig {
            enabled: false,
            thread_update: false,
            ..Default::default()
        };
        let mut m = ParticleManager::new(config, Arc::new(StaticPhysicsWorld::default())).unwrap();
        m.register_effect(burst());
        assert_eq!(
            m.create_emitter("burst", Location::IDENTITY, SpawnParams::default())
                .unwrap(),
            None
        );
    }
}
