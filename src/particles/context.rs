//! 模拟上下文
//!
//! 计时器、物理世界、配置、相机和本帧物理环境快照都通过这个结构显式传入，
//! 不经任何全局访问器。每帧由管理器新建一份，克隆代价只是几个 `Arc`。

use super::arena::PoolBudget;
use super::events::EventHub;
use crate::config::ParticleConfig;
use crate::effect::EnvFlags;
use crate::math::Camera;
use crate::physics::{PhysicsEnvironment, PhysicsWorld};
use std::sync::Arc;

/// 帧时间
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTime {
    /// 本帧时长（秒）
    pub delta: f32,
    /// 累计时间
    pub time: f64,
    pub frame: u64,
}

/// 一帧的模拟上下文
#[derive(Clone)]
pub struct SimulationContext {
    pub time: FrameTime,
    pub world: Arc<dyn PhysicsWorld>,
    pub config: Arc<ParticleConfig>,
    pub camera: Option<crate::math::Camera>,
    /// 全部容器共享的粒子预算
    pub budget: Arc<PoolBudget>,
    /// 本帧只读的全局物理环境
    pub phys_env: Arc<PhysicsEnvironment>,
    pub events: Arc<EventHub>,
}

impl std::fmt::Debug for SimulationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationContext")
            .field("time", &self.time)
            .field("camera", &self.camera.is_some())
            .field("budget_used", &self.budget.used())
            .finish()
    }
}

impl SimulationContext {
    /// 以物理世界当前的均匀力建立上下文
    pub fn new(world: Arc<dyn PhysicsWorld>, config: Arc<ParticleConfig>) -> Self {
        let budget = Arc::new(PoolBudget::new(config.pool_size));
        let phys_env = Arc::new(PhysicsEnvironment::uniform(world.uniform_forces()));
        Self {
            time: FrameTime::default(),
            world,
            config,
            camera: None,
            budget,
            phys_env,
            events: Arc::new(EventHub::new()),
        }
    }

    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_budget(mut self, budget: Arc<PoolBudget>) -> Self {
        self.budget = budget;
        self
    }

    /// 推进一帧
    pub fn advance(&mut self, delta: f32) {
        self.time.delta = delta;
        self.time.time += f64::from(delta);
        self.time.frame += 1;
    }

    /// 配置允许的能力与效果需要的能力之交
    pub fn effective_flags(&self, flags: EnvFlags) -> EnvFlags {
        flags & self.config.allowed_env_flags()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{PhysForces, StaticPhysicsWorld};

    #[test]
    fn test_context_advance_and_flags() {
        let world = Arc::new(StaticPhysicsWorld::new(PhysForces::earth()));
        let config = Arc::new(ParticleConfig {
            collision_level: 1,
            pool_size: 10,
            ..Default::default()
        });
        let mut ctx = SimulationContext::new(world, config);
        assert_eq!(ctx.budget.capacity(), 10);
        assert!(ctx.phys_env.is_current());
        assert_eq!(ctx.phys_env.uniform_forces().accel.z, -9.81);

        ctx.advance(0.5);
        ctx.advance(0.25);
        assert_eq!(ctx.time.frame, 2);
        assert!((ctx.time.time - 0.75).abs() < 1e-9);

        let flags = ctx.effective_flags(EnvFlags::ENV_TERRAIN | EnvFlags::ENV_DYNAMIC_ENT);
        assert_eq!(flags, EnvFlags::ENV_TERRAIN);
    }
}
