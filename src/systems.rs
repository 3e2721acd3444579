//! ECS 接入
//!
//! 把 [`ParticleManager`] 作为资源放进 `bevy_ecs` 世界，由组件描述效果实例。

use crate::math::Location;
use crate::particles::{ParticleManager, SpawnParams};
use bevy_ecs::prelude::*;

/// 粒子管理器资源
#[derive(Resource, Debug)]
pub struct Particles(pub ParticleManager);

/// 帧时间资源
#[derive(Resource, Clone, Copy, Debug, Default)]
pub struct ParticleTime {
    pub delta_seconds: f32,
}

/// 实体上的效果实例
#[derive(Component, Clone, Debug)]
pub struct EffectSpawner {
    pub effect: String,
    pub location: Location,
    pub spawn: SpawnParams,
    /// 已创建的发射器
    pub emitter: Option<u64>,
}

impl EffectSpawner {
    pub fn new(effect: impl Into<String>, location: Location) -> Self {
        Self {
            effect: effect.into(),
            location,
            spawn: SpawnParams::default(),
            emitter: None,
        }
    }
}

/// 为新组件创建发射器，已有发射器跟随组件位置
pub fn effect_spawn_system(mut particles: ResMut<Particles>, mut query: Query<&mut EffectSpawner>) {
    for mut spawner in query.iter_mut() {
        let current = spawner.emitter;
        match current {
            None => match particles
                .0
                .create_emitter(&spawner.effect, spawner.location, spawner.spawn.clone())
            {
                Ok(id) => spawner.emitter = id,
                Err(e) => tracing::warn!(target: "particles", "cannot spawn effect: {}", e),
            },
            Some(id) => {
                let loc = spawner.location;
                if particles.0.with_emitter(id, |e| e.set_location(loc)).is_none() {
                    // 发射器已死亡并被回收
                    spawner.emitter = None;
                }
            }
        }
    }
}

pub fn particle_update_system(mut particles: ResMut<Particles>, time: Res<ParticleTime>) {
    particles.0.update(time.delta_seconds);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParticleConfig;
    use crate::effect::{EffectParams, EffectTree, VarParam};
    use crate::physics::StaticPhysicsWorld;
    use std::sync::Arc;

    #[test]
    fn test_systems_drive_manager() {
        let config = ParticleConfig {
            thread_update: false,
            ..Default::default()
        };
        let mut manager = ParticleManager::new(config, Arc::new(StaticPhysicsWorld::default())).unwrap();
        manager.register_effect(EffectTree::new(
            "smoke",
            EffectParams {
                count: VarParam::fixed(4.0),
                continuous: true,
                particle_life_time: VarParam::fixed(1.0),
                ..Default::default()
            },
        ));

        let mut world = World::new();
        world.insert_resource(Particles(manager));
        world.insert_resource(ParticleTime { delta_seconds: 0.1 });
        let entity = world
            .spawn(EffectSpawner::new("smoke", Location::IDENTITY))
            .id();

        let mut schedule = Schedule::default();
        schedule.add_systems((effect_spawn_system, particle_update_system).chain());
        schedule.run(&mut world);
        schedule.run(&mut world);

        let spawner = world.get::<EffectSpawner>(entity).unwrap();
        assert!(spawner.emitter.is_some());
        assert_eq!(world.resource::<Particles>().0.emitter_count(), 1);
    }
}
