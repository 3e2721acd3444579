//! 粒子系统性能基准测试
//!
//! 测试静态包围盒估算和发射器更新的性能

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;
use particle_engine::config::ParticleConfig;
use particle_engine::effect::{EffectParams, EffectTree, StaticBoundsOpts, VarParam};
use particle_engine::math::Location;
use particle_engine::particles::{ParticleEmitter, SimulationContext, SpawnParams};
use particle_engine::physics::{PhysForces, StaticPhysicsWorld};
use std::hint::black_box;
use std::sync::Arc;

fn fountain(count: f32) -> EffectParams {
    EffectParams {
        count: VarParam::fixed(count),
        continuous: true,
        particle_life_time: VarParam::fixed(2.0),
        speed: VarParam::new(5.0, 0.5),
        emit_angle: VarParam::fixed(30.0),
        gravity_scale: VarParam::fixed(1.0),
        air_resistance: VarParam::fixed(0.5),
        size: VarParam::fixed(0.2),
        ..Default::default()
    }
}

fn bench_static_bounds(c: &mut Criterion) {
    let params = fountain(100.0);
    let loc = Location::from_translation(Vec3::new(10.0, 5.0, 2.0));
    let forces = PhysForces::earth();
    let opts = StaticBoundsOpts::default();

    c.bench_function("static_bounds", |b| {
        b.iter(|| black_box(params.static_bounds(black_box(&loc), &forces, &opts)))
    });
}

fn bench_emitter_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("emitter_update");

    for count in [100.0f32, 1000.0, 10000.0].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let config = ParticleConfig {
                thread_update: false,
                pool_size: 100_000,
                ..Default::default()
            };
            let mut ctx = SimulationContext::new(Arc::new(StaticPhysicsWorld::default()), Arc::new(config));
            let tree = Arc::new(EffectTree::new("fountain", fountain(count)));
            let spawn = SpawnParams {
                seed: Some(1),
                ..Default::default()
            };
            let mut emitter = ParticleEmitter::new(1, tree, Location::IDENTITY, spawn, &ctx);
            // 预热到稳定粒子数
            for _ in 0..60 {
                ctx.advance(1.0 / 30.0);
                emitter.update(&ctx, true);
                emitter.update_particles(&ctx);
            }

            b.iter(|| {
                ctx.advance(1.0 / 60.0);
                emitter.update(&ctx, true);
                emitter.update_particles(&ctx);
                black_box(emitter.particle_count())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_static_bounds, bench_emitter_update);
criterion_main!(benches);
