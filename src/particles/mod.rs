//! 粒子模拟
//!
//! - `arena` - 带代数句柄的槽位链表与全局粒子预算
//! - `particle` - 单个粒子的运动、碰撞与拖尾
//! - `sub_emitter` - 子发射器的发射节奏与状态
//! - `container` - 一个效果节点在一个发射器内的全部粒子
//! - `emitter` - 一次生成请求
//! - `manager` - 全部发射器与每帧调度
//! - `context` - 每帧显式传入的模拟上下文
//! - `stats` / `events` - 统计与状态变化钩子

pub mod arena;
pub mod container;
pub mod context;
pub mod emitter;
pub mod events;
pub mod manager;
pub mod particle;
pub mod stats;
pub mod sub_emitter;

pub use arena::{PoolBudget, SlotHandle, SlotList};
pub use container::{DeferredEmit, EmitterFrame, InsertPolicy, ParentEvent, ParticleContainer, ParticleList};
pub use context::{FrameTime, SimulationContext};
pub use emitter::{EmitterState, ParticleEmitter, SpawnParams};
pub use events::{AudioTrigger, EffectEventListener, EmitterInfo, EventHub};
pub use manager::ParticleManager;
pub use particle::{
    MoveState, Particle, ParticleAttrs, ParticleUpdateContext, ShapeTag, TailPoint, TimeState,
};
pub use stats::{ParticleCounts, ParticleStatCounts, StatCounts, VolumeStats};
pub use sub_emitter::{SubEmitter, SubEmitterEvent, SubEmitterState};
