//! 物理力场层
//!
//! - `forces` - 合力参数与闭式运动积分
//! - `world` - 物理世界服务接口与内存实现
//! - `environment` - 均匀力与非均匀区域的每帧快照

pub mod environment;
pub mod forces;
pub mod world;

pub use environment::{AreaLock, PhysArea, PhysicsEnvironment};
pub use forces::{
    add_travel, travel, travel_distance_approx, travel_volume, ForceParams, PhysForces,
    DRAG_APPROX_THRESHOLD, STANDARD_GRAVITY,
};
pub use world::{
    AreaForceModel, AreaId, AreaInfo, Falloff, ForceProxyDesc, HitKind, PhysicsWorld, ProxyId,
    ProxyShape, RayHit, StaticPhysicsWorld,
};

#[cfg(test)]
mod tests;
