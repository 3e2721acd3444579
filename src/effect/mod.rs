//! 效果定义层
//!
//! - `flags` - 环境与渲染能力标志
//! - `params` - 单个效果节点的参数与派生量
//! - `bounds` - 解析静态包围盒与密度补偿
//! - `tree` - 效果树及寿命查询

pub mod bounds;
pub mod flags;
pub mod params;
pub mod tree;

pub use bounds::{EmitCone, StaticBoundsOpts, MOVE_RELATIVE_EXPANSION, SIZE_SAFETY, TRAVEL_SAFETY};
pub use flags::EnvFlags;
pub use params::{
    BlendType, EffectParams, EnvFlagOptions, Facing, ForceGeneration, GeometryPieces, GeometryRef,
    LightSource, PhysicsType, SpawnIndirection, VarParam,
};
pub use tree::{EffectCounts, EffectId, EffectTree, MaxLifeOpts};
