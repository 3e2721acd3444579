//! 核心模块
//!
//! 包含子系统的基础设施：
//! - `error` - 错误类型定义
//! - `logging` - 日志初始化
//! - `scheduler` - 后台更新任务
//! - `utils` - 锁恢复与随机种子

pub mod error;
pub mod logging;
pub mod scheduler;
pub mod utils;
#[macro_use]
pub mod macros;

// 重新导出错误类型
pub use error::{
    ParamError, ParamResult, ParticleError, ParticleResult, PhysicsQueryError, SchedulerError,
    SchedulerResult,
};

pub use logging::init_logging;
pub use scheduler::{JobHandle, JobScheduler};
pub use utils::{current_timestamp_nanos, lock_recover, mix_seed};
