//! 统一错误处理模块
//!
//! 粒子子系统的错误分层：
//!
//! - **资源耗尽**（粒子池满、容器分配失败）：不是错误值，调用方得到 `None` 并累加拒绝计数
//! - **参数非法** (`ParamError`)：加载时检测，效果被降级为禁用并记录一次警告
//! - **物理查询失败** (`PhysicsQueryError`)：区域实体已消失，按“无外力”处理
//! - **调度错误** (`SchedulerError`)：后台线程池不可用时退化为同步更新
//!
//! 悬空引用（容器重置后访问粒子或子发射器）由带代数的句柄在结构上杜绝。

use crate::config::ConfigError;
use thiserror::Error;

/// 粒子子系统顶层错误类型
#[derive(Error, Debug)]
pub enum ParticleError {
    #[error("Invalid effect parameters: {0}")]
    Param(#[from] ParamError),

    #[error("Physics query error: {0}")]
    Physics(#[from] PhysicsQueryError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Effect not found: {0}")]
    EffectNotFound(String),
}

/// 效果参数错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("effect '{effect}': space loop requires a non-zero emission volume")]
    ZeroSpaceLoopVolume { effect: String },

    #[error("effect '{effect}': {field} must not be negative (got {value})")]
    Negative {
        effect: String,
        field: &'static str,
        value: f32,
    },

    #[error("effect '{effect}': {field} must be finite")]
    NotFinite { effect: String, field: &'static str },

    #[error("effect '{effect}': spawn indirection requires a parent effect")]
    IndirectWithoutParent { effect: String },
}

/// 物理查询错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsQueryError {
    #[error("Physical area {0} no longer exists")]
    AreaGone(u64),

    #[error("Force proxy {0} no longer exists")]
    ProxyGone(u64),
}

/// 后台任务调度错误
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Failed to create worker runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Update job {0} was dropped before completion")]
    JobDropped(u64),
}

/// 结果类型别名
pub type ParticleResult<T> = Result<T, ParticleError>;
pub type ParamResult<T> = Result<T, ParamError>;
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err = ParamError::ZeroSpaceLoopVolume {
            effect: "rain".to_string(),
        };
        let top: ParticleError = err.into();
        assert!(matches!(top, ParticleError::Param(_)));
    }

    #[test]
    fn test_error_display() {
        let err = PhysicsQueryError::AreaGone(7);
        assert_eq!(err.to_string(), "Physical area 7 no longer exists");

        let err = ParamError::Negative {
            effect: "smoke".to_string(),
            field: "count",
            value: -1.0,
        };
        assert_eq!(
            err.to_string(),
            "effect 'smoke': count must not be negative (got -1)"
        );
    }
}
