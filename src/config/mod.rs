/// 粒子系统配置
///
/// 提供TOML/JSON配置文件、环境变量覆盖和校验。子系统只读取配置，从不修改。
use crate::effect::{EnvFlags, PhysicsType};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 粒子系统主配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// 总开关，关闭后管理器不创建发射器
    pub enabled: bool,

    /// 排序质量：0 不排序，1 渐进二分，2 最小累计误差扫描
    pub sort_quality: u8,

    /// 强制所有效果使用动态包围盒
    pub force_dynamic_bounds: bool,

    /// 物理类型不低于此值的效果需要动态包围盒
    pub min_physics_dynamic_bounds: PhysicsType,

    /// 碰撞级别：0 无，1 地形，2 加静态物体，3 加动态物体
    pub collision_level: u8,

    /// 是否在后台线程更新发射器
    pub thread_update: bool,

    /// 工作线程数，0 表示 CPU 核心数
    pub worker_threads: usize,

    /// 管理器内存活粒子总数上限
    pub pool_size: usize,

    /// 发射器数量上限
    pub max_emitters: usize,

    /// 不可见超过此秒数的发射器释放内存
    pub unseen_reset_timeout: f32,

    /// 密度补偿系数上限
    pub max_density_adjust: f32,

    /// 是否允许粒子光源
    pub lights_enabled: bool,

    /// 日志配置
    pub logging: LoggingConfig,
}

use crate::impl_default;

impl_default!(ParticleConfig {
    enabled: true,
    sort_quality: 1,
    force_dynamic_bounds: false,
    min_physics_dynamic_bounds: PhysicsType::SimpleCollision,
    collision_level: 3,
    thread_update: true,
    worker_threads: 0,
    pool_size: 65536,
    max_emitters: 4096,
    unseen_reset_timeout: 5.0,
    max_density_adjust: 32.0,
    lights_enabled: true,
    logging: LoggingConfig::default(),
});

impl ParticleConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 保存为JSON文件
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("PARTICLE_SORT_QUALITY") {
            if let Ok(quality) = val.parse() {
                self.sort_quality = quality;
            }
        }
        if let Ok(val) = env::var("PARTICLE_FORCE_DYNAMIC_BOUNDS") {
            self.force_dynamic_bounds = parse_flag(&val).unwrap_or(self.force_dynamic_bounds);
        }
        if let Ok(val) = env::var("PARTICLE_COLLISION_LEVEL") {
            if let Ok(level) = val.parse() {
                self.collision_level = level;
            }
        }
        if let Ok(val) = env::var("PARTICLE_THREAD_UPDATE") {
            self.thread_update = parse_flag(&val).unwrap_or(self.thread_update);
        }
        if let Ok(val) = env::var("PARTICLE_POOL_SIZE") {
            if let Ok(size) = val.parse() {
                self.pool_size = size;
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sort_quality > 2 {
            return Err(ConfigError::ValidationError(format!(
                "sort_quality must be 0..=2, got {}",
                self.sort_quality
            )));
        }
        if self.collision_level > 3 {
            return Err(ConfigError::ValidationError(format!(
                "collision_level must be 0..=3, got {}",
                self.collision_level
            )));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::ValidationError(
                "pool_size must be positive".to_string(),
            ));
        }
        if !(self.max_density_adjust >= 1.0) {
            return Err(ConfigError::ValidationError(
                "max_density_adjust must be >= 1".to_string(),
            ));
        }
        if !(self.unseen_reset_timeout >= 0.0) {
            return Err(ConfigError::ValidationError(
                "unseen_reset_timeout must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// 配置允许的环境标志
    ///
    /// 碰撞级别低于 3 去掉动态物体碰撞，低于 2 再去掉静态物体碰撞，
    /// 低于 1 去掉全部碰撞；关闭光源时去掉粒子光源。
    pub fn allowed_env_flags(&self) -> EnvFlags {
        let mut allowed = EnvFlags::all();
        if self.collision_level < 3 {
            allowed.remove(EnvFlags::ENV_DYNAMIC_ENT);
        }
        if self.collision_level < 2 {
            allowed.remove(EnvFlags::ENV_STATIC_ENT);
        }
        if self.collision_level < 1 {
            allowed.remove(EnvFlags::ENV_COLLIDE_ANY | EnvFlags::ENV_COLLIDE_INFO);
        }
        if !self.lights_enabled {
            allowed.remove(EnvFlags::REN_LIGHTS);
        }
        allowed
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./particles.toml
    /// 2. ./particles.json
    /// 3. <配置目录>/particle_engine/particles.toml
    /// 4. 使用默认配置
    ///
    /// 找到的配置都会再应用环境变量覆盖。
    pub fn load_or_default() -> Self {
        let mut config = Self::load_from_search_path();
        config.apply_env_overrides();
        if let Err(e) = config.validate() {
            tracing::warn!(target: "particle_config", "Invalid configuration ({}), using defaults", e);
            config = Self::default();
        }
        config
    }

    fn load_from_search_path() -> Self {
        if let Ok(config) = Self::from_toml_file("particles.toml") {
            tracing::info!(target: "particle_config", "Loaded config from particles.toml");
            return config;
        }

        if let Ok(config) = Self::from_json_file("particles.json") {
            tracing::info!(target: "particle_config", "Loaded config from particles.json");
            return config;
        }

        if let Some(config_path) = Self::user_config_path() {
            if let Ok(config) = Self::from_toml_file(&config_path) {
                tracing::info!(target: "particle_config", "Loaded config from {:?}", config_path);
                return config;
            }
        }

        tracing::debug!(target: "particle_config", "Using default configuration");
        Self::default()
    }

    /// 用户配置文件路径
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("particle_engine").join("particles.toml"))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,

    /// 是否输出到控制台
    pub log_to_console: bool,
}

impl_default!(LoggingConfig {
    level: LogLevel::Info,
    log_to_console: true,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}
