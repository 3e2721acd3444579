//! 效果参数
//!
//! 运行时不可变的发射/运动参数。资源层负责解析，这里只做校验和派生量计算。

use super::flags::EnvFlags;
use crate::core::error::{ParamError, ParamResult};
use crate::impl_default;
use crate::math::Aabb;
use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// 带随机范围的标量参数
///
/// 取值区间为 `[max * (1 - random), max]`，`random` 取 0..=1。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VarParam {
    pub max: f32,
    #[serde(default)]
    pub random: f32,
}

impl VarParam {
    pub const ZERO: VarParam = VarParam {
        max: 0.0,
        random: 0.0,
    };

    pub const fn fixed(value: f32) -> Self {
        Self {
            max: value,
            random: 0.0,
        }
    }

    pub const fn new(max: f32, random: f32) -> Self {
        Self { max, random }
    }

    pub fn is_set(&self) -> bool {
        self.max != 0.0
    }

    pub fn max_value(&self) -> f32 {
        self.max.max(self.low())
    }

    pub fn min_value(&self) -> f32 {
        self.max.min(self.low())
    }

    fn low(&self) -> f32 {
        self.max * (1.0 - self.random.clamp(0.0, 1.0))
    }

    /// 在随机范围内取值
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        if self.random <= 0.0 {
            self.max
        } else {
            self.max * (1.0 - self.random.clamp(0.0, 1.0) * rng.gen::<f32>())
        }
    }
}

/// 子效果的触发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpawnIndirection {
    /// 直接随发射器启动
    #[default]
    None,
    /// 父粒子出生时
    ParentStart,
    /// 父粒子碰撞时
    ParentCollide,
    /// 父粒子死亡时
    ParentDeath,
}

/// 物理模拟类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum PhysicsType {
    #[default]
    None,
    SimpleCollision,
    SimplePhysics,
    RigidBody,
}

/// 朝向模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Facing {
    #[default]
    Camera,
    Free,
    Horizontal,
    Velocity,
    /// 贴在水面上
    Water,
    /// 贴花
    Decal,
}

/// 混合模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendType {
    #[default]
    AlphaBased,
    Additive,
    Multiplicative,
    Opaque,
}

/// 几何体拆分方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeometryPieces {
    /// 整个几何体作为一个粒子
    #[default]
    Whole,
    /// 每个子部件一个粒子
    AllPieces,
    /// 每个粒子随机一个子部件
    RandomPiece,
}

/// 粒子群对世界施加的力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForceGeneration {
    #[default]
    None,
    Wind,
    Gravity,
}

/// 几何体引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryRef {
    pub name: String,
    /// 包围球半径，用于尺寸估计
    pub radius: f32,
    /// 子部件数量
    pub pieces: u32,
}

/// 粒子光源
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LightSource {
    pub intensity: VarParam,
    pub radius: VarParam,
}

/// 计算环境标志时的外部设置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvFlagOptions {
    /// 物理类型不低于此值需要动态包围盒，`PhysicsType::None` 表示关闭此规则
    pub min_physics_dynamic_bounds: PhysicsType,
}

impl_default!(EnvFlagOptions {
    min_physics_dynamic_bounds: PhysicsType::SimpleCollision,
});

/// 单个效果节点的参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectParams {
    pub enabled: bool,

    // 发射
    pub count: VarParam,
    pub continuous: bool,
    pub spawn_delay: VarParam,
    /// 0 表示无限
    pub emitter_life_time: VarParam,
    pub pulse_period: VarParam,
    pub spawn_indirection: SpawnIndirection,
    /// 0..=1，发射器运动时保持视觉密度的程度
    pub maintain_density: f32,

    // 位置
    pub position_offset: Vec3,
    pub random_offset: Vec3,
    pub space_loop: bool,
    pub bind_emitter_to_camera: bool,
    pub camera_max_distance: f32,
    pub emit_offset_dir: bool,
    pub move_relative_emitter: bool,

    // 方向（角度单位为度）
    pub focus_gravity_dir: bool,
    pub focus_camera_dir: bool,
    pub focus_angle: VarParam,
    pub focus_azimuth: VarParam,
    pub emit_angle: VarParam,

    // 外观
    pub facing: Facing,
    pub blend_type: BlendType,
    /// 连接成条带
    pub connection: bool,
    pub size: VarParam,
    pub alpha: VarParam,
    pub stretch: VarParam,
    pub stretch_offset_ratio: f32,
    pub tail_steps: u32,
    pub tail_length: f32,
    pub geometry: Option<GeometryRef>,
    pub geometry_pieces: GeometryPieces,
    pub material: Option<String>,
    pub cast_shadows: bool,
    pub light_source: LightSource,
    pub camera_distance_offset: f32,

    // 生命与运动
    /// 0 表示与发射器同寿
    pub particle_life_time: VarParam,
    pub remain_while_visible: bool,
    pub speed: VarParam,
    pub inherit_velocity: f32,
    pub air_resistance: VarParam,
    pub wind_scale: f32,
    pub gravity_scale: VarParam,
    pub acceleration: Vec3,
    pub turbulence_3d_speed: VarParam,
    pub turbulence_size: VarParam,
    pub turbulence_speed: VarParam,

    // 物理
    pub physics_type: PhysicsType,
    pub collide_terrain: bool,
    pub collide_static_objects: bool,
    pub collide_dynamic_objects: bool,
    /// 负值表示碰撞即死亡
    pub bounciness: f32,
    pub max_collision_events: u32,
    pub force_generation: ForceGeneration,
    pub force_dynamic_bounds: bool,

    // 音频
    pub start_trigger: String,
    pub stop_trigger: String,
}

impl_default!(EffectParams {
    enabled: true,
    count: VarParam::ZERO,
    continuous: false,
    spawn_delay: VarParam::ZERO,
    emitter_life_time: VarParam::ZERO,
    pulse_period: VarParam::ZERO,
    spawn_indirection: SpawnIndirection::None,
    maintain_density: 0.0,
    position_offset: Vec3::ZERO,
    random_offset: Vec3::ZERO,
    space_loop: false,
    bind_emitter_to_camera: false,
    camera_max_distance: 0.0,
    emit_offset_dir: false,
    move_relative_emitter: false,
    focus_gravity_dir: false,
    focus_camera_dir: false,
    focus_angle: VarParam::ZERO,
    focus_azimuth: VarParam::ZERO,
    emit_angle: VarParam::ZERO,
    facing: Facing::Camera,
    blend_type: BlendType::AlphaBased,
    connection: false,
    size: VarParam::fixed(1.0),
    alpha: VarParam::fixed(1.0),
    stretch: VarParam::ZERO,
    stretch_offset_ratio: 0.0,
    tail_steps: 0,
    tail_length: 0.0,
    geometry: None,
    geometry_pieces: GeometryPieces::Whole,
    material: None,
    cast_shadows: false,
    light_source: LightSource::default(),
    camera_distance_offset: 0.0,
    particle_life_time: VarParam::ZERO,
    remain_while_visible: false,
    speed: VarParam::ZERO,
    inherit_velocity: 0.0,
    air_resistance: VarParam::ZERO,
    wind_scale: 1.0,
    gravity_scale: VarParam::ZERO,
    acceleration: Vec3::ZERO,
    turbulence_3d_speed: VarParam::ZERO,
    turbulence_size: VarParam::ZERO,
    turbulence_speed: VarParam::ZERO,
    physics_type: PhysicsType::None,
    collide_terrain: false,
    collide_static_objects: false,
    collide_dynamic_objects: false,
    bounciness: 0.0,
    max_collision_events: 0,
    force_generation: ForceGeneration::None,
    force_dynamic_bounds: false,
    start_trigger: String::new(),
    stop_trigger: String::new(),
});

impl EffectParams {
    /// 校验参数，非法参数会使效果被禁用
    pub fn validate(&self, effect: &str) -> ParamResult<()> {
        let scalars = [
            ("count", self.count.max),
            ("particle_life_time", self.particle_life_time.max),
            ("emitter_life_time", self.emitter_life_time.max),
            ("spawn_delay", self.spawn_delay.max),
            ("pulse_period", self.pulse_period.max),
            ("size", self.size.max),
            ("air_resistance", self.air_resistance.max),
            ("tail_length", self.tail_length),
        ];
        for (field, value) in scalars {
            if !value.is_finite() {
                return Err(ParamError::NotFinite {
                    effect: effect.to_string(),
                    field,
                });
            }
            if value < 0.0 {
                return Err(ParamError::Negative {
                    effect: effect.to_string(),
                    field,
                    value,
                });
            }
        }
        for (field, v) in [
            ("position_offset", self.position_offset),
            ("random_offset", self.random_offset),
            ("acceleration", self.acceleration),
        ] {
            if !v.is_finite() {
                return Err(ParamError::NotFinite {
                    effect: effect.to_string(),
                    field,
                });
            }
        }
        if self.space_loop && self.emit_offset_bounds().volume() <= 0.0 {
            return Err(ParamError::ZeroSpaceLoopVolume {
                effect: effect.to_string(),
            });
        }
        Ok(())
    }

    /// 由参数推导环境标志
    pub fn compute_env_flags(&self, opts: &EnvFlagOptions) -> EnvFlags {
        let mut flags = EnvFlags::empty();
        if !self.enabled {
            return flags;
        }

        if self.facing == Facing::Water {
            flags |= EnvFlags::ENV_WATER;
        }
        if self.air_resistance.is_set() && self.wind_scale != 0.0 {
            flags |= EnvFlags::ENV_WIND;
        }
        if self.gravity_scale.is_set() || self.focus_gravity_dir {
            flags |= EnvFlags::ENV_GRAVITY;
        }
        if self.physics_type == PhysicsType::SimpleCollision {
            flags.set(EnvFlags::ENV_TERRAIN, self.collide_terrain);
            flags.set(EnvFlags::ENV_STATIC_ENT, self.collide_static_objects);
            flags.set(EnvFlags::ENV_DYNAMIC_ENT, self.collide_dynamic_objects);
            if flags.intersects(EnvFlags::ENV_COLLIDE_ANY) {
                flags |= EnvFlags::ENV_COLLIDE_INFO;
            }
        } else if self.physics_type >= PhysicsType::SimplePhysics && self.max_collision_events > 0 {
            flags |= EnvFlags::ENV_COLLIDE_INFO;
        }

        // 渲染
        if self.size.is_set() && self.alpha.is_set() {
            if self.geometry.is_some() {
                flags |= EnvFlags::REN_GEOMETRY;
            } else if self.material.is_some() {
                if self.facing == Facing::Decal {
                    flags |= EnvFlags::REN_DECAL;
                } else {
                    flags |= EnvFlags::REN_SPRITE;
                }
            }
            // 只有几何体粒子能投射阴影
            if self.cast_shadows && self.geometry.is_some() {
                flags |= EnvFlags::REN_CAST_SHADOWS;
            }
            if flags.intersects(EnvFlags::REN_SPRITE | EnvFlags::REN_GEOMETRY)
                && self.blend_type != BlendType::Additive
                && !self.connection
            {
                flags |= EnvFlags::REN_SORT;
            }
        }
        if self.light_source.intensity.is_set() && self.light_source.radius.is_set() {
            flags |= EnvFlags::REN_LIGHTS;
        }
        if !self.start_trigger.is_empty() || !self.stop_trigger.is_empty() {
            flags |= EnvFlags::EFF_AUDIO;
        }
        if self.force_generation != ForceGeneration::None {
            flags |= EnvFlags::EFF_FORCE;
        }

        let physics_needs_dynamic = opts.min_physics_dynamic_bounds != PhysicsType::None
            && self.physics_type >= opts.min_physics_dynamic_bounds;
        if !self.particle_life_time.is_set()
            || self.remain_while_visible
            || self.bind_emitter_to_camera
            || physics_needs_dynamic
            || self.force_dynamic_bounds
        {
            flags |= EnvFlags::EFF_DYNAMIC_BOUNDS;
        }
        if self.bind_emitter_to_camera {
            flags |= EnvFlags::REN_BIND_CAMERA;
        }
        flags
    }

    /// 本地空间的发射区域
    pub fn emit_offset_bounds(&self) -> Aabb {
        Aabb::new(
            self.position_offset - self.random_offset.abs(),
            self.position_offset + self.random_offset.abs(),
        )
    }

    /// 单个粒子最长寿命；寿命为 0 或可见时保留则视为无限
    pub fn max_particle_life(&self) -> f32 {
        if self.remain_while_visible || !self.particle_life_time.is_set() {
            f32::INFINITY
        } else {
            self.particle_life_time.max_value()
        }
    }

    /// 发射器最长寿命（含延迟）
    pub fn max_emitter_life(&self) -> f32 {
        let active = if !self.continuous {
            0.0
        } else if self.emitter_life_time.is_set() {
            self.emitter_life_time.max_value()
        } else {
            f32::INFINITY
        };
        self.spawn_delay.max_value() + active
    }

    /// 持续发射且会达到稳定粒子数
    pub fn has_equilibrium(&self) -> bool {
        self.continuous
            && !self.emitter_life_time.is_set()
            && self.particle_life_time.is_set()
            && !self.remain_while_visible
    }

    /// 单个粒子的最大可见尺寸
    pub fn max_visible_size(&self) -> f32 {
        let object_size = self.geometry.as_ref().map_or(1.0, |g| g.radius.max(0.0));
        let mut size = self.size.max_value() * object_size;
        if self.light_source.intensity.is_set() {
            size = size.max(self.light_source.radius.max_value());
        }
        size + self.camera_distance_offset.abs()
    }

    /// 无拖尾时的拉伸时间
    pub fn stretch_time(&self) -> f32 {
        if self.tail_steps == 0 {
            self.stretch.max_value() * (self.stretch_offset_ratio + 1.0).max(0.0)
        } else {
            0.0
        }
    }

    /// 是否有碰撞处理
    pub fn has_collision(&self) -> bool {
        self.physics_type == PhysicsType::SimpleCollision
            && (self.collide_terrain || self.collide_static_objects || self.collide_dynamic_objects)
    }
}
