//! 环境与渲染能力标志
//!
//! 每个效果节点在参数变化时重新计算一次，用于跳过代价高的逐帧工作。

use bitflags::bitflags;

bitflags! {
    /// 效果所需的环境、渲染和附加能力
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EnvFlags: u32 {
        /// 受重力影响
        const ENV_GRAVITY        = 1 << 0;
        /// 受风影响
        const ENV_WIND           = 1 << 1;
        /// 需要水面
        const ENV_WATER          = 1 << 2;
        /// 与地形碰撞
        const ENV_TERRAIN        = 1 << 3;
        /// 与静态物体碰撞
        const ENV_STATIC_ENT     = 1 << 4;
        /// 与动态物体碰撞
        const ENV_DYNAMIC_ENT    = 1 << 5;
        /// 需要碰撞事件信息
        const ENV_COLLIDE_INFO   = 1 << 6;

        /// 精灵渲染
        const REN_SPRITE         = 1 << 8;
        /// 几何体渲染
        const REN_GEOMETRY       = 1 << 9;
        /// 贴花渲染
        const REN_DECAL          = 1 << 10;
        /// 粒子光源
        const REN_LIGHTS         = 1 << 11;
        /// 投射阴影
        const REN_CAST_SHADOWS   = 1 << 12;
        /// 需要按相机距离排序
        const REN_SORT           = 1 << 13;
        /// 发射器绑定相机
        const REN_BIND_CAMERA    = 1 << 14;

        /// 音频触发器
        const EFF_AUDIO          = 1 << 16;
        /// 生成物理力场
        const EFF_FORCE          = 1 << 17;
        /// 需要逐帧动态包围盒
        const EFF_DYNAMIC_BOUNDS = 1 << 18;

        const ENV_PHYS_AREA = Self::ENV_GRAVITY.bits() | Self::ENV_WIND.bits() | Self::ENV_WATER.bits();
        const ENV_COLLIDE_ANY = Self::ENV_TERRAIN.bits() | Self::ENV_STATIC_ENT.bits() | Self::ENV_DYNAMIC_ENT.bits();
        const ENV_COLLIDE_PHYSICS = Self::ENV_STATIC_ENT.bits() | Self::ENV_DYNAMIC_ENT.bits();
        const REN_ANY = Self::REN_SPRITE.bits() | Self::REN_GEOMETRY.bits() | Self::REN_DECAL.bits() | Self::REN_LIGHTS.bits();
        const EFF_ANY = Self::EFF_AUDIO.bits() | Self::EFF_FORCE.bits();
    }
}

impl EnvFlags {
    /// 是否需要逐帧查询非均匀力场
    pub fn needs_phys_area(self) -> bool {
        self.intersects(Self::ENV_PHYS_AREA)
    }

    /// 是否会产生可渲染输出
    pub fn renders(self) -> bool {
        self.intersects(Self::REN_ANY)
    }
}
