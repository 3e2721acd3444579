//! 每帧统计

use std::ops::AddAssign;

/// 一类对象的数量
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatCounts {
    pub alloc: f32,
    pub alive: f32,
    pub updated: f32,
    pub rendered: f32,
}

impl AddAssign for StatCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.alloc += rhs.alloc;
        self.alive += rhs.alive;
        self.updated += rhs.updated;
        self.rendered += rhs.rendered;
    }
}

/// 粒子数量，附加拒绝、碰撞和裁剪
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParticleStatCounts {
    pub alloc: f32,
    pub alive: f32,
    pub updated: f32,
    pub rendered: f32,
    /// 池满被丢弃
    pub reject: f32,
    pub collide: f32,
    /// 渲染时被视锥剔除
    pub clip: f32,
}

impl AddAssign for ParticleStatCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.alloc += rhs.alloc;
        self.alive += rhs.alive;
        self.updated += rhs.updated;
        self.rendered += rhs.rendered;
        self.reject += rhs.reject;
        self.collide += rhs.collide;
        self.clip += rhs.clip;
    }
}

/// 包围盒体积统计
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VolumeStats {
    pub stat: f32,
    pub dyn_: f32,
    /// 动态盒超出世界盒的体积
    pub error: f32,
}

impl AddAssign for VolumeStats {
    fn add_assign(&mut self, rhs: Self) {
        self.stat += rhs.stat;
        self.dyn_ += rhs.dyn_;
        self.error += rhs.error;
    }
}

/// 粒子系统统计
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParticleCounts {
    pub emitters: StatCounts,
    pub sub_emitters: StatCounts,
    pub components: StatCounts,
    pub particles: ParticleStatCounts,
    pub volume: VolumeStats,
    /// 动态包围盒未被世界盒包含的次数
    pub bounds_errors: f32,
}

impl AddAssign for ParticleCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.emitters += rhs.emitters;
        self.sub_emitters += rhs.sub_emitters;
        self.components += rhs.components;
        self.particles += rhs.particles;
        self.volume += rhs.volume;
        self.bounds_errors += rhs.bounds_errors;
    }
}

impl ParticleCounts {
    /// 取出并清零
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}
