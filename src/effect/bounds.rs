//! 解析静态包围盒与密度补偿
//!
//! 不模拟任何粒子：对代表性的极端发射方向（坐标轴、重力方向、风向）用闭式轨迹
//! 求出最远到达点，再加上湍流、粒子尺寸和 10% 的安全余量。

use super::params::EffectParams;
use crate::math::{max_abs_component, Aabb, Location};
use crate::physics::{add_travel, travel, travel_distance_approx, travel_volume, ForceParams, PhysForces};
use glam::{EulerRot, Quat, Vec3};
use std::f32::consts::PI;

/// 行程包围盒的安全系数
pub const TRAVEL_SAFETY: f32 = 0.1;
/// 粒子尺寸的安全系数
pub const SIZE_SAFETY: f32 = 0.1;
/// 相对发射器运动时的固定扩展（米）
pub const MOVE_RELATIVE_EXPANSION: f32 = 0.01;

/// 发射锥：轴向、夹角余弦范围与速率范围
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitCone {
    pub axis: Vec3,
    pub cos_min: f32,
    pub cos_max: f32,
    pub speed_min: f32,
    pub speed_max: f32,
}

impl EmitCone {
    pub fn set_omni_dir(&mut self) {
        self.cos_min = -1.0;
        self.cos_max = 1.0;
    }

    pub fn is_omni_dir(&self) -> bool {
        self.cos_min <= -1.0 && self.cos_max >= 1.0
    }

    pub fn is_single_dir(&self) -> bool {
        self.cos_min >= 1.0
    }

    /// 锥内最接近 `ref_dir` 的发射速度
    ///
    /// 与参考方向同侧时取最大速率，反向时取最小速率。
    pub fn extreme_emit_vec(&self, ref_dir: Vec3) -> Vec3 {
        let emit_cos = ref_dir.dot(self.axis);
        if emit_cos >= self.cos_min && emit_cos <= self.cos_max {
            return ref_dir * self.speed_max;
        }

        let perp = ref_dir - self.axis * emit_cos;
        let perp_len_sq = perp.length_squared();
        let cos = emit_cos.clamp(self.cos_min, self.cos_max);
        let dir = self.axis * cos + perp * ((1.0 - cos * cos) / (perp_len_sq + f32::MIN_POSITIVE)).sqrt();
        let speed = if dir.dot(ref_dir) >= 0.0 {
            self.speed_max
        } else {
            self.speed_min
        };
        dir * speed
    }

    fn add_emit_dirs(&self, bb: &mut Aabb, ref_dir: Vec3, forces: &ForceParams, time: f32, axes: u32) {
        add_travel(bb, self.extreme_emit_vec(ref_dir), forces, time, axes);
        add_travel(bb, self.extreme_emit_vec(-ref_dir), forces, time, axes);
    }

    /// 发射锥在合力作用下 `time` 秒内扫过的包围盒
    pub fn travel_bb(&self, bb: &mut Aabb, forces: &ForceParams, time: f32, axes: u32) {
        if self.speed_max == 0.0 {
            add_travel(bb, Vec3::ZERO, forces, time, axes);
            return;
        }
        if self.is_single_dir() {
            add_travel(bb, self.axis * self.speed_max, forces, time, axes);
            if self.speed_min != self.speed_max {
                add_travel(bb, self.axis * self.speed_min, forces, time, axes);
            }
            return;
        }

        self.add_emit_dirs(bb, Vec3::X, forces, time, axes & 1);
        self.add_emit_dirs(bb, Vec3::Y, forces, time, axes & 2);
        self.add_emit_dirs(bb, Vec3::Z, forces, time, axes & 4);

        // 重力方向和风向不与坐标轴重合时补充两个极端方向
        if let Some(dir) = forces.accel.try_normalize() {
            if max_abs_component(dir) < 0.999 {
                self.add_emit_dirs(bb, dir, forces, time, 0);
            }
        }
        if forces.drag > 0.0 {
            if let Some(dir) = forces.wind.try_normalize() {
                if max_abs_component(dir) < 0.999 {
                    self.add_emit_dirs(bb, dir, forces, time, 0);
                }
            }
        }
    }
}

/// 静态包围盒计算选项
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticBoundsOpts {
    /// 发射区域额外扩展（父粒子尺寸等）
    pub spawn_size: Vec3,
    pub speed_scale: f32,
    /// 粒子寿命上限，通常为容器剩余寿命
    pub max_life: f32,
    /// 是否计入粒子尺寸
    pub with_size: bool,
    /// 父发射方向的额外角度（弧度）
    pub ang_max: f32,
}

impl Default for StaticBoundsOpts {
    fn default() -> Self {
        Self {
            spawn_size: Vec3::ZERO,
            speed_scale: 1.0,
            max_life: f32::INFINITY,
            with_size: true,
            ang_max: 0.0,
        }
    }
}

impl EffectParams {
    /// 发射锥参数
    pub fn emit_cone(&self, loc: &Location, forces: &PhysForces, opts: &StaticBoundsOpts) -> EmitCone {
        let mut cone = EmitCone {
            axis: if self.focus_gravity_dir {
                (-forces.accel).try_normalize().unwrap_or(Vec3::NEG_Z)
            } else {
                loc.rotation * Vec3::Y
            },
            cos_min: 1.0,
            cos_max: 1.0,
            speed_min: 0.0,
            speed_max: 0.0,
        };

        if self.focus_camera_dir {
            cone.set_omni_dir();
        } else if self.focus_angle.is_set() {
            let angle_max = self.focus_angle.max_value().to_radians();
            let angle_min = self.focus_angle.min_value().to_radians();
            let azimuth_max = self.focus_azimuth.max_value().to_radians();
            let azimuth_min = self.focus_azimuth.min_value().to_radians();

            cone.cos_max = self.emit_angle.min_value().to_radians().cos();
            cone.cos_min = (opts.ang_max
                + self.emit_angle.max_value().to_radians()
                + (angle_max - angle_min + azimuth_max - azimuth_min) * 0.5)
                .min(PI)
                .cos();

            let focus = Quat::from_euler(
                EulerRot::XYZ,
                (angle_min + angle_max) * 0.5,
                (azimuth_min + azimuth_max) * 0.5,
                0.0,
            );
            cone.axis = (loc.rotation * focus) * Vec3::Y;
        } else {
            cone.cos_max = self.emit_angle.min_value().to_radians().cos();
            cone.cos_min = self.emit_angle.max_value().to_radians().cos();
        }

        if self.emit_offset_dir {
            let bb = self.emit_offset_bounds();
            if bb.max.z > 0.0 {
                cone.cos_max = 1.0;
            }
            if bb.min.z < 0.0 {
                cone.cos_min = -1.0;
            } else if bb.min.x < 0.0 || bb.max.x > 0.0 || bb.min.y < 0.0 || bb.max.y > 0.0 {
                cone.cos_min = cone.cos_min.min(0.0);
            }
        }

        cone.speed_min = self.speed.min_value() * loc.scale * opts.speed_scale;
        cone.speed_max = self.speed.max_value() * loc.scale * opts.speed_scale;
        cone
    }

    /// 行程时间：选项上限与粒子寿命取小；无限时返回 `None`
    fn travel_time(&self, opts: &StaticBoundsOpts) -> Option<f32> {
        let time = opts.max_life.min(self.max_particle_life());
        (time > 0.0 && time.is_finite()).then_some(time)
    }

    /// 静态包围盒
    ///
    /// 纯函数：同样的参数、位置和力总得到同样的盒。
    pub fn static_bounds(&self, loc: &Location, forces: &PhysForces, opts: &StaticBoundsOpts) -> Aabb {
        let mut local = self.emit_offset_bounds();
        if self.space_loop && self.bind_emitter_to_camera {
            local.max.y = local.max.y.max(self.camera_max_distance);
        }

        let mut bb = local.transformed(loc);
        bb.expand(opts.spawn_size);

        if !self.space_loop {
            let mut trav = Aabb::from_point(Vec3::ZERO);
            self.max_travel_bounds(&mut trav, loc, forces, opts);
            trav.min *= 1.0 + TRAVEL_SAFETY;
            trav.max *= 1.0 + TRAVEL_SAFETY;
            bb.augment(&trav);
        }

        if self.facing == super::params::Facing::Water {
            if let Some(water) = forces.water {
                // 压到水面上
                let dist0 = bb.min.z - water.distance_to_point(bb.min);
                let dist_d = (water.normal.x * (bb.max.x - bb.min.x)).abs()
                    + (water.normal.y * (bb.max.y - bb.min.y)).abs();
                bb.min.z = dist0 - dist_d;
                bb.max.z = dist0 + dist_d;
            }
        }

        if opts.with_size {
            let size = self.max_visible_size() * loc.scale * (1.0 + SIZE_SAFETY);
            bb.expand(Vec3::splat(size));
        }
        if self.move_relative_emitter {
            bb.expand(Vec3::splat(MOVE_RELATIVE_EXPANSION));
        }
        bb
    }

    /// 所有阻力、重力系数极值组合下的最大行程
    pub fn max_travel_bounds(
        &self,
        bb: &mut Aabb,
        loc: &Location,
        forces: &PhysForces,
        opts: &StaticBoundsOpts,
    ) {
        let Some(time) = self.travel_time(opts) else {
            return;
        };

        let cone = self.emit_cone(loc, forces, opts);
        let mut force = ForceParams {
            wind: forces.wind * self.wind_scale,
            stretch: self.stretch_time(),
            ..Default::default()
        };

        let drags = [self.air_resistance.max_value(), self.air_resistance.min_value()];
        let gravs = [self.gravity_scale.max_value(), self.gravity_scale.min_value()];
        let drag_count = if drags[0] != drags[1] { 2 } else { 1 };
        let grav_count = if gravs[0] != gravs[1] { 2 } else { 1 };
        for &drag in &drags[..drag_count] {
            force.drag = drag;
            for &grav in &gravs[..grav_count] {
                force.accel = forces.accel * grav + self.acceleration * loc.scale;
                cone.travel_bb(bb, &force, time, 0b111);
            }
        }

        if self.turbulence_3d_speed.is_set() {
            // a = T t^-1/2，位移 = T/2 t^3/2
            let accel = self.turbulence_3d_speed.max_value() / time.sqrt() * (1.0 + TRAVEL_SAFETY);
            let turb = ForceParams {
                accel: Vec3::splat(accel),
                wind: Vec3::ZERO,
                drag: self.air_resistance.min_value(),
                stretch: 0.0,
            };
            let mut pos = Vec3::ZERO;
            let mut vel = Vec3::ZERO;
            travel(&mut pos, &mut vel, time, &turb);
            bb.expand(pos.abs());
        }

        if self.turbulence_speed.is_set() {
            let vortex = self.turbulence_size.max_value() * loc.scale;
            bb.expand(Vec3::splat(vortex));
        }
    }

    /// 平均发射方向的行程盒（世界坐标）与沿轨迹的路程
    pub fn travel_bounds(
        &self,
        bb: &mut Aabb,
        loc: &Location,
        forces: &ForceParams,
        opts: &StaticBoundsOpts,
    ) -> f32 {
        let Some(time) = self.travel_time(opts) else {
            bb.reset();
            return 0.0;
        };

        let phys = PhysForces {
            accel: forces.accel,
            wind: forces.wind,
            water: None,
        };
        let cone = self.emit_cone(loc, &phys, opts);

        bb.reset();
        cone.travel_bb(bb, forces, time, 0);
        bb.translate(loc.translation);

        travel_distance_approx(
            cone.axis * (cone.speed_max + cone.speed_min) * 0.5,
            time,
            forces,
        )
    }

    /// 粒子群在发射器本地空间扫过的体积
    ///
    /// 发射器运动等价于整段行程向反方向平移。
    fn swept_volume(&self, forces: &ForceParams, emitter_vel: Vec3, opts: &StaticBoundsOpts) -> f32 {
        let source = self.emit_offset_bounds();
        let mut trav = Aabb::RESET;
        let mut dist = self.travel_bounds(&mut trav, &Location::IDENTITY, forces, opts);
        if trav.is_reset() {
            trav = Aabb::from_point(Vec3::ZERO);
        }
        if let Some(time) = self.travel_time(opts) {
            let shift = -emitter_vel * time;
            if shift != Vec3::ZERO {
                let mut moved = trav;
                moved.translate(shift);
                trav.add_box(&moved);
                dist += shift.length();
            }
        }
        travel_volume(&source, &trav, dist, self.max_visible_size())
    }

    /// 密度补偿系数
    ///
    /// 标准情形（单位变换、发射器静止、均匀力）与本帧实际扫过体积之比，
    /// 夹在 `[1, max_adjust]` 内。`emitter_vel` 与 `local_forces` 都在发射器本地空间。
    pub fn compute_density_increase(
        &self,
        standard_forces: &ForceParams,
        local_forces: &ForceParams,
        emitter_vel: Vec3,
        opts: &StaticBoundsOpts,
        max_adjust: f32,
    ) -> f32 {
        if self.maintain_density <= 0.0 {
            return 1.0;
        }
        let standard = self.swept_volume(standard_forces, Vec3::ZERO, opts);
        if standard <= 0.0 {
            return 1.0;
        }
        let actual = self.swept_volume(local_forces, emitter_vel, opts);
        (actual / standard).clamp(1.0, max_adjust.max(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::params::{Facing, VarParam};
    use crate::math::Plane;
    use crate::physics::STANDARD_GRAVITY;

    fn fountain() -> EffectParams {
        EffectParams {
            count: VarParam::fixed(20.0),
            continuous: true,
            particle_life_time: VarParam::fixed(2.0),
            speed: VarParam::new(10.0, 0.5),
            emit_angle: VarParam::new(30.0, 1.0),
            gravity_scale: VarParam::fixed(1.0),
            size: VarParam::fixed(0.5),
            material: Some("spark".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_extreme_emit_vec_inside_and_outside_cone() {
        let cone = EmitCone {
            axis: Vec3::Z,
            cos_min: 0.5,
            cos_max: 1.0,
            speed_min: 1.0,
            speed_max: 2.0,
        };
        assert_eq!(cone.extreme_emit_vec(Vec3::Z), Vec3::Z * 2.0);

        // X 在锥外：取锥面上最接近 X 的方向，与 X 同侧用最大速率
        let v = cone.extreme_emit_vec(Vec3::X);
        assert!((v.length() - 2.0).abs() < 1e-4);
        assert!((v.normalize().dot(Vec3::Z) - 0.5).abs() < 1e-4);
        assert!(v.x > 0.0);
    }

    #[test]
    fn test_static_bounds_contains_simulated_trajectories() {
        let params = fountain();
        let loc = Location::new(
            Quat::from_rotation_x(std::f32::consts::FRAC_PI_2),
            Vec3::new(5.0, 5.0, 0.0),
            1.0,
        );
        let forces = PhysForces::earth();
        let bb = params.static_bounds(&loc, &forces, &StaticBoundsOpts::default());

        // 沿锥轴和锥边发射，逐步检查轨迹都在盒内
        let cone = params.emit_cone(&loc, &forces, &StaticBoundsOpts::default());
        let fp = ForceParams {
            accel: forces.accel,
            ..Default::default()
        };
        for dir in [cone.axis, (cone.axis + Vec3::X * 0.5).normalize()] {
            for speed in [cone.speed_min, cone.speed_max] {
                for step in 0..=20 {
                    let t = step as f32 * 0.1;
                    let mut pos = loc.translation;
                    let mut vel = dir * speed;
                    travel(&mut pos, &mut vel, t, &fp);
                    assert!(bb.contains_point(pos), "{pos:?} outside {bb:?}");
                }
            }
        }
    }

    #[test]
    fn test_static_bounds_idempotent() {
        let params = fountain();
        let loc = Location::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let forces = PhysForces::earth();
        let opts = StaticBoundsOpts::default();
        assert_eq!(
            params.static_bounds(&loc, &forces, &opts),
            params.static_bounds(&loc, &forces, &opts)
        );
    }

    #[test]
    fn test_static_bounds_include_size_and_apex() {
        let params = EffectParams {
            speed: VarParam::fixed(10.0),
            emit_angle: VarParam::ZERO,
            ..fountain()
        };
        // 绕 X 轴转 90 度，发射轴从 +Y 转到 +Z
        let loc = Location::new(Quat::from_rotation_x(std::f32::consts::FRAC_PI_2), Vec3::ZERO, 1.0);
        let bb = params.static_bounds(&loc, &PhysForces::earth(), &StaticBoundsOpts::default());

        let apex = 100.0 / (2.0 * -STANDARD_GRAVITY);
        let size = 0.5 * (1.0 + SIZE_SAFETY);
        assert!((bb.max.z - (apex * (1.0 + TRAVEL_SAFETY) + size)).abs() < 1e-3);
    }

    #[test]
    fn test_space_loop_skips_travel() {
        let params = EffectParams {
            space_loop: true,
            random_offset: Vec3::splat(5.0),
            ..fountain()
        };
        let opts = StaticBoundsOpts {
            with_size: false,
            ..Default::default()
        };
        let bb = params.static_bounds(&Location::IDENTITY, &PhysForces::earth(), &opts);
        assert_eq!(bb, Aabb::new(Vec3::splat(-5.0), Vec3::splat(5.0)));
    }

    #[test]
    fn test_water_facing_snaps_to_plane() {
        let params = EffectParams {
            facing: Facing::Water,
            ..fountain()
        };
        let forces = PhysForces {
            water: Some(Plane::horizontal(3.0)),
            ..PhysForces::earth()
        };
        let opts = StaticBoundsOpts {
            with_size: false,
            ..Default::default()
        };
        let bb = params.static_bounds(&Location::IDENTITY, &forces, &opts);
        assert!((bb.min.z - 3.0).abs() < 1e-4);
        assert!((bb.max.z - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_density_increase_for_moving_emitter() {
        let params = EffectParams {
            maintain_density: 1.0,
            random_offset: Vec3::splat(0.5),
            ..fountain()
        };
        let forces = ForceParams {
            accel: Vec3::new(0.0, 0.0, STANDARD_GRAVITY),
            ..Default::default()
        };
        let opts = StaticBoundsOpts::default();

        let still = params.compute_density_increase(&forces, &forces, Vec3::ZERO, &opts, 32.0);
        assert!((still - 1.0).abs() < 1e-4);

        let moving =
            params.compute_density_increase(&forces, &forces, Vec3::new(30.0, 0.0, 0.0), &opts, 32.0);
        assert!(moving > 1.0 && moving <= 32.0);

        let disabled = EffectParams {
            maintain_density: 0.0,
            ..params
        };
        assert_eq!(
            disabled.compute_density_increase(&forces, &forces, Vec3::X * 30.0, &opts, 32.0),
            1.0
        );
    }
}
