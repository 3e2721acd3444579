//! 力与解析运动积分
//!
//! 重力、风与线性阻力共同作用下的运动有闭式解：
//!
//! ```text
//! Vterm = accel / drag + wind
//! V(t)  = (V0 - Vterm) e^(-d t) + Vterm
//! X(t)  = (V0 - Vterm)(1 - e^(-d t)) / d + Vterm t
//! ```
//!
//! `drag * t` 很小时指数形式数值不稳定，改用二阶近似。

use crate::math::{Aabb, Plane};
use glam::Vec3;

/// 低于此值的 `drag * t` 使用二阶近似
pub const DRAG_APPROX_THRESHOLD: f32 = 0.01;

/// 标准重力加速度
pub const STANDARD_GRAVITY: f32 = -9.81;

/// 作用在单个粒子上的合力参数
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ForceParams {
    /// 加速度（重力乘以重力系数再加上自身加速度）
    pub accel: Vec3,
    /// 风速（乘以风系数）
    pub wind: Vec3,
    /// 空气阻力系数
    pub drag: f32,
    /// 速度方向拉伸时间
    pub stretch: f32,
}

/// 均匀物理力：重力、风、水面
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhysForces {
    pub accel: Vec3,
    pub wind: Vec3,
    pub water: Option<Plane>,
}

impl PhysForces {
    pub const ZERO: PhysForces = PhysForces {
        accel: Vec3::ZERO,
        wind: Vec3::ZERO,
        water: None,
    };

    /// 只有重力的地表环境
    pub fn earth() -> Self {
        Self {
            accel: Vec3::new(0.0, 0.0, STANDARD_GRAVITY),
            ..Self::ZERO
        }
    }

    /// 叠加另一份力，按比例 `strength` 缩放；水面取更高的一个
    pub fn add(&mut self, other: &PhysForces, strength: f32) {
        self.accel += other.accel * strength;
        self.wind += other.wind * strength;
        if let Some(water) = other.water {
            match self.water {
                Some(current) if current.distance >= water.distance => {}
                _ => self.water = Some(water),
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        self.accel == Vec3::ZERO && self.wind == Vec3::ZERO && self.water.is_none()
    }
}

/// 闭式推进位置和速度 `t` 秒
pub fn travel(pos: &mut Vec3, vel: &mut Vec3, t: f32, forces: &ForceParams) {
    if forces.drag * t >= DRAG_APPROX_THRESHOLD {
        let inv_drag = 1.0 / forces.drag;
        let v_term = forces.accel * inv_drag + forces.wind;
        let decay = 1.0 - (-forces.drag * t).exp();
        *pos += v_term * t + (*vel - v_term) * (decay * inv_drag);
        *vel = vel.lerp(v_term, decay);
    } else {
        let accel = forces.accel + (forces.wind - *vel) * forces.drag;
        *pos += *vel * t + accel * (t * t * 0.5);
        *vel += accel * t;
    }
}

/// 沿轨迹的路程近似
///
/// 速率有极小值时在极小值处分成两段，每段用辛普森公式积分。
pub fn travel_distance_approx(vel0: Vec3, time: f32, forces: &ForceParams) -> f32 {
    if time <= 0.0 {
        return 0.0;
    }

    let mut vel = vel0;
    let mut dt = [time, 0.0];
    let mut speeds = [0.0f32; 5];
    speeds[0] = vel.length();
    let mut n = 1;

    if forces.drag * time >= DRAG_APPROX_THRESHOLD {
        let inv_drag = 1.0 / forces.drag;
        let v_term = forces.wind + forces.accel * inv_drag;

        // |V(t)|^2 的驻点：e^(-d t) = VT·(VT-V) / |VT-V|^2
        let dv = v_term - vel;
        let dd = dv.length_squared();
        let td = v_term.dot(dv);
        if dd * td > 0.0 {
            let t = -(td / dd).ln() * inv_drag;
            if t > 0.0 && t < time {
                dt = [t, time - t];
            }
        }

        for &seg in dt.iter().filter(|&&s| s > 0.0) {
            let decay = 1.0 - (-forces.drag * seg * 0.5).exp();
            for _ in 0..2 {
                vel = vel.lerp(v_term, decay);
                speeds[n] = vel.length();
                n += 1;
            }
        }
    } else {
        let accel = forces.accel + (forces.wind - vel) * forces.drag;
        let va = vel.dot(accel);
        let aa = accel.dot(accel);
        if va * aa < 0.0 && -va < time * aa {
            dt[0] = -va / aa;
            dt[1] = time - dt[0];
        }

        for &seg in dt.iter().filter(|&&s| s > 0.0) {
            let step = forces.accel * (seg * 0.5);
            for _ in 0..2 {
                vel += step;
                speeds[n] = vel.length();
                n += 1;
            }
        }
    }

    if n == 5 {
        ((speeds[0] + speeds[1] * 4.0 + speeds[2]) * dt[0]
            + (speeds[2] + speeds[3] * 4.0 + speeds[4]) * dt[1])
            / 6.0
    } else {
        (speeds[0] + speeds[1] * 4.0 + speeds[2]) / 6.0 * dt[0]
    }
}

/// 发射区域沿行程扫过的体积
pub fn travel_volume(source: &Aabb, travel_bb: &Aabb, dist: f32, size: f32) -> f32 {
    let v = source.size() + travel_bb.size() + Vec3::splat(size);
    let t = travel_bb.center().abs().normalize_or_zero() * dist;
    v.x * v.y * v.z + v.x * v.y * t.z + v.x * t.y * v.z + t.x * v.y * v.z
}

fn add_travel_vec(bb: &mut Aabb, vel: Vec3, forces: &ForceParams, time: f32) {
    let mut pos = Vec3::ZERO;
    let mut v = vel;
    travel(&mut pos, &mut v, time, forces);
    bb.add_point(pos + v * forces.stretch);
}

/// 把初速度为 `vel` 的轨迹加入包围盒
///
/// `axes` 的第 i 位为 1 时解析求出第 i 轴速度为 0 的时刻，把该轴的极值点也加入。
pub fn add_travel(bb: &mut Aabb, vel: Vec3, forces: &ForceParams, time: f32, axes: u32) {
    if forces.stretch != 0.0 {
        bb.add_point(vel * forces.stretch);
    }

    add_travel_vec(bb, vel, forces, time);

    for i in 0..3 {
        if axes & (1 << i) == 0 {
            continue;
        }
        let extreme = if forces.drag != 0.0 {
            // (1 - d s)(v0 - vt) e^(-d t) + vt = 0
            let inv_drag = 1.0 / forces.drag;
            let vt = forces.accel[i] * inv_drag + forces.wind[i];
            let d = (vt - vel[i]) * (1.0 - forces.drag * forces.stretch);
            (vt * d > 0.0).then(|| -(vt / d).ln() * inv_drag)
        } else if forces.accel[i] != 0.0 {
            // v0 + a (t + s) = 0
            Some(-vel[i] / forces.accel[i] - forces.stretch)
        } else {
            None
        };

        if let Some(t) = extreme {
            if t > 0.0 && t < time {
                add_travel_vec(bb, vel, forces, t);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gravity_only() -> ForceParams {
        ForceParams {
            accel: Vec3::new(0.0, 0.0, STANDARD_GRAVITY),
            ..Default::default()
        }
    }

    #[test]
    fn test_travel_without_drag_is_exact_quadratic() {
        let mut pos = Vec3::ZERO;
        let mut vel = Vec3::new(0.0, 0.0, 10.0);
        travel(&mut pos, &mut vel, 1.0, &gravity_only());

        assert!((vel.z - (10.0 + STANDARD_GRAVITY)).abs() < 1e-5);
        assert!((pos.z - (10.0 + 0.5 * STANDARD_GRAVITY)).abs() < 1e-5);
        assert_eq!(pos.x, 0.0);
    }

    #[test]
    fn test_travel_with_drag_approaches_terminal_velocity() {
        let forces = ForceParams {
            drag: 2.0,
            ..gravity_only()
        };
        let mut pos = Vec3::ZERO;
        let mut vel = Vec3::ZERO;
        travel(&mut pos, &mut vel, 20.0, &forces);

        let terminal = STANDARD_GRAVITY / 2.0;
        assert!((vel.z - terminal).abs() < 1e-3);
        assert!(pos.z < 0.0);
    }

    #[test]
    fn test_travel_small_drag_is_continuous_with_exact_form() {
        let forces = ForceParams {
            drag: DRAG_APPROX_THRESHOLD,
            wind: Vec3::new(3.0, 0.0, 0.0),
            ..gravity_only()
        };
        let vel0 = Vec3::new(1.0, 2.0, 5.0);

        let (mut p_exact, mut v_exact) = (Vec3::ZERO, vel0);
        travel(&mut p_exact, &mut v_exact, 1.0, &forces);

        let (mut p_approx, mut v_approx) = (Vec3::ZERO, vel0);
        travel(&mut p_approx, &mut v_approx, 0.999, &forces);

        assert!((p_exact - p_approx).length() < 0.02);
        assert!((v_exact - v_approx).length() < 0.02);
    }

    #[test]
    fn test_distance_of_straight_line() {
        let d = travel_distance_approx(Vec3::new(3.0, 4.0, 0.0), 2.0, &ForceParams::default());
        assert!((d - 10.0).abs() < 1e-4);
        assert_eq!(travel_distance_approx(Vec3::X, 0.0, &ForceParams::default()), 0.0);
    }

    #[test]
    fn test_distance_with_turnaround() {
        // 上抛后回落：路程 = 上升高度 + 下落高度
        let forces = ForceParams {
            accel: Vec3::new(0.0, 0.0, -10.0),
            ..Default::default()
        };
        let d = travel_distance_approx(Vec3::new(0.0, 0.0, 10.0), 2.0, &forces);
        assert!((d - 10.0).abs() < 0.05, "distance {d}");
    }

    #[test]
    fn test_add_travel_includes_apex() {
        let mut bb = Aabb::from_point(Vec3::ZERO);
        add_travel(&mut bb, Vec3::new(0.0, 0.0, 10.0), &gravity_only(), 3.0, 0b111);

        let apex = 10.0 * 10.0 / (2.0 * -STANDARD_GRAVITY);
        assert!((bb.max.z - apex).abs() < 1e-3);
        assert!(bb.min.z < 0.0);
    }

    #[test]
    fn test_phys_forces_add_keeps_highest_water() {
        let mut forces = PhysForces::earth();
        forces.add(
            &PhysForces {
                wind: Vec3::X,
                water: Some(Plane::horizontal(1.0)),
                ..PhysForces::ZERO
            },
            0.5,
        );
        forces.add(
            &PhysForces {
                water: Some(Plane::horizontal(0.5)),
                ..PhysForces::ZERO
            },
            1.0,
        );
        assert_eq!(forces.wind, Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(forces.water.map(|w| w.distance), Some(1.0));
    }
}
