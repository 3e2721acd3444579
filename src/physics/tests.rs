#[cfg(test)]
mod property_tests {
    use crate::effect::{EffectParams, StaticBoundsOpts, VarParam};
    use crate::math::{Aabb, Location};
    use crate::physics::*;
    use glam::{Quat, Vec3};
    use proptest::prelude::*;

    fn vec3(range: f32) -> impl Strategy<Value = Vec3> {
        (-range..range, -range..range, -range..range).prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    proptest! {
        #[test]
        fn travel_stays_inside_travel_bounds(
            vel in vec3(20.0),
            wind in vec3(5.0),
            gravity in -20.0f32..0.0,
            drag in prop_oneof![Just(0.0f32), 0.1f32..3.0],
            time in 0.1f32..5.0,
            frac in 0.0f32..1.0,
        ) {
            let forces = ForceParams {
                accel: Vec3::new(0.0, 0.0, gravity),
                wind,
                drag,
                stretch: 0.0,
            };
            let mut bb = Aabb::from_point(Vec3::ZERO);
            add_travel(&mut bb, vel, &forces, time, 0b111);

            let mut pos = Vec3::ZERO;
            let mut v = vel;
            travel(&mut pos, &mut v, time * frac, &forces);

            let tolerance = 0.01 + pos.length() * 1e-3;
            let mut loose = bb;
            loose.expand(Vec3::splat(tolerance));
            prop_assert!(loose.contains_point(pos), "{:?} not in {:?}", pos, bb);
        }

        #[test]
        fn static_bounds_are_idempotent(
            pos in vec3(100.0),
            yaw in -3.0f32..3.0,
            speed in 0.0f32..20.0,
            life in 0.1f32..10.0,
            gravity_scale in 0.0f32..2.0,
            drag in prop_oneof![Just(0.0f32), 0.1f32..2.0],
        ) {
            let params = EffectParams {
                count: VarParam::fixed(10.0),
                particle_life_time: VarParam::fixed(life),
                speed: VarParam::new(speed, 0.5),
                gravity_scale: VarParam::fixed(gravity_scale),
                air_resistance: VarParam::fixed(drag),
                emit_angle: VarParam::fixed(30.0),
                ..Default::default()
            };
            let loc = Location::new(Quat::from_rotation_z(yaw), pos, 1.0);
            let forces = PhysForces::earth();
            let opts = StaticBoundsOpts::default();

            let first = params.static_bounds(&loc, &forces, &opts);
            let second = params.static_bounds(&loc, &forces, &opts);
            prop_assert_eq!(first, second);
            prop_assert!(!first.is_reset());
            prop_assert!(first.contains_point(pos));
            prop_assert!(first.volume() >= 0.0);
        }
    }
}
