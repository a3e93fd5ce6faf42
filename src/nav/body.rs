/// Reference vehicle body.
///
/// The navigation core only emits [`Actuation`]. This is a minimal kinematic
/// tracked hull that turns those signals into motion, so the demo and the
/// integration tests have something to drive. A real drivetrain replaces it.

use bevy::prelude::*;

use super::config::NavConfig;
use super::steering::Actuation;
use super::NavSet;

/// Yaw rate at full turn signal, radians per second.
pub const DEFAULT_TURN_RATE: f32 = 1.2;

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct TrackedBody {
    /// Ground speed at full throttle.
    pub max_speed: f32,
    /// Yaw rate at full turn signal, radians per second.
    pub turn_rate: f32,
}

impl TrackedBody {
    pub fn from_config(config: &NavConfig) -> Self {
        Self {
            max_speed: config.steering.max_speed,
            turn_rate: DEFAULT_TURN_RATE,
        }
    }

    /// Applies one step of `actuation`. Positive turn yaws right.
    pub fn integrate(&self, transform: &mut Transform, actuation: Actuation, dt: f32) {
        transform.rotate_y(-actuation.turn * self.turn_rate * dt);
        let forward = transform.forward();
        transform.translation += forward * actuation.throttle * self.max_speed * dt;
    }
}

pub struct VehicleBodyPlugin;

impl Plugin for VehicleBodyPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(FixedUpdate, integrate_bodies.after(NavSet::Drive));
    }
}

pub fn integrate_bodies(
    config: Res<NavConfig>,
    mut bodies: Query<(&mut Transform, &TrackedBody, &Actuation)>,
) {
    let dt = config.tick_delta();
    for (mut transform, body, actuation) in bodies.iter_mut() {
        body.integrate(&mut transform, *actuation, dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::math::signed_heading_error;

    #[test]
    fn full_throttle_moves_along_forward() {
        let body = TrackedBody { max_speed: 8.0, turn_rate: 1.0 };
        let mut transform = Transform::default();
        body.integrate(&mut transform, Actuation::new(1.0, 0.0), 0.5);
        assert!((transform.translation - Vec3::new(0.0, 0.0, -4.0)).length() < 1e-5);
    }

    #[test]
    fn positive_turn_yaws_right() {
        let body = TrackedBody { max_speed: 8.0, turn_rate: 1.0 };
        let mut transform = Transform::default();
        let before = transform.forward().as_vec3();
        body.integrate(&mut transform, Actuation::new(0.0, 1.0), 0.2);
        let after = transform.forward().as_vec3();
        assert!(signed_heading_error(before, after) > 0.0);
        assert_eq!(transform.translation, Vec3::ZERO);
    }
}
