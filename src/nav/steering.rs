/// Steering controller: turns a sub-target and the avoidance result into
/// normalized throttle and turn signals.
///
/// Desired speed starts at the configured maximum and is scaled down by
/// heading error, proximity to the final destination, obstacles ahead and a
/// narrow-path flag. The actual speed is moved toward it at a fixed
/// acceleration so the vehicle never jumps between speeds.

use bevy::prelude::*;

use super::config::NavConfig;
use super::math::{flatten, horizontal_distance, signed_heading_error};
use super::obstacles::AvoidanceOutcome;

/// Normalized drive command handed to the vehicle body each tick.
///
/// `throttle` is forward (negative reverses); `turn` is positive to the right.
#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct Actuation {
    pub throttle: f32,
    pub turn: f32,
}

impl Actuation {
    pub const IDLE: Self = Self { throttle: 0.0, turn: 0.0 };

    /// Builds a command with both signals clamped to `[-1, 1]`.
    pub fn new(throttle: f32, turn: f32) -> Self {
        Self {
            throttle: throttle.clamp(-1.0, 1.0),
            turn: turn.clamp(-1.0, 1.0),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.throttle == 0.0 && self.turn == 0.0
    }
}

/// Where to drive this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriveTarget {
    /// Immediate sub-target (path vertex or waypoint node).
    pub point: Vec3,
    /// Final destination, for the arrival slowdown.
    pub destination: Option<Vec3>,
    /// Extra speed cap, e.g. a waypoint speed limit.
    pub speed_cap: Option<f32>,
    /// Following a path flagged as narrow.
    pub narrow: bool,
}

impl DriveTarget {
    pub fn toward(point: Vec3) -> Self {
        Self {
            point,
            destination: None,
            speed_cap: None,
            narrow: false,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SteeringController {
    speed: f32,
    heading_error: f32,
}

impl SteeringController {
    /// Current commanded forward speed.
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Last signed heading error in radians.
    pub fn heading_error(&self) -> f32 {
        self.heading_error
    }

    /// Drops the commanded speed to zero.
    pub fn halt(&mut self) {
        self.speed = 0.0;
        self.heading_error = 0.0;
    }

    pub fn drive(
        &mut self,
        position: Vec3,
        forward: Vec3,
        target: &DriveTarget,
        avoidance: &AvoidanceOutcome,
        dt: f32,
        config: &NavConfig,
    ) -> Actuation {
        let cfg = &config.steering;

        if let Some(turn) = avoidance.reverse_turn {
            self.halt();
            return Actuation::new(-config.avoidance.reverse_throttle, turn);
        }

        let to_target = flatten(target.point - position).normalize_or_zero();
        let desired_dir = if avoidance.steer == Vec3::ZERO {
            to_target
        } else {
            (to_target + avoidance.steer * config.avoidance.strength).normalize_or(to_target)
        };

        let error = signed_heading_error(forward, desired_dir);
        self.heading_error = error;
        let abs_error = error.abs();
        let slow_turn = cfg.slow_turn_deg.to_radians();
        let sharp_turn = cfg.sharp_turn_deg.to_radians();

        let mut factor = 1.0;
        if abs_error > slow_turn {
            let span = (sharp_turn - slow_turn).max(f32::EPSILON);
            let t = ((abs_error - slow_turn) / span).clamp(0.0, 1.0);
            factor *= (1.0 - t * t).max(cfg.min_turn_speed_factor);
        }
        if let Some(destination) = target.destination {
            let remaining = horizontal_distance(position, destination);
            if remaining < cfg.slowdown_radius {
                factor *= (remaining / cfg.slowdown_radius).max(cfg.min_arrival_speed_factor);
            }
        }
        factor *= avoidance.speed_factor;
        if target.narrow {
            factor *= config.planner.narrow_speed_factor;
        }

        let mut desired_speed = cfg.max_speed * factor;
        if let Some(cap) = target.speed_cap {
            desired_speed = desired_speed.min(cap);
        }
        let step = cfg.acceleration * dt;
        self.speed += (desired_speed - self.speed).clamp(-step, step);
        self.speed = self.speed.clamp(0.0, cfg.max_speed);

        let mut throttle = if cfg.max_speed > 0.0 { self.speed / cfg.max_speed } else { 0.0 };
        let mut turn = error / cfg.turn_reference_deg.to_radians().max(f32::EPSILON);

        // Rotate in place rather than swing wide.
        if abs_error > sharp_turn {
            throttle = throttle.min(cfg.creep_throttle);
            turn = error.signum();
            self.speed = self.speed.min(cfg.creep_throttle * cfg.max_speed);
        }

        Actuation::new(throttle, turn)
    }
}
