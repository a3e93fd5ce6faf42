/// Stuck detection and reverse recovery.
///
/// Every `check_interval` the displacement since the previous check is
/// compared against `min_movement`. While the vehicle is commanding forward
/// speed but not moving, a stuck timer accumulates. Past `stuck_threshold` the
/// detector commits to a random turn sign and overrides all steering with a
/// reverse for `reverse_duration`, then returns to normal.
///
/// This is a heuristic. It never checks that the vehicle actually got free and
/// can retrigger straight away.

use bevy::prelude::*;
use rand::Rng;

use super::config::StuckConfig;
use super::math::horizontal_distance;
use super::steering::Actuation;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StuckState {
    #[default]
    Normal,
    Stuck,
    Reversing,
}

#[derive(Clone, Debug, Default)]
pub struct StuckDetector {
    state: StuckState,
    check_timer: f32,
    stuck_timer: f32,
    reverse_timer: f32,
    reverse_turn: f32,
    last_position: Option<Vec3>,
}

impl StuckDetector {
    pub fn state(&self) -> StuckState {
        self.state
    }

    pub fn stuck_timer(&self) -> f32 {
        self.stuck_timer
    }

    /// Turn sign committed to for the current reverse.
    pub fn reverse_turn(&self) -> f32 {
        self.reverse_turn
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Steps the detector. Returns the override command while reversing.
    pub fn update<R: Rng>(
        &mut self,
        position: Vec3,
        commanded_speed: f32,
        dt: f32,
        rng: &mut R,
        config: &StuckConfig,
    ) -> Option<Actuation> {
        if self.state == StuckState::Reversing {
            self.reverse_timer += dt;
            if self.reverse_timer >= config.reverse_duration {
                info!("[STUCK] Reverse finished, resuming");
                self.state = StuckState::Normal;
                self.stuck_timer = 0.0;
                self.reverse_timer = 0.0;
                self.check_timer = 0.0;
                self.last_position = Some(position);
                return None;
            }
            return Some(self.reverse_command(config));
        }

        let last = *self.last_position.get_or_insert(position);
        self.check_timer += dt;
        if self.check_timer >= config.check_interval {
            self.check_timer = 0.0;
            self.last_position = Some(position);
            let moved = horizontal_distance(last, position);
            if commanded_speed > config.min_commanded_speed && moved < config.min_movement {
                self.stuck_timer += config.check_interval;
                if self.state == StuckState::Normal {
                    debug!("[STUCK] Moved {:.2} while commanding {:.2}", moved, commanded_speed);
                    self.state = StuckState::Stuck;
                }
            } else {
                self.stuck_timer = 0.0;
                self.state = StuckState::Normal;
            }
        }

        if self.state == StuckState::Stuck && self.stuck_timer >= config.stuck_threshold {
            self.state = StuckState::Reversing;
            self.reverse_timer = 0.0;
            self.reverse_turn = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
            info!(
                "[STUCK] Stuck for {:.1}s, reversing with turn {}",
                self.stuck_timer, self.reverse_turn
            );
            return Some(self.reverse_command(config));
        }
        None
    }

    fn reverse_command(&self, config: &StuckConfig) -> Actuation {
        Actuation::new(-config.reverse_throttle, self.reverse_turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DT: f32 = 0.1;

    #[test]
    fn held_vehicle_goes_stuck_then_reverses_then_recovers() {
        let config = StuckConfig::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut detector = StuckDetector::default();
        let mut seen = vec![detector.state()];
        let mut reverse_ticks = 0;

        // Commanding full speed while pinned in place.
        let cycle = config.stuck_threshold + config.check_interval + config.reverse_duration;
        let total = (cycle / DT) as usize + 20;
        for _ in 0..total {
            let out = detector.update(Vec3::ZERO, 8.0, DT, &mut rng, &config);
            if let Some(cmd) = out {
                reverse_ticks += 1;
                assert_eq!(cmd.throttle, -config.reverse_throttle);
                assert_eq!(cmd.turn.abs(), 1.0);
            }
            if seen.last() != Some(&detector.state()) {
                seen.push(detector.state());
            }
            if seen.len() == 4 {
                break;
            }
        }

        assert_eq!(
            seen,
            vec![StuckState::Normal, StuckState::Stuck, StuckState::Reversing, StuckState::Normal]
        );
        assert_eq!(detector.stuck_timer(), 0.0);
        let expected = (config.reverse_duration / DT).round() as i32;
        assert!((reverse_ticks - expected).abs() <= 1, "reversed for {reverse_ticks} ticks");
    }

    #[test]
    fn moving_vehicle_never_gets_stuck() {
        let config = StuckConfig::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut detector = StuckDetector::default();
        let mut position = Vec3::ZERO;
        for _ in 0..200 {
            position.x += 0.5;
            assert!(detector.update(position, 5.0, DT, &mut rng, &config).is_none());
        }
        assert_eq!(detector.state(), StuckState::Normal);
    }

    #[test]
    fn idle_vehicle_is_not_stuck() {
        let config = StuckConfig::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut detector = StuckDetector::default();
        for _ in 0..200 {
            assert!(detector.update(Vec3::ZERO, 0.0, DT, &mut rng, &config).is_none());
        }
        assert_eq!(detector.state(), StuckState::Normal);
    }

    #[test]
    fn movement_clears_a_stuck_suspicion() {
        let config = StuckConfig::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut detector = StuckDetector::default();
        for _ in 0..11 {
            detector.update(Vec3::ZERO, 5.0, DT, &mut rng, &config);
        }
        assert_eq!(detector.state(), StuckState::Stuck);
        for _ in 0..11 {
            detector.update(Vec3::new(3.0, 0.0, 0.0), 5.0, DT, &mut rng, &config);
        }
        assert_eq!(detector.state(), StuckState::Normal);
        assert_eq!(detector.stuck_timer(), 0.0);
    }
}
