/// Local obstacle sensing and avoidance.
///
/// A fan of forward rays is cast every tick. Each hit carries an
/// [`ObstacleClass`] that was resolved once when its collider was registered,
/// so the per-ray work is a match on an enum rather than re-deriving what a
/// collider is:
///
/// - **Ground**: terrain and floor colliders, ignored.
/// - **Crushable**: short or destructible props the hull may drive over.
///   They never steer the vehicle but shave a little speed off.
/// - **Real**: everything else, including every other vehicle. Real hits
///   push the travel direction sideways and slow the vehicle down.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::config::AvoidanceConfig;
use super::math::{right_of, rotate_heading};

/// Identity of a collider in the collision world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColliderId(pub u64);

/// What a collider is, declared by whoever registers it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColliderKind {
    /// Terrain pieces, floors, large flat slabs.
    Terrain,
    /// Buildings, walls, rocks.
    Structure,
    /// Generic scenery; crushable only when short enough.
    Prop,
    /// Anything tagged destructible or damageable.
    Destructible,
    /// Another vehicle. Never crushable.
    Vehicle,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColliderInfo {
    pub kind: ColliderKind,
    /// Height of the collider above its base.
    pub height: f32,
}

impl ColliderInfo {
    pub fn new(kind: ColliderKind, height: f32) -> Self {
        Self { kind, height }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObstacleClass {
    Ground,
    Crushable,
    Real,
}

/// Resolves a collider's [`ObstacleClass`].
#[derive(Clone, Copy, Debug)]
pub struct ObstacleClassifier {
    pub crushable_height: f32,
}

impl ObstacleClassifier {
    pub fn new(config: &AvoidanceConfig) -> Self {
        Self { crushable_height: config.crushable_height }
    }

    pub fn classify(&self, info: &ColliderInfo) -> ObstacleClass {
        match info.kind {
            ColliderKind::Terrain => ObstacleClass::Ground,
            ColliderKind::Vehicle => ObstacleClass::Real,
            ColliderKind::Destructible => ObstacleClass::Crushable,
            ColliderKind::Structure | ColliderKind::Prop if info.height < self.crushable_height => {
                ObstacleClass::Crushable
            }
            ColliderKind::Structure | ColliderKind::Prop => ObstacleClass::Real,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub distance: f32,
    pub point: Vec3,
    pub collider: ColliderId,
    pub info: ColliderInfo,
    pub class: ObstacleClass,
}

/// One entry per ray, `None` when the ray reached full range.
pub type FanHits = SmallVec<[Option<RayHit>; 8]>;

/// Synchronous collision queries used by the avoidance sensor.
pub trait CollisionWorld {
    /// Casts one ray per direction from `origin` out to `range`, ignoring the
    /// collider `ignore` (the casting vehicle itself).
    fn raycast_fan(
        &self,
        origin: Vec3,
        directions: &[Vec3],
        range: f32,
        ignore: Option<ColliderId>,
    ) -> FanHits;
}

// ============================================================================
// Reference Collision World
// ============================================================================

/// Footprint of a registered obstacle on the XZ plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ObstacleShape {
    Circle { radius: f32 },
    Box { half_extents: Vec2 },
}

#[derive(Clone, Debug)]
struct RegisteredObstacle {
    id: ColliderId,
    center: Vec2,
    base_y: f32,
    shape: ObstacleShape,
    info: ColliderInfo,
    class: ObstacleClass,
}

/// Flat list of obstacle footprints, rebuilt as a snapshot when obstacles move.
///
/// Rays are tested against footprints on the XZ plane, so an obstacle blocks
/// a ray regardless of sensor height; the classification decides whether the
/// hit matters.
#[derive(Clone, Debug)]
pub struct ObstacleField {
    classifier: ObstacleClassifier,
    obstacles: Vec<RegisteredObstacle>,
}

impl ObstacleField {
    pub fn new(classifier: ObstacleClassifier) -> Self {
        Self { classifier, obstacles: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.obstacles.clear();
    }

    pub fn set_classifier(&mut self, classifier: ObstacleClassifier) {
        self.classifier = classifier;
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    /// Adds an obstacle and fixes its class.
    pub fn register(
        &mut self,
        id: ColliderId,
        position: Vec3,
        shape: ObstacleShape,
        info: ColliderInfo,
    ) -> ObstacleClass {
        let class = self.classifier.classify(&info);
        self.obstacles.push(RegisteredObstacle {
            id,
            center: Vec2::new(position.x, position.z),
            base_y: position.y,
            shape,
            info,
            class,
        });
        class
    }

    fn cast(
        &self,
        origin: Vec2,
        dir: Vec2,
        range: f32,
        ignore: Option<ColliderId>,
    ) -> Option<(f32, &RegisteredObstacle)> {
        self.obstacles
            .iter()
            .filter(|o| Some(o.id) != ignore)
            .filter_map(|o| {
                let t = match o.shape {
                    ObstacleShape::Circle { radius } => ray_circle(origin, dir, o.center, radius),
                    ObstacleShape::Box { half_extents } => {
                        ray_box(origin, dir, o.center - half_extents, o.center + half_extents)
                    }
                }?;
                (t <= range).then_some((t, o))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }
}

impl CollisionWorld for ObstacleField {
    fn raycast_fan(
        &self,
        origin: Vec3,
        directions: &[Vec3],
        range: f32,
        ignore: Option<ColliderId>,
    ) -> FanHits {
        let o = Vec2::new(origin.x, origin.z);
        directions
            .iter()
            .map(|d| {
                let dir = Vec2::new(d.x, d.z).normalize_or_zero();
                if dir == Vec2::ZERO {
                    return None;
                }
                self.cast(o, dir, range, ignore).map(|(t, obstacle)| {
                    let p = o + dir * t;
                    RayHit {
                        distance: t,
                        point: Vec3::new(p.x, obstacle.base_y, p.y),
                        collider: obstacle.id,
                        info: obstacle.info,
                        class: obstacle.class,
                    }
                })
            })
            .collect()
    }
}

/// Entry distance of a ray into a circle; zero when starting inside.
fn ray_circle(origin: Vec2, dir: Vec2, center: Vec2, radius: f32) -> Option<f32> {
    let m = origin - center;
    let b = m.dot(dir);
    let c = m.length_squared() - radius * radius;
    if c > 0.0 && b > 0.0 {
        return None;
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    Some((-b - disc.sqrt()).max(0.0))
}

/// Slab test against an axis-aligned box; zero when starting inside.
fn ray_box(origin: Vec2, dir: Vec2, min: Vec2, max: Vec2) -> Option<f32> {
    let mut t_min = 0.0f32;
    let mut t_max = f32::INFINITY;
    for axis in 0..2 {
        let (o, d, lo, hi) = (origin[axis], dir[axis], min[axis], max[axis]);
        if d.abs() < 1e-8 {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let (mut t0, mut t1) = ((lo - o) * inv, (hi - o) * inv);
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }
    Some(t_min)
}

// ============================================================================
// Avoidance
// ============================================================================

/// Result of one avoidance pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AvoidanceOutcome {
    /// Horizontal push away from real obstacles, blended into the travel direction.
    pub steer: Vec3,
    /// Multiplier on desired speed, in `[min_speed_factor, 1]`.
    pub speed_factor: f32,
    pub real_hits: usize,
    pub crushable_hits: usize,
    pub center_blocked: bool,
    /// Set when every ray hit a real obstacle: back up turning this way.
    pub reverse_turn: Option<f32>,
}

impl AvoidanceOutcome {
    pub fn clear() -> Self {
        Self {
            steer: Vec3::ZERO,
            speed_factor: 1.0,
            real_hits: 0,
            crushable_hits: 0,
            center_blocked: false,
            reverse_turn: None,
        }
    }
}

impl Default for AvoidanceOutcome {
    fn default() -> Self {
        Self::clear()
    }
}

/// World-space ray directions for the configured fan.
pub fn fan_directions(forward: Vec3, config: &AvoidanceConfig) -> SmallVec<[Vec3; 8]> {
    config
        .rays
        .iter()
        .map(|ray| rotate_heading(forward, ray.angle_deg.to_radians()))
        .collect()
}

/// Casts the fan from the vehicle and evaluates the hits.
pub fn sense_obstacles(
    world: &dyn CollisionWorld,
    position: Vec3,
    forward: Vec3,
    ignore: Option<ColliderId>,
    config: &AvoidanceConfig,
) -> AvoidanceOutcome {
    let directions = fan_directions(forward, config);
    let origin = position + Vec3::Y * config.sensor_height;
    let hits = world.raycast_fan(origin, &directions, config.detection_range, ignore);
    evaluate_fan(forward, &hits, config)
}

/// Turns per-ray hits into an avoidance push and a speed factor.
///
/// `hits` is parallel to `config.rays`.
pub fn evaluate_fan(
    forward: Vec3,
    hits: &[Option<RayHit>],
    config: &AvoidanceConfig,
) -> AvoidanceOutcome {
    let mut outcome = AvoidanceOutcome::clear();
    if config.rays.is_empty() {
        return outcome;
    }
    let right = right_of(forward);
    let range = config.detection_range.max(f32::EPSILON);

    let mut left_clearance = 0.0;
    let mut right_clearance = 0.0;
    let mut center_push = 0.0;

    for (ray, hit) in config.rays.iter().zip(hits.iter()) {
        let real = hit.filter(|h| h.class == ObstacleClass::Real);
        let clearance = real.map_or(1.0, |h| (h.distance / range).clamp(0.0, 1.0)) * ray.weight;
        if ray.angle_deg < 0.0 {
            left_clearance += clearance;
        } else if ray.angle_deg > 0.0 {
            right_clearance += clearance;
        }

        let Some(hit) = hit else { continue };
        match hit.class {
            ObstacleClass::Ground => {}
            ObstacleClass::Crushable => outcome.crushable_hits += 1,
            ObstacleClass::Real => {
                outcome.real_hits += 1;
                let proximity = (1.0 - hit.distance / range).clamp(0.0, 1.0);
                let push = proximity * ray.weight;
                let slowdown = if ray.angle_deg == 0.0 {
                    outcome.center_blocked = true;
                    center_push += push;
                    config.center_slowdown
                } else {
                    // Left rays push right, right rays push left.
                    let away = if ray.angle_deg < 0.0 { right } else { -right };
                    outcome.steer += away * push;
                    config.side_slowdown
                };
                outcome.speed_factor = outcome.speed_factor.min(1.0 - slowdown * proximity);
            }
        }
    }

    let freer_side = if right_clearance >= left_clearance { 1.0 } else { -1.0 };
    if center_push > 0.0 {
        outcome.steer += right * freer_side * center_push;
    }
    if outcome.crushable_hits > 0 {
        outcome.speed_factor *= config.crushable_caution;
    }
    outcome.speed_factor = outcome.speed_factor.clamp(config.min_speed_factor, 1.0);

    if outcome.real_hits == config.rays.len() {
        outcome.reverse_turn = Some(freer_side);
    }
    outcome
}
