/// Global path planning and post-processing.
///
/// A plan is produced in four steps:
///
/// 1. **Snap** start and goal onto the navigable surface within a
///    vehicle-width-scaled radius. Either failing is a hard failure.
/// 2. **Query** the surface provider for a corner path.
/// 3. **Vary** every intermediate vertex by the agent's fixed [`PathOffset`]
///    plus a small per-vertex jitter, so a column of tanks sent to the same
///    place does not drive in single file.
/// 4. **Smooth** with Chaikin corner cutting and **verify width** with a
///    hull-sized sphere sweep. A narrow path is flagged, never discarded.
///
/// The first and last vertex of every successful plan are exactly the snapped
/// start and goal.

use bevy::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::{NavConfig, PlannerConfig};
use super::math::{random_in_disk, xz};
use super::obstacles::{ObstacleClass, ObstacleClassifier};
use super::surface::{NavmeshQuery, PathQueryError};

// ============================================================================
// Types
// ============================================================================

/// Ordered route from start to goal with a monotonic cursor.
#[derive(Clone, Debug, PartialEq)]
pub struct NavPath {
    points: Vec<Vec3>,
    cursor: usize,
}

impl NavPath {
    /// Cursor starts on the first vertex after the start point.
    pub fn new(points: Vec<Vec3>) -> Self {
        let cursor = usize::from(points.len() > 1);
        Self { points, cursor }
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Current sub-target.
    pub fn current(&self) -> Option<Vec3> {
        self.points.get(self.cursor).copied()
    }

    pub fn start(&self) -> Option<Vec3> {
        self.points.first().copied()
    }

    pub fn goal(&self) -> Option<Vec3> {
        self.points.last().copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Cursor sits on the final vertex.
    pub fn on_last_vertex(&self) -> bool {
        self.cursor + 1 >= self.points.len()
    }

    /// Moves the cursor forward; it never moves back and stops at the goal.
    pub fn advance(&mut self) -> bool {
        if self.on_last_vertex() {
            return false;
        }
        self.cursor += 1;
        true
    }
}

/// Per-agent lateral offset applied to intermediate path vertices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PathOffset(pub Vec2);

impl PathOffset {
    pub fn sample<R: Rng>(rng: &mut R, radius: f32) -> Self {
        Self(random_in_disk(rng, radius))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    Goal,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Endpoint::Start => write!(f, "start"),
            Endpoint::Goal => write!(f, "goal"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("no path found: {0}")]
    NoPathFound(#[source] PathQueryError),
    #[error("{0} is not on the navigable surface")]
    OffNavigableSurface(Endpoint),
    #[error("no navigable surface is available")]
    NoSurface,
}

/// Output of a successful plan.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedPath {
    pub path: NavPath,
    /// A hull-sized sweep touched a real obstacle somewhere along the path.
    pub narrow: bool,
}

// ============================================================================
// Planning
// ============================================================================

/// Plans and post-processes a path from `from` to `to`.
pub fn plan_path<R: Rng>(
    surface: &dyn NavmeshQuery,
    from: Vec3,
    to: Vec3,
    offset: PathOffset,
    rng: &mut R,
    config: &NavConfig,
) -> Result<PlannedPath, PlanError> {
    let snap_radius = config.snap_radius();
    let start = surface
        .snap_to_surface(from, snap_radius)
        .ok_or(PlanError::OffNavigableSurface(Endpoint::Start))?;
    let goal = surface
        .snap_to_surface(to, snap_radius)
        .ok_or(PlanError::OffNavigableSurface(Endpoint::Goal))?;

    let mut points = surface.compute_path(start, goal).map_err(PlanError::NoPathFound)?;
    if points.len() < 2 {
        return Err(PlanError::NoPathFound(PathQueryError::InvalidStatus));
    }
    let last = points.len() - 1;
    points[0] = start;
    points[last] = goal;

    apply_variation(surface, &mut points, offset, rng, &config.planner);
    let mut points = chaikin(&points, config.planner.smoothing_iterations);
    resnap_interior(surface, &mut points, config.planner.resnap_radius);

    let classifier = ObstacleClassifier::new(&config.avoidance);
    let narrow = is_narrow(surface, &points, config.planner.vehicle_width * 0.5, &classifier);
    if narrow {
        debug!("[PLANNER] Path of {} vertices flagged narrow", points.len());
    }

    Ok(PlannedPath { path: NavPath::new(points), narrow })
}

/// Offsets intermediate vertices and re-snaps them; vertices that cannot be
/// re-snapped stay where they were.
pub fn apply_variation<R: Rng>(
    surface: &dyn NavmeshQuery,
    points: &mut [Vec3],
    offset: PathOffset,
    rng: &mut R,
    config: &PlannerConfig,
) {
    let len = points.len();
    if len < 3 {
        return;
    }
    for point in &mut points[1..len - 1] {
        let jitter = random_in_disk(rng, config.vertex_jitter);
        let perturbed = *point + xz(offset.0 + jitter);
        match surface.snap_to_surface(perturbed, config.resnap_radius) {
            Some(snapped) => *point = snapped,
            None => trace!("[PLANNER] Kept unperturbed vertex {:?}", point),
        }
    }
}

/// Chaikin corner cutting. Each segment contributes its 25% and 75% points;
/// the first and last vertices are kept exactly.
pub fn chaikin(points: &[Vec3], iterations: usize) -> Vec<Vec3> {
    let mut current = points.to_vec();
    for _ in 0..iterations {
        if current.len() < 2 {
            break;
        }
        let mut next = Vec::with_capacity(current.len() * 2);
        next.push(current[0]);
        for segment in current.windows(2) {
            next.push(segment[0].lerp(segment[1], 0.25));
            next.push(segment[0].lerp(segment[1], 0.75));
        }
        next.push(current[current.len() - 1]);
        current = next;
    }
    current
}

fn resnap_interior(surface: &dyn NavmeshQuery, points: &mut [Vec3], radius: f32) {
    let len = points.len();
    if len < 3 {
        return;
    }
    for point in &mut points[1..len - 1] {
        if let Some(snapped) = surface.snap_to_surface(*point, radius) {
            *point = snapped;
        }
    }
}

/// True if a sphere of `radius` swept along any segment touches a real obstacle.
pub fn is_narrow(
    surface: &dyn NavmeshQuery,
    points: &[Vec3],
    radius: f32,
    classifier: &ObstacleClassifier,
) -> bool {
    points.windows(2).any(|segment| {
        surface
            .sphere_sweep(segment[0], segment[1], radius)
            .is_some_and(|hit| classifier.classify(&hit.collider) == ObstacleClass::Real)
    })
}

// ============================================================================
// Per-Agent Planner State
// ============================================================================

/// Cached path and replan timing for one agent.
#[derive(Clone, Debug)]
pub struct PathPlanner {
    path: Option<NavPath>,
    narrow: bool,
    pending: bool,
    replan_interval: f32,
    replan_timer: f32,
}

impl PathPlanner {
    pub fn new(replan_interval: f32) -> Self {
        Self {
            path: None,
            narrow: false,
            pending: false,
            replan_interval,
            replan_timer: 0.0,
        }
    }

    /// Replan interval with per-agent jitter so a whole company does not
    /// query the surface on the same tick.
    pub fn jittered_interval<R: Rng>(rng: &mut R, config: &PlannerConfig) -> f32 {
        let jitter = if config.replan_jitter > 0.0 {
            rng.random_range(-config.replan_jitter..=config.replan_jitter)
        } else {
            0.0
        };
        (config.replan_interval + jitter).max(0.1)
    }

    pub fn path(&self) -> Option<&NavPath> {
        self.path.as_ref()
    }

    pub fn path_mut(&mut self) -> Option<&mut NavPath> {
        self.path.as_mut()
    }

    pub fn is_narrow(&self) -> bool {
        self.narrow
    }

    pub fn replan_interval(&self) -> f32 {
        self.replan_interval
    }

    /// Forces a plan on the next opportunity.
    pub fn request(&mut self) {
        self.pending = true;
    }

    pub fn tick(&mut self, dt: f32) {
        self.replan_timer += dt;
    }

    /// A plan is due when one was requested, none exists, or the replan
    /// interval elapsed while still outside the stopping distance.
    pub fn needs_plan(&self, distance_to_goal: f32, stopping_distance: f32) -> bool {
        if self.pending || self.path.is_none() {
            return true;
        }
        self.replan_timer >= self.replan_interval && distance_to_goal > stopping_distance
    }

    pub fn install(&mut self, planned: PlannedPath) {
        self.path = Some(planned.path);
        self.narrow = planned.narrow;
        self.pending = false;
        self.replan_timer = 0.0;
    }

    pub fn clear(&mut self) {
        self.path = None;
        self.narrow = false;
        self.pending = false;
        self.replan_timer = 0.0;
    }
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
