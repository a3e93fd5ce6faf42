/// Per-vehicle navigation agent.
///
/// A [`NavAgent`] owns everything one vehicle needs to navigate: its seeded
/// RNG, path offset, destination, cached path, waypoint cursor, stuck state
/// and steering state. Nothing here is shared between agents. The surface,
/// collision world and waypoint graph are borrowed per tick via
/// [`NavContext`].
///
/// Each tick runs, in order:
///
/// 1. the stuck detector, whose reverse overrides everything else
/// 2. target selection from the waypoint graph (graph mode) or the planner
/// 3. obstacle sensing
/// 4. the steering controller

use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use smallvec::SmallVec;

use super::config::NavConfig;
use super::math::{horizontal_distance, random_in_disk, xz};
use super::obstacles::{sense_obstacles, AvoidanceOutcome, ColliderId, CollisionWorld};
use super::planner::{plan_path, Endpoint, NavPath, PathOffset, PathPlanner, PlanError, PlannedPath};
use super::steering::{Actuation, DriveTarget, SteeringController};
use super::stuck::{StuckDetector, StuckState};
use super::surface::NavmeshQuery;
use super::waypoints::{TeamId, WaypointGraph, WaypointId, WaypointNavigator, WaypointStep};

// ============================================================================
// Types
// ============================================================================

/// Requested target and its jittered, surface-resolved counterpart.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Destination {
    pub target: Vec3,
    pub randomized: Vec3,
}

/// Identifies the destination a plan was requested for.
///
/// Results carrying an outdated ticket are discarded by [`NavAgent::apply_plan`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathTicket {
    generation: u64,
}

impl PathTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Outcome of [`NavAgent::apply_plan`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlanApplied {
    Installed,
    /// The destination changed since the plan was requested.
    Stale,
    Failed(PlanError),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehiclePose {
    pub position: Vec3,
    pub forward: Vec3,
}

/// Read-only world data borrowed for one tick.
#[derive(Clone, Copy)]
pub struct NavContext<'a> {
    pub config: &'a NavConfig,
    pub surface: Option<&'a dyn NavmeshQuery>,
    pub world: Option<&'a dyn CollisionWorld>,
    pub graph: Option<&'a WaypointGraph>,
}

impl<'a> NavContext<'a> {
    pub fn new(config: &'a NavConfig) -> Self {
        Self {
            config,
            surface: None,
            world: None,
            graph: None,
        }
    }

    pub fn with_surface(mut self, surface: &'a dyn NavmeshQuery) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_world(mut self, world: &'a dyn CollisionWorld) -> Self {
        self.world = Some(world);
        self
    }

    pub fn with_graph(mut self, graph: &'a WaypointGraph) -> Self {
        self.graph = Some(graph);
        self
    }
}

/// Fire-once notifications, at most one per destination.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NavEvent {
    DestinationReached(Vec3),
    PathFailed(PlanError),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NavOutput {
    pub actuation: Actuation,
    pub events: SmallVec<[NavEvent; 2]>,
}

/// Snapshot of an agent's navigation state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentNavState {
    pub current_waypoint: Option<WaypointId>,
    pub path_index: Option<usize>,
    pub speed: f32,
    pub heading_error: f32,
    pub stuck: StuckState,
}

// ============================================================================
// Agent
// ============================================================================

#[derive(Clone, Debug)]
pub struct NavAgent {
    rng: StdRng,
    team: Option<TeamId>,
    collider: Option<ColliderId>,
    graph_mode: bool,
    path_offset: PathOffset,
    destination: Option<Destination>,
    generation: u64,
    halted: bool,
    unnavigable_reported: bool,
    planner: PathPlanner,
    waypoints: WaypointNavigator,
    stuck: StuckDetector,
    steering: SteeringController,
    avoidance: AvoidanceOutcome,
    outbox: SmallVec<[NavEvent; 2]>,
}

impl NavAgent {
    /// Creates an agent. The path offset and replan jitter are drawn from
    /// `seed` once and never change.
    pub fn new(seed: u64, config: &NavConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let path_offset = PathOffset::sample(&mut rng, config.planner.path_offset_radius);
        let replan_interval = PathPlanner::jittered_interval(&mut rng, &config.planner);
        Self {
            rng,
            team: None,
            collider: None,
            graph_mode: config.waypoints.graph_mode,
            path_offset,
            destination: None,
            generation: 0,
            halted: false,
            unnavigable_reported: false,
            planner: PathPlanner::new(replan_interval),
            waypoints: WaypointNavigator::default(),
            stuck: StuckDetector::default(),
            steering: SteeringController::default(),
            avoidance: AvoidanceOutcome::clear(),
            outbox: SmallVec::new(),
        }
    }

    pub fn with_team(mut self, team: TeamId) -> Self {
        self.team = Some(team);
        self
    }

    /// The agent's own collider, skipped by its obstacle rays.
    pub fn with_collider(mut self, collider: ColliderId) -> Self {
        self.collider = Some(collider);
        self
    }

    pub fn with_graph_mode(mut self, enabled: bool) -> Self {
        self.graph_mode = enabled;
        self
    }

    pub fn team(&self) -> Option<TeamId> {
        self.team
    }

    pub fn collider(&self) -> Option<ColliderId> {
        self.collider
    }

    pub fn set_collider(&mut self, collider: ColliderId) {
        self.collider = Some(collider);
    }

    pub fn graph_mode(&self) -> bool {
        self.graph_mode
    }

    pub fn path_offset(&self) -> PathOffset {
        self.path_offset
    }

    pub fn destination(&self) -> Option<Destination> {
        self.destination
    }

    pub fn is_navigating(&self) -> bool {
        self.destination.is_some()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn path(&self) -> Option<&NavPath> {
        self.planner.path()
    }

    pub fn is_path_narrow(&self) -> bool {
        self.planner.is_narrow()
    }

    pub fn stuck_state(&self) -> StuckState {
        self.stuck.state()
    }

    /// Last avoidance evaluation.
    pub fn avoidance(&self) -> &AvoidanceOutcome {
        &self.avoidance
    }

    pub fn state(&self) -> AgentNavState {
        AgentNavState {
            current_waypoint: self.waypoints.current(),
            path_index: self.planner.path().map(NavPath::cursor),
            speed: self.steering.speed(),
            heading_error: self.steering.heading_error(),
            stuck: self.stuck.state(),
        }
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Sets a new destination, replacing any previous one.
    ///
    /// The target is jittered and resolved onto the surface. If neither the
    /// jittered nor the raw target can be snapped the request is rejected and
    /// the agent is left idle.
    pub fn set_destination(
        &mut self,
        target: Vec3,
        ctx: &NavContext,
    ) -> Result<PathTicket, PlanError> {
        self.reset_navigation();
        self.generation += 1;
        self.halted = false;

        let config = ctx.config;
        let jitter = random_in_disk(&mut self.rng, config.planner.destination_jitter);
        let jittered = target + xz(jitter);
        let randomized = match ctx.surface {
            Some(surface) => {
                let radius = config.snap_radius();
                surface
                    .snap_to_surface(jittered, radius)
                    .or_else(|| surface.snap_to_surface(target, radius))
                    .ok_or(PlanError::OffNavigableSurface(Endpoint::Goal))
            }
            // Graph navigation needs no surface to resolve against.
            None if self.graph_mode && ctx.graph.is_some() => Ok(jittered),
            None => Err(PlanError::NoSurface),
        };

        match randomized {
            Ok(randomized) => {
                debug!("[NAV] Destination {:?} resolved to {:?}", target, randomized);
                self.destination = Some(Destination { target, randomized });
                self.planner.request();
                Ok(PathTicket { generation: self.generation })
            }
            Err(e) => {
                warn!("[NAV] Rejected destination {:?}: {}", target, e);
                Err(e)
            }
        }
    }

    /// Clears destination, path and waypoint state. The agent stays idle
    /// (no wandering) until the next destination.
    pub fn stop(&mut self) {
        self.reset_navigation();
        self.generation += 1;
        self.halted = true;
    }

    /// Plans toward the current destination without installing the result.
    pub fn plan_from(
        &mut self,
        position: Vec3,
        surface: &dyn NavmeshQuery,
        config: &NavConfig,
    ) -> Option<(PathTicket, Result<PlannedPath, PlanError>)> {
        let destination = self.destination?;
        let ticket = PathTicket { generation: self.generation };
        let result = plan_path(
            surface,
            position,
            destination.randomized,
            self.path_offset,
            &mut self.rng,
            config,
        );
        Some((ticket, result))
    }

    /// Installs a plan result if it still belongs to the current destination.
    ///
    /// A failed plan clears the destination and queues a `PathFailed` event.
    pub fn apply_plan(
        &mut self,
        ticket: PathTicket,
        result: Result<PlannedPath, PlanError>,
    ) -> PlanApplied {
        if ticket.generation != self.generation || self.destination.is_none() {
            debug!(
                "[PLANNER] Discarding plan for generation {} (current {})",
                ticket.generation, self.generation
            );
            return PlanApplied::Stale;
        }
        match result {
            Ok(planned) => {
                debug!(
                    "[PLANNER] Installed path with {} vertices{}",
                    planned.path.len(),
                    if planned.narrow { " (narrow)" } else { "" }
                );
                self.planner.install(planned);
                PlanApplied::Installed
            }
            Err(e) => {
                warn!("[PLANNER] Path failed: {}", e);
                self.reset_navigation();
                self.outbox.push(NavEvent::PathFailed(e));
                PlanApplied::Failed(e)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    /// Advances the agent by `dt` seconds.
    pub fn tick(&mut self, pose: VehiclePose, dt: f32, ctx: &NavContext) -> NavOutput {
        let actuation = self.drive(pose, dt, ctx);
        NavOutput {
            actuation,
            events: std::mem::take(&mut self.outbox),
        }
    }

    fn drive(&mut self, pose: VehiclePose, dt: f32, ctx: &NavContext) -> Actuation {
        let config = ctx.config;

        if let Some(reverse) =
            self.stuck
                .update(pose.position, self.steering.speed(), dt, &mut self.rng, &config.stuck)
        {
            self.steering.halt();
            return reverse;
        }

        if self.halted {
            return Actuation::IDLE;
        }

        let Some(target) = self.select_target(pose, dt, ctx) else {
            self.steering.halt();
            self.avoidance = AvoidanceOutcome::clear();
            return Actuation::IDLE;
        };

        self.avoidance = match ctx.world {
            Some(world) => sense_obstacles(
                world,
                pose.position,
                pose.forward,
                self.collider,
                &config.avoidance,
            ),
            None => AvoidanceOutcome::clear(),
        };
        if self.avoidance.reverse_turn.is_some() {
            debug!("[AVOID] Every ray blocked, backing out");
        }

        self.steering
            .drive(pose.position, pose.forward, &target, &self.avoidance, dt, config)
    }

    fn select_target(
        &mut self,
        pose: VehiclePose,
        dt: f32,
        ctx: &NavContext,
    ) -> Option<DriveTarget> {
        let graph = ctx.graph.filter(|graph| self.graph_mode && !graph.is_empty());
        if let Some(graph) = graph {
            return self.graph_target(graph, pose, ctx.config);
        }

        self.destination?;
        match ctx.surface {
            Some(surface) => self.path_target(surface, pose, dt, ctx.config),
            None => {
                if !self.unnavigable_reported {
                    warn!("[NAV] No navigable surface or waypoint graph, holding position");
                    self.unnavigable_reported = true;
                }
                None
            }
        }
    }

    fn graph_target(
        &mut self,
        graph: &WaypointGraph,
        pose: VehiclePose,
        config: &NavConfig,
    ) -> Option<DriveTarget> {
        let destination = self.destination.map(|d| d.randomized);
        if destination.is_none() && !config.waypoints.wander_when_idle {
            return None;
        }

        let step = self
            .waypoints
            .advance(graph, pose.position, destination, self.team, &mut self.rng, config);
        match step {
            WaypointStep::Heading { target, speed_limit } => Some(DriveTarget {
                point: target,
                destination,
                speed_cap: speed_limit,
                narrow: false,
            }),
            WaypointStep::FinalApproach(point) => Some(DriveTarget {
                point,
                destination,
                speed_cap: None,
                narrow: false,
            }),
            WaypointStep::Arrived => {
                self.arrive();
                None
            }
            WaypointStep::Holding => None,
            WaypointStep::NoNode => {
                if !self.unnavigable_reported {
                    warn!("[WAYPOINT] No waypoint usable by team {:?}", self.team);
                    self.unnavigable_reported = true;
                }
                None
            }
        }
    }

    fn path_target(
        &mut self,
        surface: &dyn NavmeshQuery,
        pose: VehiclePose,
        dt: f32,
        config: &NavConfig,
    ) -> Option<DriveTarget> {
        let destination = self.destination?.randomized;
        let remaining = horizontal_distance(pose.position, destination);
        if remaining <= config.planner.stopping_distance {
            self.arrive();
            return None;
        }

        self.planner.tick(dt);
        if self.planner.needs_plan(remaining, config.planner.stopping_distance) {
            let (ticket, result) = self.plan_from(pose.position, surface, config)?;
            if self.apply_plan(ticket, result) != PlanApplied::Installed {
                return None;
            }
        }

        let narrow = self.planner.is_narrow();
        let path = self.planner.path_mut()?;
        let reach = config.planner.vertex_reach;
        while !path.on_last_vertex()
            && path
                .current()
                .is_some_and(|p| horizontal_distance(pose.position, p) <= reach)
        {
            path.advance();
        }

        Some(DriveTarget {
            point: path.current()?,
            destination: Some(destination),
            speed_cap: None,
            narrow,
        })
    }

    /// Completes the destination and parks the agent: no wandering until the
    /// next destination, as after `stop`.
    fn arrive(&mut self) {
        if let Some(destination) = self.destination {
            info!("[NAV] Reached destination {:?}", destination.target);
            self.reset_navigation();
            self.halted = true;
            self.outbox.push(NavEvent::DestinationReached(destination.target));
        }
    }

    fn reset_navigation(&mut self) {
        self.destination = None;
        self.unnavigable_reported = false;
        self.planner.clear();
        self.waypoints.reset();
        self.stuck.reset();
        self.steering.halt();
        self.avoidance = AvoidanceOutcome::clear();
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
